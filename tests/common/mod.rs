//! In-memory collaborators shared by the integration tests.
//!
//! Seeds one town (`borrego_springs`) with one listed person (`joe_plumber`)
//! and counts how often each aggregate touches the source.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use time::macros::datetime;
use townsfolk::application::directory::{DirectoryService, DirectorySources};
use townsfolk::application::media::PublicMediaUrls;
use townsfolk::application::repos::{
    GeoScope, GeoSummaryService, HomepageRepo, PeopleRepo, PermissionResolver, RepoError,
    TownsRepo,
};
use townsfolk::cache::{
    CacheError, CacheKey, CacheManager, CachePayload, CacheTier, EntryMeta, MemoryCache,
    MemoryStats, TierHit, TierKind,
};
use townsfolk::domain::entities::{
    CommentRecord, DirectoryTotalsRecord, FacilityRecord, NarrativeBlockRecord,
    PersonImageRecord, PersonListingRecord, PersonRecord, RecentCommentRecord, RoleFlags,
    TownListingRecord, TownRecord,
};
use townsfolk::domain::snapshots::{GeoBucket, GeoSummary};
use townsfolk::domain::types::NarrativeKind;
use url::Url;
use uuid::Uuid;

pub const TOWN: &str = "borrego_springs";
pub const PERSON: &str = "joe_plumber";
pub const OWNER_TOKEN: &str = "owner-session";
pub const ADMIN_TOKEN: &str = "admin-session";

const SEEDED_AT: OffsetDateTime = datetime!(2024-03-01 12:00 UTC);

pub struct FakeSource {
    town: TownRecord,
    facility: FacilityRecord,
    people: Mutex<Vec<PersonRecord>>,
    comments: Mutex<Vec<CommentRecord>>,
    images: Vec<PersonImageRecord>,
    narrative: Vec<NarrativeBlockRecord>,
    sessions: HashMap<String, RoleFlags>,
    /// Added to every town lookup so source reads are measurably slower than
    /// tier hits.
    latency: Duration,
    pub owner_id: Uuid,
    pub town_lookups: AtomicUsize,
    pub homepage_reads: AtomicUsize,
    pub session_lookups: AtomicUsize,
    pub fail_source: AtomicBool,
    pub fail_permissions: AtomicBool,
}

impl FakeSource {
    pub fn seeded() -> Self {
        Self::with_latency(Duration::from_millis(5))
    }

    pub fn with_latency(latency: Duration) -> Self {
        let town_id = Uuid::new_v4();
        let facility_id = Uuid::new_v4();
        let person_id = Uuid::new_v4();
        let owner_id = Uuid::new_v4();
        let admin_id = Uuid::new_v4();

        let town = TownRecord {
            id: town_id,
            slug: TOWN.into(),
            name: "Borrego Springs".into(),
            state: "CA".into(),
            county: Some("San Diego".into()),
            description: Some("Desert town ringed by Anza-Borrego.".into()),
            population: Some(3429),
            hero_image_id: Some(Uuid::new_v4()),
            featured: true,
            created_at: SEEDED_AT,
            updated_at: SEEDED_AT,
        };
        let facility = FacilityRecord {
            id: facility_id,
            town_id,
            name: "Borrego Springs Library".into(),
            kind: "library".into(),
            address: Some("2580 Country Club Rd".into()),
            people_count: 1,
        };
        let person = PersonRecord {
            id: person_id,
            town_id,
            slug: PERSON.into(),
            first_name: "Joe".into(),
            last_name: "Plumber".into(),
            nickname: Some("Pipes".into()),
            occupation: Some("Plumber".into()),
            biography: "Fixes what the desert breaks.".into(),
            portrait_image_id: Some(Uuid::new_v4()),
            facility_id: Some(facility_id),
            owner_id: Some(owner_id),
            donation_goal: Some("2000.00".into()),
            funds_raised: "500.00".into(),
            listed: true,
            created_at: SEEDED_AT,
            updated_at: SEEDED_AT,
        };
        let comments = vec![CommentRecord {
            id: Uuid::new_v4(),
            author_name: "Neighbor".into(),
            body: "Joe fixed our well pump on a Sunday.".into(),
            created_at: SEEDED_AT,
        }];
        let images = vec![PersonImageRecord {
            image_id: Uuid::new_v4(),
            position: 0,
            alt_text: "Joe at work".into(),
            caption: None,
            width: 1200,
            height: 800,
        }];
        let narrative = vec![NarrativeBlockRecord {
            id: Uuid::new_v4(),
            position: 0,
            kind: NarrativeKind::Story,
            heading: Some("Early years".into()),
            body: "Joe moved to the desert in 1998.".into(),
        }];

        let mut sessions = HashMap::new();
        sessions.insert(
            OWNER_TOKEN.to_string(),
            RoleFlags {
                user_id: Some(owner_id),
                ..RoleFlags::default()
            },
        );
        sessions.insert(
            ADMIN_TOKEN.to_string(),
            RoleFlags {
                user_id: Some(admin_id),
                is_admin: true,
                ..RoleFlags::default()
            },
        );

        Self {
            town,
            facility,
            people: Mutex::new(vec![person]),
            comments: Mutex::new(comments),
            images,
            narrative,
            sessions,
            latency,
            owner_id,
            town_lookups: AtomicUsize::new(0),
            homepage_reads: AtomicUsize::new(0),
            session_lookups: AtomicUsize::new(0),
            fail_source: AtomicBool::new(false),
            fail_permissions: AtomicBool::new(false),
        }
    }

    pub fn session_lookups(&self) -> usize {
        self.session_lookups.load(Ordering::SeqCst)
    }

    pub fn town_lookups(&self) -> usize {
        self.town_lookups.load(Ordering::SeqCst)
    }

    pub fn rename_person(&self, slug: &str, first_name: &str) {
        let mut people = self.people.lock().unwrap();
        if let Some(person) = people.iter_mut().find(|person| person.slug == slug) {
            person.first_name = first_name.to_string();
        }
    }

    pub fn add_comment(&self, body: &str) {
        self.comments.lock().unwrap().push(CommentRecord {
            id: Uuid::new_v4(),
            author_name: "Visitor".into(),
            body: body.to_string(),
            created_at: OffsetDateTime::now_utc(),
        });
    }

    fn check_source(&self) -> Result<(), RepoError> {
        if self.fail_source.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("connection refused".into()));
        }
        Ok(())
    }

    fn listing(&self, person: &PersonRecord) -> PersonListingRecord {
        PersonListingRecord {
            id: person.id,
            slug: person.slug.clone(),
            town_slug: self.town.slug.clone(),
            first_name: person.first_name.clone(),
            last_name: person.last_name.clone(),
            nickname: person.nickname.clone(),
            occupation: person.occupation.clone(),
            portrait_image_id: person.portrait_image_id,
            comment_count: self.comments.lock().unwrap().len() as i64,
            supporter_count: 4,
            created_at: person.created_at,
        }
    }
}

#[async_trait]
impl TownsRepo for FakeSource {
    async fn find_town_by_slug(&self, slug: &str) -> Result<Option<TownRecord>, RepoError> {
        self.town_lookups.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.check_source()?;
        Ok((slug == self.town.slug).then(|| self.town.clone()))
    }

    async fn list_facilities(&self, town_id: Uuid) -> Result<Vec<FacilityRecord>, RepoError> {
        Ok(if town_id == self.town.id {
            vec![self.facility.clone()]
        } else {
            Vec::new()
        })
    }

    async fn find_facility(&self, facility_id: Uuid) -> Result<Option<FacilityRecord>, RepoError> {
        Ok((facility_id == self.facility.id).then(|| self.facility.clone()))
    }
}

#[async_trait]
impl PeopleRepo for FakeSource {
    async fn find_person(
        &self,
        town_id: Uuid,
        slug: &str,
    ) -> Result<Option<PersonRecord>, RepoError> {
        Ok(self
            .people
            .lock()
            .unwrap()
            .iter()
            .find(|person| person.town_id == town_id && person.slug == slug && person.listed)
            .cloned())
    }

    async fn list_images(&self, _person_id: Uuid) -> Result<Vec<PersonImageRecord>, RepoError> {
        Ok(self.images.clone())
    }

    async fn list_approved_comments(
        &self,
        _person_id: Uuid,
    ) -> Result<Vec<CommentRecord>, RepoError> {
        Ok(self.comments.lock().unwrap().clone())
    }

    async fn list_narrative_blocks(
        &self,
        _person_id: Uuid,
    ) -> Result<Vec<NarrativeBlockRecord>, RepoError> {
        Ok(self.narrative.clone())
    }

    async fn list_people_in_town(
        &self,
        town_id: Uuid,
    ) -> Result<Vec<PersonListingRecord>, RepoError> {
        let people = self.people.lock().unwrap().clone();
        Ok(people
            .iter()
            .filter(|person| person.town_id == town_id && person.listed)
            .map(|person| self.listing(person))
            .collect())
    }
}

#[async_trait]
impl HomepageRepo for FakeSource {
    async fn list_featured_towns(&self, _limit: u32) -> Result<Vec<TownListingRecord>, RepoError> {
        self.homepage_reads.fetch_add(1, Ordering::SeqCst);
        self.check_source()?;
        Ok(vec![TownListingRecord {
            id: self.town.id,
            slug: self.town.slug.clone(),
            name: self.town.name.clone(),
            state: self.town.state.clone(),
            hero_image_id: self.town.hero_image_id,
            people_count: 1,
        }])
    }

    async fn list_recent_people(&self, _limit: u32) -> Result<Vec<PersonListingRecord>, RepoError> {
        let people = self.people.lock().unwrap().clone();
        Ok(people.iter().map(|person| self.listing(person)).collect())
    }

    async fn list_recent_comments(
        &self,
        _limit: u32,
    ) -> Result<Vec<RecentCommentRecord>, RepoError> {
        let comments = self.comments.lock().unwrap().clone();
        Ok(comments
            .into_iter()
            .rev()
            .map(|comment| RecentCommentRecord {
                id: comment.id,
                author_name: comment.author_name,
                body: comment.body,
                created_at: comment.created_at,
                person_slug: PERSON.into(),
                person_first_name: "Joe".into(),
                person_last_name: "Plumber".into(),
                town_slug: TOWN.into(),
            })
            .collect())
    }

    async fn directory_totals(&self) -> Result<DirectoryTotalsRecord, RepoError> {
        Ok(DirectoryTotalsRecord {
            towns: 1,
            people: self.people.lock().unwrap().len() as i64,
            comments: self.comments.lock().unwrap().len() as i64,
            funds_raised: "500.00".into(),
        })
    }
}

#[async_trait]
impl GeoSummaryService for FakeSource {
    async fn supporter_summary(&self, _scope: GeoScope) -> Result<GeoSummary, RepoError> {
        Ok(GeoSummary {
            total_supporters: 4,
            buckets: vec![
                GeoBucket {
                    region: "CA".into(),
                    supporters: 3,
                },
                GeoBucket {
                    region: "unknown".into(),
                    supporters: 1,
                },
            ],
        })
    }
}

#[async_trait]
impl PermissionResolver for FakeSource {
    async fn resolve(&self, session_token: &str) -> Result<RoleFlags, RepoError> {
        self.session_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_permissions.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        Ok(self
            .sessions
            .get(session_token)
            .copied()
            .unwrap_or_else(RoleFlags::anonymous))
    }
}

/// Memory-backed stand-in for Redis: shared between managers and reported as
/// the distributed tier.
pub struct SharedTier {
    inner: MemoryCache,
}

impl SharedTier {
    pub fn new() -> Self {
        Self {
            inner: MemoryCache::new(0, Duration::from_secs(3600)),
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.lookup(key.as_str()).is_some()
    }
}

#[async_trait]
impl CacheTier for SharedTier {
    fn kind(&self) -> TierKind {
        TierKind::Redis
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<TierHit>, CacheError> {
        Ok(self.inner.lookup(key.as_str()))
    }

    async fn set(
        &self,
        key: &CacheKey,
        payload: CachePayload,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.inner.store(key.as_str(), payload, ttl);
        Ok(())
    }

    async fn del(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.inner.remove(key.as_str());
        Ok(())
    }

    async fn reset(&self) -> Result<(), CacheError> {
        self.inner.clear();
        Ok(())
    }

    fn entry_info(&self, key: &CacheKey) -> Option<EntryMeta> {
        self.inner.info(key.as_str())
    }

    fn usage(&self) -> Option<MemoryStats> {
        Some(self.inner.stats())
    }
}

pub fn media() -> PublicMediaUrls {
    PublicMediaUrls::new(Url::parse("https://cdn.example.com/").unwrap())
}

/// A manager with a private memory tier in front of `shared`.
pub fn manager(shared: &Arc<SharedTier>) -> Arc<CacheManager> {
    let shared: Arc<dyn CacheTier> = shared.clone();
    Arc::new(CacheManager::with_tiers(
        Arc::new(MemoryCache::new(0, Duration::from_secs(300))),
        shared,
    ))
}

pub fn directory(cache: Arc<CacheManager>, source: &Arc<FakeSource>) -> DirectoryService {
    DirectoryService::new(
        cache,
        DirectorySources {
            towns: source.clone(),
            people: source.clone(),
            homepage: source.clone(),
            geo: source.clone(),
            media: Arc::new(media()),
            permissions: source.clone(),
        },
    )
}
