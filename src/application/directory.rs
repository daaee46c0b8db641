//! Cached page reads and explicit invalidation for the directory.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::application::homepage::HomepageAggregate;
use crate::application::person::PersonAggregate;
use crate::application::repos::{
    GeoSummaryService, HomepageRepo, MediaUrls, PeopleRepo, PermissionResolver, SourceError,
    TownsRepo,
};
use crate::application::town::TownAggregate;
use crate::cache::{CacheKey, CacheManager, CacheResult, FetchOptions};
use crate::domain::entities::RoleFlags;
use crate::domain::snapshots::{HomepagePage, PersonPage, TownPage, ViewerPermissions};
use crate::domain::types::Principal;

/// Every collaborator the directory needs.
#[derive(Clone)]
pub struct DirectorySources {
    pub towns: Arc<dyn TownsRepo>,
    pub people: Arc<dyn PeopleRepo>,
    pub homepage: Arc<dyn HomepageRepo>,
    pub geo: Arc<dyn GeoSummaryService>,
    pub media: Arc<dyn MediaUrls>,
    pub permissions: Arc<dyn PermissionResolver>,
}

#[derive(Clone)]
pub struct DirectoryService {
    cache: Arc<CacheManager>,
    people: PersonAggregate,
    towns: TownAggregate,
    homepage: HomepageAggregate,
    permissions: Arc<dyn PermissionResolver>,
}

impl DirectoryService {
    pub fn new(cache: Arc<CacheManager>, sources: DirectorySources) -> Self {
        let DirectorySources {
            towns,
            people,
            homepage,
            geo,
            media,
            permissions,
        } = sources;

        Self {
            cache,
            people: PersonAggregate::new(
                towns.clone(),
                people.clone(),
                geo.clone(),
                media.clone(),
            ),
            towns: TownAggregate::new(towns, people, geo.clone(), media.clone()),
            homepage: HomepageAggregate::new(homepage, geo, media),
            permissions,
        }
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub async fn get_cached_person_data(
        &self,
        town_slug: &str,
        person_slug: &str,
        principal: &Principal,
        options: FetchOptions,
    ) -> Result<CacheResult<PersonPage>, SourceError> {
        let key = CacheKey::person(town_slug, person_slug);
        let result = self
            .cache
            .get_or_fetch(&key, options, || self.people.fetch(town_slug, person_slug))
            .await?;

        let roles = self.roles_for(&result, principal).await;
        Ok(result.map(|person| PersonPage {
            viewer: ViewerPermissions::for_person(&roles, &person),
            person,
        }))
    }

    pub async fn get_cached_town_data(
        &self,
        town_slug: &str,
        principal: &Principal,
        options: FetchOptions,
    ) -> Result<CacheResult<TownPage>, SourceError> {
        let key = CacheKey::town(town_slug);
        let result = self
            .cache
            .get_or_fetch(&key, options, || self.towns.fetch(town_slug))
            .await?;

        let roles = self.roles_for(&result, principal).await;
        Ok(result.map(|town| TownPage {
            town,
            viewer: ViewerPermissions::for_listing(&roles),
        }))
    }

    pub async fn get_cached_homepage_data(
        &self,
        principal: &Principal,
        options: FetchOptions,
    ) -> Result<CacheResult<HomepagePage>, SourceError> {
        let key = CacheKey::homepage();
        let result = self
            .cache
            .get_or_fetch(&key, options, || self.homepage.fetch())
            .await?;

        let roles = self.roles_for(&result, principal).await;
        Ok(result.map(|homepage| HomepagePage {
            homepage,
            viewer: ViewerPermissions::for_listing(&roles),
        }))
    }

    pub async fn invalidate_person_cache(&self, town_slug: &str, person_slug: &str) {
        self.cache
            .invalidate(&CacheKey::person(town_slug, person_slug))
            .await;
    }

    pub async fn invalidate_town_cache(&self, town_slug: &str) {
        self.cache.invalidate(&CacheKey::town(town_slug)).await;
    }

    pub async fn invalidate_homepage_cache(&self) {
        self.cache.invalidate(&CacheKey::homepage()).await;
    }

    /// Viewer roles for a page; a missing snapshot needs no session lookup.
    async fn roles_for<T>(&self, result: &CacheResult<T>, principal: &Principal) -> RoleFlags {
        if result.data.is_none() {
            return RoleFlags::anonymous();
        }
        self.resolve_roles(principal).await
    }

    /// Role flags for `principal`; resolver failures degrade to anonymous.
    async fn resolve_roles(&self, principal: &Principal) -> RoleFlags {
        let Principal::Session(token) = principal else {
            return RoleFlags::anonymous();
        };
        match self.permissions.resolve(token).await {
            Ok(roles) => {
                debug!(authenticated = roles.is_authenticated(), "viewer resolved");
                roles
            }
            Err(err) => {
                warn!(error = %err, "permission lookup failed; serving anonymous view");
                RoleFlags::anonymous()
            }
        }
    }
}
