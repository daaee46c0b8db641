//! Person page aggregate.

use std::sync::Arc;

use tracing::instrument;

use crate::application::media;
use crate::application::repos::{
    GeoScope, GeoSummaryService, MediaUrls, PeopleRepo, RepoError, SourceError, TownsRepo,
};
use crate::domain::entities::{
    CommentRecord, FacilityRecord, NarrativeBlockRecord, PersonRecord, TownRecord,
};
use crate::domain::snapshots::{
    CommentSnapshot, FacilitySummary, GeoSummary, ImageSnapshot, ImageUrls,
    NarrativeBlockSnapshot, PersonSnapshot, TownRef, display_name, percent_funded,
};
use crate::util::time::rfc3339;

/// Loads a person with every joined collection and flattens it into a
/// [`PersonSnapshot`].
#[derive(Clone)]
pub struct PersonAggregate {
    towns: Arc<dyn TownsRepo>,
    people: Arc<dyn PeopleRepo>,
    geo: Arc<dyn GeoSummaryService>,
    media: Arc<dyn MediaUrls>,
}

impl PersonAggregate {
    pub fn new(
        towns: Arc<dyn TownsRepo>,
        people: Arc<dyn PeopleRepo>,
        geo: Arc<dyn GeoSummaryService>,
        media: Arc<dyn MediaUrls>,
    ) -> Self {
        Self {
            towns,
            people,
            geo,
            media,
        }
    }

    /// `Ok(None)` when the town or a listed person with that slug is missing.
    #[instrument(skip(self))]
    pub async fn fetch(
        &self,
        town_slug: &str,
        person_slug: &str,
    ) -> Result<Option<PersonSnapshot>, SourceError> {
        let Some(town) = self.towns.find_town_by_slug(town_slug).await? else {
            return Ok(None);
        };
        let Some(person) = self.people.find_person(town.id, person_slug).await? else {
            return Ok(None);
        };

        let (images, comments, narrative, facility, geo) = tokio::try_join!(
            self.people.list_images(person.id),
            self.people.list_approved_comments(person.id),
            self.people.list_narrative_blocks(person.id),
            self.load_facility(person.facility_id),
            self.geo.supporter_summary(GeoScope::Person(person.id)),
        )?;

        let (images, portrait) = tokio::try_join!(
            media::image_snapshots(&*self.media, images),
            media::optional_image_urls(&*self.media, person.portrait_image_id),
        )?;

        Ok(Some(assemble(PersonParts {
            town,
            person,
            portrait,
            images,
            comments,
            narrative,
            facility,
            geo,
        })))
    }

    async fn load_facility(
        &self,
        facility_id: Option<uuid::Uuid>,
    ) -> Result<Option<FacilityRecord>, RepoError> {
        match facility_id {
            Some(id) => self.towns.find_facility(id).await,
            None => Ok(None),
        }
    }
}

struct PersonParts {
    town: TownRecord,
    person: PersonRecord,
    portrait: Option<ImageUrls>,
    images: Vec<ImageSnapshot>,
    comments: Vec<CommentRecord>,
    narrative: Vec<NarrativeBlockRecord>,
    facility: Option<FacilityRecord>,
    geo: GeoSummary,
}

fn assemble(parts: PersonParts) -> PersonSnapshot {
    let PersonParts {
        town,
        person,
        portrait,
        images,
        comments,
        narrative,
        facility,
        geo,
    } = parts;

    let comments: Vec<CommentSnapshot> = comments
        .into_iter()
        .map(|comment| CommentSnapshot {
            id: comment.id,
            author_name: comment.author_name,
            body: comment.body,
            created_at: rfc3339(comment.created_at),
        })
        .collect();

    PersonSnapshot {
        id: person.id,
        display_name: display_name(
            &person.first_name,
            &person.last_name,
            person.nickname.as_deref(),
        ),
        percent_funded: percent_funded(&person.funds_raised, person.donation_goal.as_deref()),
        slug: person.slug,
        town: TownRef {
            slug: town.slug,
            name: town.name,
            state: town.state,
        },
        first_name: person.first_name,
        last_name: person.last_name,
        nickname: person.nickname,
        occupation: person.occupation,
        biography: person.biography,
        owner_id: person.owner_id,
        portrait,
        images,
        comment_count: comments.len() as u64,
        comments,
        narrative: narrative
            .into_iter()
            .map(|block| NarrativeBlockSnapshot {
                position: block.position,
                kind: block.kind,
                heading: block.heading,
                body: block.body,
            })
            .collect(),
        facility: facility.map(facility_summary),
        geo,
        funds_raised: person.funds_raised,
        donation_goal: person.donation_goal,
        created_at: rfc3339(person.created_at),
        updated_at: rfc3339(person.updated_at),
    }
}

pub(crate) fn facility_summary(record: FacilityRecord) -> FacilitySummary {
    FacilitySummary {
        id: record.id,
        name: record.name,
        kind: record.kind,
        address: record.address,
        people_count: u64::try_from(record.people_count).unwrap_or(0),
    }
}
