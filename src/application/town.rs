//! Town page aggregate.

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::instrument;

use crate::application::media;
use crate::application::person::facility_summary;
use crate::application::repos::{
    GeoScope, GeoSummaryService, MediaError, MediaUrls, PeopleRepo, SourceError, TownsRepo,
};
use crate::domain::entities::PersonListingRecord;
use crate::domain::snapshots::{PersonSummary, TownSnapshot, display_name};
use crate::domain::types::ImageVariant;
use crate::util::time::rfc3339;

#[derive(Clone)]
pub struct TownAggregate {
    towns: Arc<dyn TownsRepo>,
    people: Arc<dyn PeopleRepo>,
    geo: Arc<dyn GeoSummaryService>,
    media: Arc<dyn MediaUrls>,
}

impl TownAggregate {
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

    #[instrument(skip(self))]
    pub async fn fetch(&self, town_slug: &str) -> Result<Option<TownSnapshot>, SourceError> {
        let Some(town) = self.towns.find_town_by_slug(town_slug).await? else {
            return Ok(None);
        };

        let (people, facilities, geo) = tokio::try_join!(
            self.people.list_people_in_town(town.id),
            self.towns.list_facilities(town.id),
            self.geo.supporter_summary(GeoScope::Town(town.id)),
        )?;

        let (people, hero_image_url) = tokio::try_join!(
            person_summaries(&*self.media, people),
            media::optional_image_url(&*self.media, town.hero_image_id, ImageVariant::Full),
        )?;

        Ok(Some(TownSnapshot {
            id: town.id,
            slug: town.slug,
            name: town.name,
            state: town.state,
            county: town.county,
            description: town.description,
            population: town.population,
            hero_image_url,
            people_count: people.len() as u64,
            people,
            facilities: facilities.into_iter().map(facility_summary).collect(),
            geo,
            updated_at: rfc3339(town.updated_at),
        }))
    }
}

/// Listing cards with portrait thumbnails, in repository order.
pub(crate) async fn person_summaries(
    urls: &dyn MediaUrls,
    people: Vec<PersonListingRecord>,
) -> Result<Vec<PersonSummary>, MediaError> {
    try_join_all(people.into_iter().map(|person| async move {
        let thumbnail_url =
            media::optional_image_url(urls, person.portrait_image_id, ImageVariant::Thumbnail)
                .await?;
        Ok::<_, MediaError>(PersonSummary {
            display_name: display_name(
                &person.first_name,
                &person.last_name,
                person.nickname.as_deref(),
            ),
            slug: person.slug,
            town_slug: person.town_slug,
            occupation: person.occupation,
            thumbnail_url,
            comment_count: u64::try_from(person.comment_count).unwrap_or(0),
            supporter_count: u64::try_from(person.supporter_count).unwrap_or(0),
            listed_at: rfc3339(person.created_at),
        })
    }))
    .await
}
