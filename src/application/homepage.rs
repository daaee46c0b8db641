//! Homepage aggregate.

use std::sync::Arc;

use futures::future::try_join_all;
use time::OffsetDateTime;
use tracing::instrument;

use crate::application::media;
use crate::application::repos::{
    GeoScope, GeoSummaryService, HomepageRepo, MediaError, MediaUrls, SourceError,
};
use crate::application::town::person_summaries;
use crate::domain::snapshots::{
    DirectoryTotals, HomepageSnapshot, RecentComment, TownSummary, display_name,
};
use crate::domain::types::ImageVariant;
use crate::util::text::excerpt;
use crate::util::time::rfc3339;

pub const FEATURED_TOWNS_LIMIT: u32 = 6;
pub const RECENT_PEOPLE_LIMIT: u32 = 12;
pub const RECENT_COMMENTS_LIMIT: u32 = 10;
const COMMENT_EXCERPT_CHARS: usize = 140;

#[derive(Clone)]
pub struct HomepageAggregate {
    homepage: Arc<dyn HomepageRepo>,
    geo: Arc<dyn GeoSummaryService>,
    media: Arc<dyn MediaUrls>,
}

impl HomepageAggregate {
    pub fn new(
        homepage: Arc<dyn HomepageRepo>,
        geo: Arc<dyn GeoSummaryService>,
        media: Arc<dyn MediaUrls>,
    ) -> Self {
        Self {
            homepage,
            geo,
            media,
        }
    }

    /// The homepage always exists, so this never yields `None`.
    #[instrument(skip(self))]
    pub async fn fetch(&self) -> Result<Option<HomepageSnapshot>, SourceError> {
        let (towns, people, comments, totals, geo) = tokio::try_join!(
            self.homepage.list_featured_towns(FEATURED_TOWNS_LIMIT),
            self.homepage.list_recent_people(RECENT_PEOPLE_LIMIT),
            self.homepage.list_recent_comments(RECENT_COMMENTS_LIMIT),
            self.homepage.directory_totals(),
            self.geo.supporter_summary(GeoScope::Directory),
        )?;

        let urls = &*self.media;
        let featured_towns = try_join_all(towns.into_iter().map(|town| async move {
            let hero_image_url =
                media::optional_image_url(urls, town.hero_image_id, ImageVariant::Card).await?;
            Ok::<_, MediaError>(TownSummary {
                slug: town.slug,
                name: town.name,
                state: town.state,
                people_count: u64::try_from(town.people_count).unwrap_or(0),
                hero_image_url,
            })
        }));
        let (featured_towns, recent_people) =
            tokio::try_join!(featured_towns, person_summaries(urls, people))?;

        let recent_comments = comments
            .into_iter()
            .map(|comment| RecentComment {
                id: comment.id,
                author_name: comment.author_name,
                excerpt: excerpt(&comment.body, COMMENT_EXCERPT_CHARS),
                created_at: rfc3339(comment.created_at),
                person_name: display_name(
                    &comment.person_first_name,
                    &comment.person_last_name,
                    None,
                ),
                person_slug: comment.person_slug,
                town_slug: comment.town_slug,
            })
            .collect();

        Ok(Some(HomepageSnapshot {
            featured_towns,
            recent_people,
            recent_comments,
            totals: DirectoryTotals {
                towns: u64::try_from(totals.towns).unwrap_or(0),
                people: u64::try_from(totals.people).unwrap_or(0),
                comments: u64::try_from(totals.comments).unwrap_or(0),
                funds_raised: totals.funds_raised,
            },
            geo,
            generated_at: rfc3339(OffsetDateTime::now_utc()),
        }))
    }
}
