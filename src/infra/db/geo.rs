use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    application::repos::{GeoScope, GeoSummaryService, RepoError},
    domain::{
        entities::GeoBucketRecord,
        snapshots::{GeoBucket, GeoSummary},
    },
};

use super::util::count_to_u64;
use super::{PostgresRepositories, map_sqlx_error};

/// Largest regions kept in a summary; the total still counts every supporter.
pub const GEO_BUCKET_LIMIT: usize = 10;

const UNKNOWN_REGION: &str = "unknown";

#[derive(sqlx::FromRow)]
struct GeoBucketRow {
    region: String,
    supporters: i64,
}

#[async_trait]
impl GeoSummaryService for PostgresRepositories {
    async fn supporter_summary(&self, scope: GeoScope) -> Result<GeoSummary, RepoError> {
        let (filter, id): (&str, Option<Uuid>) = match scope {
            GeoScope::Person(id) => ("p.id = $1", Some(id)),
            GeoScope::Town(id) => ("p.town_id = $1", Some(id)),
            GeoScope::Directory => ("$1::uuid IS NULL", None),
        };
        let sql = format!(
            r#"
            SELECT COALESCE(NULLIF(TRIM(s.region), ''), '{UNKNOWN_REGION}') AS region,
                   COUNT(*) AS supporters
            FROM supporters s
            INNER JOIN people p ON p.id = s.person_id
            WHERE p.listed AND {filter}
            GROUP BY 1
            "#
        );

        let rows = sqlx::query_as::<_, GeoBucketRow>(&sql)
            .bind(id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(summarize(
            rows.into_iter()
                .map(|row| GeoBucketRecord {
                    region: row.region,
                    supporters: row.supporters,
                })
                .collect(),
        ))
    }
}

/// Largest bucket first, ties by region name, truncated to
/// [`GEO_BUCKET_LIMIT`].
fn summarize(mut records: Vec<GeoBucketRecord>) -> GeoSummary {
    let total_supporters = records
        .iter()
        .map(|record| count_to_u64(record.supporters))
        .sum();
    records.sort_by(|a, b| {
        b.supporters
            .cmp(&a.supporters)
            .then_with(|| a.region.cmp(&b.region))
    });
    records.truncate(GEO_BUCKET_LIMIT);

    GeoSummary {
        total_supporters,
        buckets: records
            .into_iter()
            .map(|record| GeoBucket {
                region: record.region,
                supporters: count_to_u64(record.supporters),
            })
            .collect(),
    }
}
