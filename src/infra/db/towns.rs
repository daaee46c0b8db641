use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{RepoError, TownsRepo},
    domain::entities::{FacilityRecord, TownRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct TownRow {
    id: Uuid,
    slug: String,
    name: String,
    state: String,
    county: Option<String>,
    description: Option<String>,
    population: Option<i32>,
    hero_image_id: Option<Uuid>,
    featured: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<TownRow> for TownRecord {
    fn from(row: TownRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            name: row.name,
            state: row.state,
            county: row.county,
            description: row.description,
            population: row.population,
            hero_image_id: row.hero_image_id,
            featured: row.featured,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FacilityRow {
    id: Uuid,
    town_id: Uuid,
    name: String,
    kind: String,
    address: Option<String>,
    people_count: i64,
}

impl From<FacilityRow> for FacilityRecord {
    fn from(row: FacilityRow) -> Self {
        Self {
            id: row.id,
            town_id: row.town_id,
            name: row.name,
            kind: row.kind,
            address: row.address,
            people_count: row.people_count,
        }
    }
}

const FACILITY_COLUMNS: &str = r#"
    f.id, f.town_id, f.name, f.kind, f.address,
    (SELECT COUNT(*) FROM people p WHERE p.facility_id = f.id AND p.listed) AS people_count
"#;

#[async_trait]
impl TownsRepo for PostgresRepositories {
    async fn find_town_by_slug(&self, slug: &str) -> Result<Option<TownRecord>, RepoError> {
        let row = sqlx::query_as::<_, TownRow>(
            r#"
            SELECT id, slug, name, state, county, description, population,
                   hero_image_id, featured, created_at, updated_at
            FROM towns
            WHERE slug = $1
            "#,
        )
        .bind(slug)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(TownRecord::from))
    }

    async fn list_facilities(&self, town_id: Uuid) -> Result<Vec<FacilityRecord>, RepoError> {
        let sql = format!(
            "SELECT {FACILITY_COLUMNS} FROM facilities f WHERE f.town_id = $1 ORDER BY f.name, f.id"
        );
        let rows = sqlx::query_as::<_, FacilityRow>(&sql)
            .bind(town_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(FacilityRecord::from).collect())
    }

    async fn find_facility(&self, facility_id: Uuid) -> Result<Option<FacilityRecord>, RepoError> {
        let sql = format!("SELECT {FACILITY_COLUMNS} FROM facilities f WHERE f.id = $1");
        let row = sqlx::query_as::<_, FacilityRow>(&sql)
            .bind(facility_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(FacilityRecord::from))
    }
}
