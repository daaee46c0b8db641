use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{HomepageRepo, RepoError},
    domain::entities::{
        DirectoryTotalsRecord, PersonListingRecord, RecentCommentRecord, TownListingRecord,
    },
};

use super::people::{PERSON_LISTING_SELECT, PersonListingRow};
use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct TownListingRow {
    id: Uuid,
    slug: String,
    name: String,
    state: String,
    hero_image_id: Option<Uuid>,
    people_count: i64,
}

#[derive(sqlx::FromRow)]
struct RecentCommentRow {
    id: Uuid,
    author_name: String,
    body: String,
    created_at: OffsetDateTime,
    person_slug: String,
    person_first_name: String,
    person_last_name: String,
    town_slug: String,
}

#[derive(sqlx::FromRow)]
struct TotalsRow {
    towns: i64,
    people: i64,
    comments: i64,
    funds_raised: String,
}

#[async_trait]
impl HomepageRepo for PostgresRepositories {
    async fn list_featured_towns(&self, limit: u32) -> Result<Vec<TownListingRecord>, RepoError> {
        let rows = sqlx::query_as::<_, TownListingRow>(
            r#"
            SELECT t.id, t.slug, t.name, t.state, t.hero_image_id,
                   (SELECT COUNT(*) FROM people p WHERE p.town_id = t.id AND p.listed)
                       AS people_count
            FROM towns t
            WHERE t.featured
            ORDER BY t.name, t.id
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| TownListingRecord {
                id: row.id,
                slug: row.slug,
                name: row.name,
                state: row.state,
                hero_image_id: row.hero_image_id,
                people_count: row.people_count,
            })
            .collect())
    }

    async fn list_recent_people(&self, limit: u32) -> Result<Vec<PersonListingRecord>, RepoError> {
        let sql = format!("{PERSON_LISTING_SELECT} ORDER BY p.created_at DESC, p.id LIMIT $1");
        let rows = sqlx::query_as::<_, PersonListingRow>(&sql)
            .bind(i64::from(limit))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PersonListingRecord::from).collect())
    }

    async fn list_recent_comments(
        &self,
        limit: u32,
    ) -> Result<Vec<RecentCommentRecord>, RepoError> {
        let rows = sqlx::query_as::<_, RecentCommentRow>(
            r#"
            SELECT c.id, c.author_name, c.body, c.created_at,
                   p.slug AS person_slug,
                   p.first_name AS person_first_name,
                   p.last_name AS person_last_name,
                   t.slug AS town_slug
            FROM comments c
            INNER JOIN people p ON p.id = c.person_id
            INNER JOIN towns t ON t.id = p.town_id
            WHERE c.approved AND p.listed
            ORDER BY c.created_at DESC, c.id
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| RecentCommentRecord {
                id: row.id,
                author_name: row.author_name,
                body: row.body,
                created_at: row.created_at,
                person_slug: row.person_slug,
                person_first_name: row.person_first_name,
                person_last_name: row.person_last_name,
                town_slug: row.town_slug,
            })
            .collect())
    }

    async fn directory_totals(&self) -> Result<DirectoryTotalsRecord, RepoError> {
        let row = sqlx::query_as::<_, TotalsRow>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM towns) AS towns,
                (SELECT COUNT(*) FROM people WHERE listed) AS people,
                (SELECT COUNT(*) FROM comments c
                    INNER JOIN people p ON p.id = c.person_id
                    WHERE c.approved AND p.listed) AS comments,
                (SELECT COALESCE(SUM(funds_raised), 0)::numeric(14, 2)::text
                    FROM people WHERE listed) AS funds_raised
            "#,
        )
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(DirectoryTotalsRecord {
            towns: row.towns,
            people: row.people,
            comments: row.comments,
            funds_raised: row.funds_raised,
        })
    }
}
