use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{PeopleRepo, RepoError},
    domain::{
        entities::{
            CommentRecord, NarrativeBlockRecord, PersonImageRecord, PersonListingRecord,
            PersonRecord,
        },
        types::NarrativeKind,
    },
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct PersonRow {
    id: Uuid,
    town_id: Uuid,
    slug: String,
    first_name: String,
    last_name: String,
    nickname: Option<String>,
    occupation: Option<String>,
    biography: String,
    portrait_image_id: Option<Uuid>,
    facility_id: Option<Uuid>,
    owner_id: Option<Uuid>,
    donation_goal: Option<String>,
    funds_raised: String,
    listed: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<PersonRow> for PersonRecord {
    fn from(row: PersonRow) -> Self {
        Self {
            id: row.id,
            town_id: row.town_id,
            slug: row.slug,
            first_name: row.first_name,
            last_name: row.last_name,
            nickname: row.nickname,
            occupation: row.occupation,
            biography: row.biography,
            portrait_image_id: row.portrait_image_id,
            facility_id: row.facility_id,
            owner_id: row.owner_id,
            donation_goal: row.donation_goal,
            funds_raised: row.funds_raised,
            listed: row.listed,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PersonImageRow {
    image_id: Uuid,
    position: i32,
    alt_text: String,
    caption: Option<String>,
    width: i32,
    height: i32,
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: Uuid,
    author_name: String,
    body: String,
    created_at: OffsetDateTime,
}

#[derive(sqlx::FromRow)]
struct NarrativeBlockRow {
    id: Uuid,
    position: i32,
    kind: NarrativeKind,
    heading: Option<String>,
    body: String,
}

#[derive(sqlx::FromRow)]
pub(super) struct PersonListingRow {
    id: Uuid,
    slug: String,
    town_slug: String,
    first_name: String,
    last_name: String,
    nickname: Option<String>,
    occupation: Option<String>,
    portrait_image_id: Option<Uuid>,
    comment_count: i64,
    supporter_count: i64,
    created_at: OffsetDateTime,
}

impl From<PersonListingRow> for PersonListingRecord {
    fn from(row: PersonListingRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            town_slug: row.town_slug,
            first_name: row.first_name,
            last_name: row.last_name,
            nickname: row.nickname,
            occupation: row.occupation,
            portrait_image_id: row.portrait_image_id,
            comment_count: row.comment_count,
            supporter_count: row.supporter_count,
            created_at: row.created_at,
        }
    }
}

/// Listed people joined with their town slug and engagement counts. Callers
/// append their own filter and ordering.
pub(super) const PERSON_LISTING_SELECT: &str = r#"
    SELECT p.id, p.slug, t.slug AS town_slug, p.first_name, p.last_name,
           p.nickname, p.occupation, p.portrait_image_id,
           (SELECT COUNT(*) FROM comments c WHERE c.person_id = p.id AND c.approved)
               AS comment_count,
           (SELECT COUNT(*) FROM supporters s WHERE s.person_id = p.id)
               AS supporter_count,
           p.created_at
    FROM people p
    INNER JOIN towns t ON t.id = p.town_id
    WHERE p.listed
"#;

#[async_trait]
impl PeopleRepo for PostgresRepositories {
    async fn find_person(
        &self,
        town_id: Uuid,
        slug: &str,
    ) -> Result<Option<PersonRecord>, RepoError> {
        let row = sqlx::query_as::<_, PersonRow>(
            r#"
            SELECT id, town_id, slug, first_name, last_name, nickname, occupation,
                   biography, portrait_image_id, facility_id, owner_id,
                   donation_goal::text AS donation_goal,
                   funds_raised::text AS funds_raised,
                   listed, created_at, updated_at
            FROM people
            WHERE town_id = $1 AND slug = $2 AND listed
            "#,
        )
        .bind(town_id)
        .bind(slug)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PersonRecord::from))
    }

    async fn list_images(&self, person_id: Uuid) -> Result<Vec<PersonImageRecord>, RepoError> {
        let rows = sqlx::query_as::<_, PersonImageRow>(
            r#"
            SELECT pi.image_id, pi.position, pi.alt_text, pi.caption, i.width, i.height
            FROM person_images pi
            INNER JOIN images i ON i.id = pi.image_id
            WHERE pi.person_id = $1
            ORDER BY pi.position, pi.image_id
            "#,
        )
        .bind(person_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| PersonImageRecord {
                image_id: row.image_id,
                position: row.position,
                alt_text: row.alt_text,
                caption: row.caption,
                width: row.width,
                height: row.height,
            })
            .collect())
    }

    async fn list_approved_comments(
        &self,
        person_id: Uuid,
    ) -> Result<Vec<CommentRecord>, RepoError> {
        let rows = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT id, author_name, body, created_at
            FROM comments
            WHERE person_id = $1 AND approved
            ORDER BY created_at, id
            "#,
        )
        .bind(person_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| CommentRecord {
                id: row.id,
                author_name: row.author_name,
                body: row.body,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn list_narrative_blocks(
        &self,
        person_id: Uuid,
    ) -> Result<Vec<NarrativeBlockRecord>, RepoError> {
        let rows = sqlx::query_as::<_, NarrativeBlockRow>(
            r#"
            SELECT id, position, kind, heading, body
            FROM narrative_blocks
            WHERE person_id = $1
            ORDER BY position, id
            "#,
        )
        .bind(person_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| NarrativeBlockRecord {
                id: row.id,
                position: row.position,
                kind: row.kind,
                heading: row.heading,
                body: row.body,
            })
            .collect())
    }

    async fn list_people_in_town(
        &self,
        town_id: Uuid,
    ) -> Result<Vec<PersonListingRecord>, RepoError> {
        let sql = format!(
            "{PERSON_LISTING_SELECT} AND p.town_id = $1 ORDER BY p.last_name, p.first_name, p.id"
        );
        let rows = sqlx::query_as::<_, PersonListingRow>(&sql)
            .bind(town_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PersonListingRecord::from).collect())
    }
}
