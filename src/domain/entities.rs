//! Domain entities mirrored from persistent storage.

use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::NarrativeKind;

#[derive(Debug, Clone, PartialEq)]
pub struct TownRecord {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub state: String,
    pub county: Option<String>,
    pub description: Option<String>,
    pub population: Option<i32>,
    pub hero_image_id: Option<Uuid>,
    pub featured: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonRecord {
    pub id: Uuid,
    pub town_id: Uuid,
    pub slug: String,
    pub first_name: String,
    pub last_name: String,
    pub nickname: Option<String>,
    pub occupation: Option<String>,
    pub biography: String,
    pub portrait_image_id: Option<Uuid>,
    pub facility_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    /// Postgres `numeric` rendered as text.
    pub donation_goal: Option<String>,
    pub funds_raised: String,
    pub listed: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonImageRecord {
    pub image_id: Uuid,
    pub position: i32,
    pub alt_text: String,
    pub caption: Option<String>,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentRecord {
    pub id: Uuid,
    pub author_name: String,
    pub body: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NarrativeBlockRecord {
    pub id: Uuid,
    pub position: i32,
    pub kind: NarrativeKind,
    pub heading: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FacilityRecord {
    pub id: Uuid,
    pub town_id: Uuid,
    pub name: String,
    pub kind: String,
    pub address: Option<String>,
    pub people_count: i64,
}

/// A listed person as it appears in town and homepage listings.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonListingRecord {
    pub id: Uuid,
    pub slug: String,
    pub town_slug: String,
    pub first_name: String,
    pub last_name: String,
    pub nickname: Option<String>,
    pub occupation: Option<String>,
    pub portrait_image_id: Option<Uuid>,
    pub comment_count: i64,
    pub supporter_count: i64,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TownListingRecord {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub state: String,
    pub hero_image_id: Option<Uuid>,
    pub people_count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecentCommentRecord {
    pub id: Uuid,
    pub author_name: String,
    pub body: String,
    pub created_at: OffsetDateTime,
    pub person_slug: String,
    pub person_first_name: String,
    pub person_last_name: String,
    pub town_slug: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryTotalsRecord {
    pub towns: i64,
    pub people: i64,
    pub comments: i64,
    pub funds_raised: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoBucketRecord {
    pub region: String,
    pub supporters: i64,
}

/// Role flags attached to an authenticated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoleFlags {
    pub user_id: Option<Uuid>,
    pub is_admin: bool,
    pub is_editor: bool,
    pub is_moderator: bool,
}

impl RoleFlags {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}
