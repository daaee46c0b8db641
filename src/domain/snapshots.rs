//! Flat, serializable read-models cached for each page type.
//!
//! Snapshots hold only owned strings and numbers: timestamps are RFC 3339,
//! money is the decimal text Postgres produced. They never carry
//! per-viewer data; see [`ViewerPermissions`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entities::RoleFlags;
use crate::domain::types::NarrativeKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrls {
    pub thumbnail: String,
    pub card: String,
    pub full: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSnapshot {
    pub id: Uuid,
    pub alt_text: String,
    pub caption: Option<String>,
    pub width: i32,
    pub height: i32,
    pub urls: ImageUrls,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentSnapshot {
    pub id: Uuid,
    pub author_name: String,
    pub body: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeBlockSnapshot {
    pub position: i32,
    pub kind: NarrativeKind,
    pub heading: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilitySummary {
    pub id: Uuid,
    pub name: String,
    pub kind: String,
    pub address: Option<String>,
    pub people_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoBucket {
    pub region: String,
    pub supporters: u64,
}

/// Supporter counts grouped by region, largest bucket first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GeoSummary {
    pub total_supporters: u64,
    pub buckets: Vec<GeoBucket>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TownRef {
    pub slug: String,
    pub name: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonSnapshot {
    pub id: Uuid,
    pub slug: String,
    pub town: TownRef,
    pub display_name: String,
    pub first_name: String,
    pub last_name: String,
    pub nickname: Option<String>,
    pub occupation: Option<String>,
    pub biography: String,
    pub owner_id: Option<Uuid>,
    pub portrait: Option<ImageUrls>,
    pub images: Vec<ImageSnapshot>,
    pub comments: Vec<CommentSnapshot>,
    pub comment_count: u64,
    pub narrative: Vec<NarrativeBlockSnapshot>,
    pub facility: Option<FacilitySummary>,
    pub geo: GeoSummary,
    pub funds_raised: String,
    pub donation_goal: Option<String>,
    pub percent_funded: Option<u32>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonSummary {
    pub slug: String,
    pub town_slug: String,
    pub display_name: String,
    pub occupation: Option<String>,
    pub thumbnail_url: Option<String>,
    pub comment_count: u64,
    pub supporter_count: u64,
    pub listed_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TownSnapshot {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub state: String,
    pub county: Option<String>,
    pub description: Option<String>,
    pub population: Option<i32>,
    pub hero_image_url: Option<String>,
    pub people: Vec<PersonSummary>,
    pub people_count: u64,
    pub facilities: Vec<FacilitySummary>,
    pub geo: GeoSummary,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TownSummary {
    pub slug: String,
    pub name: String,
    pub state: String,
    pub people_count: u64,
    pub hero_image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentComment {
    pub id: Uuid,
    pub author_name: String,
    pub excerpt: String,
    pub created_at: String,
    pub person_slug: String,
    pub person_name: String,
    pub town_slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryTotals {
    pub towns: u64,
    pub people: u64,
    pub comments: u64,
    pub funds_raised: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomepageSnapshot {
    pub featured_towns: Vec<TownSummary>,
    pub recent_people: Vec<PersonSummary>,
    pub recent_comments: Vec<RecentComment>,
    pub totals: DirectoryTotals,
    pub geo: GeoSummary,
    pub generated_at: String,
}

/// What the current viewer may do on a page. Computed per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViewerPermissions {
    pub authenticated: bool,
    pub is_admin: bool,
    pub can_edit: bool,
    pub can_moderate_comments: bool,
    pub can_upload_images: bool,
}

impl ViewerPermissions {
    pub fn for_person(roles: &RoleFlags, person: &PersonSnapshot) -> Self {
        let owns = matches!(
            (roles.user_id, person.owner_id),
            (Some(user), Some(owner)) if user == owner
        );
        let can_edit = roles.is_admin || roles.is_editor || owns;
        Self {
            authenticated: roles.is_authenticated(),
            is_admin: roles.is_admin,
            can_edit,
            can_moderate_comments: roles.is_admin || roles.is_moderator,
            can_upload_images: can_edit,
        }
    }

    /// Town and homepage permissions, where no ownership applies.
    pub fn for_listing(roles: &RoleFlags) -> Self {
        let can_edit = roles.is_admin || roles.is_editor;
        Self {
            authenticated: roles.is_authenticated(),
            is_admin: roles.is_admin,
            can_edit,
            can_moderate_comments: roles.is_admin || roles.is_moderator,
            can_upload_images: can_edit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonPage {
    pub person: PersonSnapshot,
    pub viewer: ViewerPermissions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TownPage {
    pub town: TownSnapshot,
    pub viewer: ViewerPermissions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HomepagePage {
    pub homepage: HomepageSnapshot,
    pub viewer: ViewerPermissions,
}

/// `First "Nick" Last`, or `First Last` without a nickname.
pub fn display_name(first: &str, last: &str, nickname: Option<&str>) -> String {
    let nickname = nickname.map(str::trim).filter(|nick| !nick.is_empty());
    let parts: Vec<String> = match nickname {
        Some(nick) => vec![first.trim().to_string(), format!("\"{nick}\""), last.trim().to_string()],
        None => vec![first.trim().to_string(), last.trim().to_string()],
    };
    parts
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whole-percent progress toward a donation goal, capped at 100.
///
/// `None` when there is no goal, the goal is not positive, or either amount
/// fails to parse.
pub fn percent_funded(raised: &str, goal: Option<&str>) -> Option<u32> {
    let goal: f64 = goal?.trim().parse().ok()?;
    let raised: f64 = raised.trim().parse().ok()?;
    if !goal.is_finite() || goal <= 0.0 || !raised.is_finite() {
        return None;
    }
    let percent = (raised.max(0.0) / goal * 100.0).floor();
    Some(percent.min(100.0) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(owner_id: Option<Uuid>) -> PersonSnapshot {
        PersonSnapshot {
            id: Uuid::new_v4(),
            slug: "joe_plumber".into(),
            town: TownRef {
                slug: "borrego_springs".into(),
                name: "Borrego Springs".into(),
                state: "CA".into(),
            },
            display_name: "Joe Plumber".into(),
            first_name: "Joe".into(),
            last_name: "Plumber".into(),
            nickname: None,
            occupation: Some("Plumber".into()),
            biography: String::new(),
            owner_id,
            portrait: None,
            images: Vec::new(),
            comments: Vec::new(),
            comment_count: 0,
            narrative: Vec::new(),
            facility: None,
            geo: GeoSummary::default(),
            funds_raised: "0.00".into(),
            donation_goal: None,
            percent_funded: None,
            created_at: "2024-01-01T00:00:00Z".into(),
            updated_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn display_name_includes_nickname() {
        assert_eq!(display_name("Joe", "Plumber", None), "Joe Plumber");
        assert_eq!(display_name("Joe", "Plumber", Some("Pipes")), "Joe \"Pipes\" Plumber");
        assert_eq!(display_name("Cher", "", Some(" ")), "Cher");
    }

    #[test]
    fn percent_funded_handles_edges() {
        assert_eq!(percent_funded("250.00", Some("1000.00")), Some(25));
        assert_eq!(percent_funded("1500", Some("1000")), Some(100));
        assert_eq!(percent_funded("10", None), None);
        assert_eq!(percent_funded("10", Some("0")), None);
        assert_eq!(percent_funded("abc", Some("10")), None);
    }

    #[test]
    fn owners_may_edit_their_own_page() {
        let owner = Uuid::new_v4();
        let roles = RoleFlags {
            user_id: Some(owner),
            ..RoleFlags::default()
        };
        let perms = ViewerPermissions::for_person(&roles, &person(Some(owner)));
        assert!(perms.authenticated);
        assert!(perms.can_edit);
        assert!(perms.can_upload_images);
        assert!(!perms.can_moderate_comments);

        let stranger = ViewerPermissions::for_person(&roles, &person(Some(Uuid::new_v4())));
        assert!(!stranger.can_edit);
    }

    #[test]
    fn anonymous_viewers_get_nothing() {
        let perms = ViewerPermissions::for_person(&RoleFlags::anonymous(), &person(None));
        assert_eq!(perms, ViewerPermissions::default());
        assert_eq!(ViewerPermissions::for_listing(&RoleFlags::anonymous()), ViewerPermissions::default());
    }

    #[test]
    fn moderators_moderate_but_do_not_edit() {
        let roles = RoleFlags {
            user_id: Some(Uuid::new_v4()),
            is_moderator: true,
            ..RoleFlags::default()
        };
        let perms = ViewerPermissions::for_listing(&roles);
        assert!(perms.can_moderate_comments);
        assert!(!perms.can_edit);
    }
}
