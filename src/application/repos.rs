//! Collaborator traits the aggregates read through.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::{
    CommentRecord, DirectoryTotalsRecord, FacilityRecord, NarrativeBlockRecord,
    PersonImageRecord, PersonListingRecord, PersonRecord, RecentCommentRecord, RoleFlags,
    TownListingRecord, TownRecord,
};
use crate::domain::snapshots::GeoSummary;
use crate::domain::types::ImageVariant;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("could not build media url for image {image_id}: {message}")]
    InvalidUrl { image_id: Uuid, message: String },
    #[error("media service unavailable: {0}")]
    Unavailable(String),
}

/// Failure while assembling a snapshot from the source of truth.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Media(#[from] MediaError),
}

/// Scope of a supporter geo summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoScope {
    Person(Uuid),
    Town(Uuid),
    Directory,
}

#[async_trait]
pub trait TownsRepo: Send + Sync {
    async fn find_town_by_slug(&self, slug: &str) -> Result<Option<TownRecord>, RepoError>;

    async fn list_facilities(&self, town_id: Uuid) -> Result<Vec<FacilityRecord>, RepoError>;

    async fn find_facility(&self, facility_id: Uuid) -> Result<Option<FacilityRecord>, RepoError>;
}

#[async_trait]
pub trait PeopleRepo: Send + Sync {
    /// Listed people only.
    async fn find_person(
        &self,
        town_id: Uuid,
        slug: &str,
    ) -> Result<Option<PersonRecord>, RepoError>;

    /// Ordered by position.
    async fn list_images(&self, person_id: Uuid) -> Result<Vec<PersonImageRecord>, RepoError>;

    /// Approved comments, oldest first.
    async fn list_approved_comments(
        &self,
        person_id: Uuid,
    ) -> Result<Vec<CommentRecord>, RepoError>;

    /// Ordered by position.
    async fn list_narrative_blocks(
        &self,
        person_id: Uuid,
    ) -> Result<Vec<NarrativeBlockRecord>, RepoError>;

    async fn list_people_in_town(
        &self,
        town_id: Uuid,
    ) -> Result<Vec<PersonListingRecord>, RepoError>;
}

#[async_trait]
pub trait HomepageRepo: Send + Sync {
    async fn list_featured_towns(&self, limit: u32) -> Result<Vec<TownListingRecord>, RepoError>;

    async fn list_recent_people(&self, limit: u32) -> Result<Vec<PersonListingRecord>, RepoError>;

    async fn list_recent_comments(
        &self,
        limit: u32,
    ) -> Result<Vec<RecentCommentRecord>, RepoError>;

    async fn directory_totals(&self) -> Result<DirectoryTotalsRecord, RepoError>;
}

#[async_trait]
pub trait GeoSummaryService: Send + Sync {
    async fn supporter_summary(&self, scope: GeoScope) -> Result<GeoSummary, RepoError>;
}

#[async_trait]
pub trait PermissionResolver: Send + Sync {
    /// Role flags for a session token. Unknown or expired tokens resolve to
    /// anonymous flags rather than an error.
    async fn resolve(&self, session_token: &str) -> Result<RoleFlags, RepoError>;
}

#[async_trait]
pub trait MediaUrls: Send + Sync {
    async fn image_url(&self, image_id: Uuid, variant: ImageVariant)
    -> Result<String, MediaError>;
}
