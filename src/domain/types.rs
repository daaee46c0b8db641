//! Shared domain enumerations aligned with persisted database enums.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "narrative_kind", rename_all = "snake_case")]
pub enum NarrativeKind {
    Story,
    Quote,
    Milestone,
}

/// Rendition requested from the media service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageVariant {
    Thumbnail,
    Card,
    Full,
}

impl ImageVariant {
    pub const ALL: [ImageVariant; 3] = [
        ImageVariant::Thumbnail,
        ImageVariant::Card,
        ImageVariant::Full,
    ];

    pub fn width(self) -> u32 {
        match self {
            ImageVariant::Thumbnail => 160,
            ImageVariant::Card => 480,
            ImageVariant::Full => 1600,
        }
    }

    pub fn quality(self) -> u8 {
        match self {
            ImageVariant::Thumbnail => 70,
            ImageVariant::Card => 80,
            ImageVariant::Full => 85,
        }
    }
}

/// Who is asking for a page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Principal {
    #[default]
    Anonymous,
    /// An opaque session token presented by the client.
    Session(String),
}

impl Principal {
    pub fn from_bearer(token: &str) -> Self {
        let token = token.trim();
        if token.is_empty() {
            Principal::Anonymous
        } else {
            Principal::Session(token.to_string())
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }
}
