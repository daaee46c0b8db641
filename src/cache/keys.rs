//! Deterministic cache keys.
//!
//! Every key has the shape `{entity}:{scope...}:{schema_version}`. Scope
//! segments are escaped so that a `:` inside a slug can never make two
//! different scopes collide.

use std::fmt;

/// Version suffix appended to every key. Bumping it orphans all older entries,
/// which then age out through their TTL.
pub const SCHEMA_VERSION: &str = "v1";

/// The aggregate a key addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Person,
    Town,
    Homepage,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Person => "person",
            EntityKind::Town => "town",
            EntityKind::Homepage => "homepage",
        }
    }
}

/// A fully composed cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    entity: EntityKind,
    rendered: String,
}

impl CacheKey {
    /// `person:{town}:{person}:v1`
    pub fn person(town_slug: &str, person_slug: &str) -> Self {
        Self::compose(EntityKind::Person, &[town_slug, person_slug])
    }

    /// `town:{town}:v1`
    pub fn town(town_slug: &str) -> Self {
        Self::compose(EntityKind::Town, &[town_slug])
    }

    /// `homepage:v1`
    pub fn homepage() -> Self {
        Self::compose(EntityKind::Homepage, &[])
    }

    fn compose(entity: EntityKind, scope: &[&str]) -> Self {
        let mut rendered = String::from(entity.as_str());
        for segment in scope {
            rendered.push(':');
            escape_segment_into(segment, &mut rendered);
        }
        rendered.push(':');
        rendered.push_str(SCHEMA_VERSION);
        Self { entity, rendered }
    }

    pub fn entity(&self) -> EntityKind {
        self.entity
    }

    pub fn as_str(&self) -> &str {
        &self.rendered
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.rendered
    }
}

fn escape_segment_into(segment: &str, out: &mut String) {
    for ch in segment.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_entity_scope_version_shape() {
        assert_eq!(
            CacheKey::person("borrego_springs", "joe_plumber").as_str(),
            "person:borrego_springs:joe_plumber:v1"
        );
        assert_eq!(CacheKey::town("borrego_springs").as_str(), "town:borrego_springs:v1");
        assert_eq!(CacheKey::homepage().as_str(), "homepage:v1");
    }

    #[test]
    fn keys_are_deterministic() {
        assert_eq!(CacheKey::person("a", "b"), CacheKey::person("a", "b"));
        assert_ne!(CacheKey::person("a", "b"), CacheKey::person("b", "a"));
    }

    #[test]
    fn colons_in_scope_cannot_collide() {
        let left = CacheKey::person("a:b", "c");
        let right = CacheKey::person("a", "b:c");
        assert_ne!(left, right);
        assert_eq!(left.as_str(), "person:a%3Ab:c:v1");
        assert_eq!(right.as_str(), "person:a:b%3Ac:v1");
    }

    #[test]
    fn percent_is_escaped_before_colon() {
        let key = CacheKey::town("50%3Aoff");
        assert_eq!(key.as_str(), "town:50%253Aoff:v1");
        assert_ne!(key, CacheKey::town("50:off"));
    }

    #[test]
    fn entity_kind_is_tracked() {
        assert_eq!(CacheKey::homepage().entity(), EntityKind::Homepage);
        assert_eq!(CacheKey::town("x").entity(), EntityKind::Town);
    }
}
