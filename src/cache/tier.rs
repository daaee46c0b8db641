//! The storage seam shared by every cache tier.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use time::OffsetDateTime;

use super::error::CacheError;
use super::keys::CacheKey;

/// Serialized JSON snapshot as stored in a tier.
pub type CachePayload = Arc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    Memory,
    Redis,
}

impl TierKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TierKind::Memory => "memory",
            TierKind::Redis => "redis",
        }
    }
}

/// TTL bookkeeping a tier can report for a stored entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    pub ttl: Duration,
    /// Known only to tiers that record write time.
    pub cached_at: Option<OffsetDateTime>,
    pub expires_at: OffsetDateTime,
}

/// A raw payload returned by a tier lookup.
#[derive(Debug, Clone)]
pub struct TierHit {
    pub payload: CachePayload,
    pub size: usize,
    pub meta: Option<EntryMeta>,
}

/// Byte accounting for size-bounded tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MemoryStats {
    pub current_size: usize,
    /// Zero when the tier is unbounded.
    pub max_size: usize,
    pub entries: usize,
}

/// A key/value store holding serialized snapshots.
///
/// Implementations return errors freely; it is the manager's job to turn
/// them into misses.
#[async_trait]
pub trait CacheTier: Send + Sync {
    fn kind(&self) -> TierKind;

    async fn get(&self, key: &CacheKey) -> Result<Option<TierHit>, CacheError>;

    /// Store `payload`, replacing any previous entry. `None` uses the tier's
    /// default TTL.
    async fn set(
        &self,
        key: &CacheKey,
        payload: CachePayload,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;

    async fn del(&self, key: &CacheKey) -> Result<(), CacheError>;

    /// Drop every entry this tier owns.
    async fn reset(&self) -> Result<(), CacheError>;

    fn entry_info(&self, _key: &CacheKey) -> Option<EntryMeta> {
        None
    }

    fn usage(&self) -> Option<MemoryStats> {
        None
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Null tier installed when a tier is switched off or unreachable.
#[derive(Debug, Clone, Copy)]
pub struct DisabledTier {
    kind: TierKind,
}

impl DisabledTier {
    pub fn new(kind: TierKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl CacheTier for DisabledTier {
    fn kind(&self) -> TierKind {
        self.kind
    }

    async fn get(&self, _key: &CacheKey) -> Result<Option<TierHit>, CacheError> {
        Ok(None)
    }

    async fn set(
        &self,
        _key: &CacheKey,
        _payload: CachePayload,
        _ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        Ok(())
    }

    async fn del(&self, _key: &CacheKey) -> Result<(), CacheError> {
        Ok(())
    }

    async fn reset(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_tier_always_misses() {
        let tier = DisabledTier::new(TierKind::Redis);
        let key = CacheKey::homepage();
        tier.set(&key, Arc::from("{}"), None).await.unwrap();
        assert!(tier.get(&key).await.unwrap().is_none());
        assert!(tier.usage().is_none());
        assert!(!tier.is_enabled());
        assert_eq!(tier.kind(), TierKind::Redis);
    }
}
