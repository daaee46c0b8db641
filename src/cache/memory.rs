//! Size-bounded in-process tier.
//!
//! Entries are accounted as `payload.len() * 2 + ENTRY_OVERHEAD_BYTES` bytes.
//! When a write would exceed the budget, entries are evicted in ascending
//! expiry order until the new entry fits. Expired entries are removed lazily
//! on read, and optionally by a periodic sweep.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, gauge};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::config::MemoryTierConfig;
use super::error::CacheError;
use super::keys::CacheKey;
use super::lock::lock_or_recover;
use super::tier::{CachePayload, CacheTier, EntryMeta, MemoryStats, TierHit, TierKind};

const SOURCE: &str = "cache::memory";

/// Fixed per-entry cost added to the payload estimate.
pub const ENTRY_OVERHEAD_BYTES: usize = 64;

/// Ceiling for TTLs that would overflow the monotonic clock.
const MAX_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 10);

const METRIC_BYTES: &str = "townsfolk_cache_memory_bytes";
const METRIC_ENTRIES: &str = "townsfolk_cache_memory_entries";
const METRIC_EVICT: &str = "townsfolk_cache_memory_evict_total";
const METRIC_SKIP: &str = "townsfolk_cache_memory_skip_total";

struct MemoryEntry {
    payload: CachePayload,
    expires_at: Instant,
    size: usize,
    ttl: Duration,
    cached_at: OffsetDateTime,
}

impl MemoryEntry {
    fn meta(&self) -> EntryMeta {
        EntryMeta {
            ttl: self.ttl,
            cached_at: Some(self.cached_at),
            expires_at: self.cached_at + self.ttl,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    entries: HashMap<String, MemoryEntry>,
    by_expiry: BTreeSet<(Instant, String)>,
    current_size: usize,
}

impl MemoryState {
    fn insert(&mut self, key: String, entry: MemoryEntry) {
        self.current_size += entry.size;
        self.by_expiry.insert((entry.expires_at, key.clone()));
        self.entries.insert(key, entry);
    }

    fn remove(&mut self, key: &str) -> Option<MemoryEntry> {
        let entry = self.entries.remove(key)?;
        self.by_expiry.remove(&(entry.expires_at, key.to_string()));
        self.current_size = self.current_size.saturating_sub(entry.size);
        Some(entry)
    }

    /// Drop the entry closest to expiry.
    fn evict_soonest(&mut self) -> Option<String> {
        let (_, key) = self.by_expiry.pop_first()?;
        if let Some(entry) = self.entries.remove(&key) {
            self.current_size = self.current_size.saturating_sub(entry.size);
        }
        Some(key)
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        loop {
            let expired = matches!(self.by_expiry.first(), Some((at, _)) if *at < now);
            if !expired {
                break;
            }
            let Some((_, key)) = self.by_expiry.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.current_size = self.current_size.saturating_sub(entry.size);
            }
            removed += 1;
        }
        removed
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.by_expiry.clear();
        self.current_size = 0;
    }

    fn publish_gauges(&self) {
        gauge!(METRIC_BYTES).set(self.current_size as f64);
        gauge!(METRIC_ENTRIES).set(self.entries.len() as f64);
    }
}

/// In-process tier with byte-budget eviction.
pub struct MemoryCache {
    state: Mutex<MemoryState>,
    max_size: usize,
    default_ttl: Duration,
}

impl MemoryCache {
    /// `max_size` of zero disables the byte budget.
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            max_size,
            default_ttl,
        }
    }

    pub fn from_config(config: &MemoryTierConfig) -> Self {
        Self::new(config.max_size_bytes, config.ttl)
    }

    /// Accounted size of a payload.
    pub fn estimate_size(payload: &str) -> usize {
        payload.len() * 2 + ENTRY_OVERHEAD_BYTES
    }

    fn state(&self, op: &'static str) -> MutexGuard<'_, MemoryState> {
        lock_or_recover(&self.state, SOURCE, op)
    }

    pub fn lookup(&self, key: &str) -> Option<TierHit> {
        let now = Instant::now();
        let mut state = self.state("lookup");
        match state.entries.get(key) {
            None => return None,
            Some(entry) if now <= entry.expires_at => {
                return Some(TierHit {
                    payload: Arc::clone(&entry.payload),
                    size: entry.size,
                    meta: Some(entry.meta()),
                });
            }
            Some(_) => {}
        }
        state.remove(key);
        state.publish_gauges();
        trace!(key, "memory entry expired on read");
        None
    }

    /// Insert `payload`, evicting soonest-to-expire entries as needed.
    ///
    /// Returns `false` when the entry alone exceeds the budget; any previous
    /// entry under `key` is gone either way.
    pub fn store(&self, key: &str, payload: CachePayload, ttl: Option<Duration>) -> bool {
        let size = Self::estimate_size(&payload);
        let ttl = ttl.unwrap_or(self.default_ttl).min(MAX_TTL);
        let now = Instant::now();

        let mut state = self.state("store");
        state.remove(key);

        if self.max_size > 0 && size > self.max_size {
            state.publish_gauges();
            drop(state);
            counter!(METRIC_SKIP).increment(1);
            debug!(
                key,
                size,
                max_size = self.max_size,
                "entry exceeds memory budget; not cached"
            );
            return false;
        }

        if self.max_size > 0 {
            let mut evicted = 0u64;
            while state.current_size + size > self.max_size {
                match state.evict_soonest() {
                    Some(victim) => {
                        evicted += 1;
                        trace!(key = %victim, "evicted to make room");
                    }
                    None => break,
                }
            }
            if evicted > 0 {
                counter!(METRIC_EVICT).increment(evicted);
            }
        }

        state.insert(
            key.to_string(),
            MemoryEntry {
                payload,
                expires_at: now + ttl,
                size,
                ttl,
                cached_at: OffsetDateTime::now_utc(),
            },
        );
        state.publish_gauges();
        true
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut state = self.state("remove");
        let removed = state.remove(key).is_some();
        state.publish_gauges();
        removed
    }

    pub fn clear(&self) {
        let mut state = self.state("clear");
        state.clear();
        state.publish_gauges();
    }

    /// Remove every entry whose TTL has lapsed.
    pub fn purge_expired(&self) -> usize {
        let mut state = self.state("purge_expired");
        let removed = state.purge_expired(Instant::now());
        state.publish_gauges();
        removed
    }

    pub fn stats(&self) -> MemoryStats {
        let state = self.state("stats");
        MemoryStats {
            current_size: state.current_size,
            max_size: self.max_size,
            entries: state.entries.len(),
        }
    }

    pub fn info(&self, key: &str) -> Option<EntryMeta> {
        self.state("info").entries.get(key).map(MemoryEntry::meta)
    }

    /// Start the periodic sweep. The task ends once the cache is dropped.
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let removed = cache.purge_expired();
                if removed > 0 {
                    debug!(removed, "memory sweep removed expired entries");
                }
            }
        })
    }
}

#[async_trait]
impl CacheTier for MemoryCache {
    fn kind(&self) -> TierKind {
        TierKind::Memory
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<TierHit>, CacheError> {
        Ok(self.lookup(key.as_str()))
    }

    async fn set(
        &self,
        key: &CacheKey,
        payload: CachePayload,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.store(key.as_str(), payload, ttl);
        Ok(())
    }

    async fn del(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.remove(key.as_str());
        Ok(())
    }

    async fn reset(&self) -> Result<(), CacheError> {
        self.clear();
        Ok(())
    }

    fn entry_info(&self, key: &CacheKey) -> Option<EntryMeta> {
        self.info(key.as_str())
    }

    fn usage(&self) -> Option<MemoryStats> {
        Some(self.stats())
    }
}
