//! Hit/miss bookkeeping for the cache dashboard.
//!
//! Counters are observability only; the manager never consults them when
//! deciding where to read from.

use std::collections::BTreeMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::{counter, histogram};
use serde::Serialize;
use time::OffsetDateTime;

use crate::util::time::rfc3339;

use super::keys::CacheKey;
use super::manager::CacheSource;
use super::tier::{EntryMeta, TierKind};

const METRIC_HIT: &str = "townsfolk_cache_hit_total";
const METRIC_MISS: &str = "townsfolk_cache_miss_total";
const METRIC_SOURCE_FETCH: &str = "townsfolk_cache_source_fetch_total";
const METRIC_LOOKUP_MS: &str = "townsfolk_cache_lookup_ms";

/// Per-key rows kept for each of the key and query maps. Tier totals are
/// exact regardless.
pub const MAX_TRACKED_KEYS: usize = 1_000;

#[derive(Debug, Clone, Default)]
struct KeyCounters {
    hits: u64,
    misses: u64,
    hit_rate: f64,
    last_access: Option<OffsetDateTime>,
    size: Option<usize>,
    meta: Option<EntryMeta>,
}

impl KeyCounters {
    fn touch(&mut self) {
        let total = self.hits + self.misses;
        self.hit_rate = hit_rate(self.hits, total);
        self.last_access = Some(OffsetDateTime::now_utc());
    }
}

#[derive(Debug, Clone, Default)]
struct QueryCounters {
    count: u64,
    last_query: Option<OffsetDateTime>,
}

#[derive(Default)]
struct TierTotals {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TierTotals {
    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

/// Concurrent per-tier, per-key counters.
///
/// Keys come from request paths, so each per-key map holds at most
/// `capacity` rows; the least recently touched row makes room for a new one.
pub struct StatsRecorder {
    capacity: usize,
    keys: DashMap<(TierKind, String), KeyCounters>,
    queries: DashMap<String, QueryCounters>,
    memory: TierTotals,
    redis: TierTotals,
    query_total: AtomicU64,
}

impl Default for StatsRecorder {
    fn default() -> Self {
        Self::with_capacity(MAX_TRACKED_KEYS)
    }
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            keys: DashMap::new(),
            queries: DashMap::new(),
            memory: TierTotals::default(),
            redis: TierTotals::default(),
            query_total: AtomicU64::new(0),
        }
    }

    fn totals(&self, tier: TierKind) -> &TierTotals {
        match tier {
            TierKind::Memory => &self.memory,
            TierKind::Redis => &self.redis,
        }
    }

    pub fn record_hit(&self, tier: TierKind, key: &CacheKey, size: usize, meta: Option<&EntryMeta>) {
        counter!(METRIC_HIT, "tier" => tier.as_str()).increment(1);
        self.totals(tier).hits.fetch_add(1, Ordering::Relaxed);
        self.update_key(tier, key, |entry| {
            entry.hits += 1;
            entry.size = Some(size);
            if let Some(meta) = meta {
                entry.meta = Some(meta.clone());
            }
            entry.touch();
        });
    }

    pub fn record_miss(&self, tier: TierKind, key: &CacheKey) {
        counter!(METRIC_MISS, "tier" => tier.as_str()).increment(1);
        self.totals(tier).misses.fetch_add(1, Ordering::Relaxed);
        self.update_key(tier, key, |entry| {
            entry.misses += 1;
            entry.touch();
        });
    }

    /// Count one read against the source of truth.
    pub fn record_query(&self, key: &CacheKey) {
        counter!(METRIC_SOURCE_FETCH).increment(1);
        self.query_total.fetch_add(1, Ordering::Relaxed);
        let id = key.as_str().to_string();
        let inserted = upsert(&self.queries, id.clone(), |entry| {
            entry.count += 1;
            entry.last_query = Some(OffsetDateTime::now_utc());
        });
        if inserted {
            evict_stalest(&self.queries, self.capacity, &id, |entry| entry.last_query);
        }
    }

    fn update_key(&self, tier: TierKind, key: &CacheKey, apply: impl FnOnce(&mut KeyCounters)) {
        let id = (tier, key.as_str().to_string());
        if upsert(&self.keys, id.clone(), apply) {
            evict_stalest(&self.keys, self.capacity, &id, |entry| entry.last_access);
        }
    }

    pub fn record_lookup(&self, source: CacheSource, latency: Duration) {
        histogram!(METRIC_LOOKUP_MS, "source" => source.as_str())
            .record(latency.as_secs_f64() * 1000.0);
    }

    pub fn get_stats(&self) -> StatsSnapshot {
        let mut memory = TierStats::from(&self.memory);
        let mut redis = TierStats::from(&self.redis);

        for item in self.keys.iter() {
            let (tier, key) = item.key();
            let target = match tier {
                TierKind::Memory => &mut memory,
                TierKind::Redis => &mut redis,
            };
            target.keys.insert(key.clone(), KeyStats::from(item.value()));
        }

        let mut database = QueryStats {
            total: self.query_total.load(Ordering::Relaxed),
            keys: BTreeMap::new(),
        };
        for item in self.queries.iter() {
            database.keys.insert(
                item.key().clone(),
                KeyQueryStats {
                    count: item.count,
                    last_query: item.last_query.map(rfc3339),
                },
            );
        }

        StatsSnapshot {
            memory,
            redis,
            database,
        }
    }

    pub fn reset(&self) {
        self.keys.clear();
        self.queries.clear();
        self.memory.reset();
        self.redis.reset();
        self.query_total.store(0, Ordering::Relaxed);
    }
}

/// Apply `update` to the row for `id`, creating it if needed. Returns whether
/// the row is new. The shard lock is released before returning.
fn upsert<K, V>(map: &DashMap<K, V>, id: K, update: impl FnOnce(&mut V)) -> bool
where
    K: Eq + Hash,
    V: Default,
{
    match map.entry(id) {
        Entry::Occupied(mut occupied) => {
            update(occupied.get_mut());
            false
        }
        Entry::Vacant(vacant) => {
            let mut value = V::default();
            update(&mut value);
            vacant.insert(value);
            true
        }
    }
}

/// Drop least recently touched rows, other than `keep`, until `map` is back
/// within `capacity`.
fn evict_stalest<K, V>(
    map: &DashMap<K, V>,
    capacity: usize,
    keep: &K,
    touched: impl Fn(&V) -> Option<OffsetDateTime>,
) where
    K: Eq + Hash + Clone,
{
    while map.len() > capacity {
        let stalest = map
            .iter()
            .filter(|item| item.key() != keep)
            .min_by_key(|item| touched(item.value()))
            .map(|item| item.key().clone());
        match stalest {
            Some(id) => {
                map.remove(&id);
            }
            None => break,
        }
    }
}

fn hit_rate(hits: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64 * 100.0
    }
}

/// Serializable view served by the dashboard endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub memory: TierStats,
    pub redis: TierStats,
    pub database: QueryStats,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub keys: BTreeMap<String, KeyStats>,
}

impl From<&TierTotals> for TierStats {
    fn from(totals: &TierTotals) -> Self {
        let hits = totals.hits.load(Ordering::Relaxed);
        let misses = totals.misses.load(Ordering::Relaxed);
        Self {
            hits,
            misses,
            hit_rate: hit_rate(hits, hits + misses),
            keys: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub last_access: Option<String>,
    pub size: Option<usize>,
    pub ttl_ms: Option<u64>,
    pub cached_at: Option<String>,
    pub expires_at: Option<String>,
}

impl From<&KeyCounters> for KeyStats {
    fn from(counters: &KeyCounters) -> Self {
        let meta = counters.meta.as_ref();
        Self {
            hits: counters.hits,
            misses: counters.misses,
            hit_rate: counters.hit_rate,
            last_access: counters.last_access.map(rfc3339),
            size: counters.size,
            ttl_ms: meta.map(|meta| u64::try_from(meta.ttl.as_millis()).unwrap_or(u64::MAX)),
            cached_at: meta.and_then(|meta| meta.cached_at).map(rfc3339),
            expires_at: meta.map(|meta| rfc3339(meta.expires_at)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryStats {
    pub total: u64,
    pub keys: BTreeMap<String, KeyQueryStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyQueryStats {
    pub count: u64,
    pub last_query: Option<String>,
}
