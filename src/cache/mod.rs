//! Townsfolk cache system.
//!
//! Two tiers sit in front of the Postgres aggregates:
//!
//! - **Memory**: a size-bounded, TTL-expiring map private to this process
//! - **Redis**: a namespaced shared tier reached through a connection pool
//!
//! [`CacheManager`] drives reads through both, backfills memory from Redis,
//! and writes fresh snapshots to both tiers before returning them.
//!
//! ## Configuration
//!
//! ```toml
//! [cache.memory]
//! enable = true
//! ttl_seconds = 300
//! max_size_mb = 64.0
//! cleanup_enabled = false
//! cleanup_interval_ms = 60000
//!
//! [cache.redis]
//! enable = false
//! host = "127.0.0.1"
//! port = 6379
//! namespace = "townsfolk"
//! timeout_ms = 250
//! ```
//!
//! The flat `CACHE_*` / `REDIS_*` environment variables override these; see
//! `crate::config`.

mod config;
mod distributed;
mod error;
mod keys;
mod lock;
mod manager;
mod memory;
mod stats;
mod tier;

pub use config::{
    CacheConfig, DEFAULT_NAMESPACE, MemoryTierConfig, RedisTierConfig, megabytes_to_bytes,
};
pub use distributed::{RESET_BATCH_SIZE, RedisCache};
pub use error::CacheError;
pub use keys::{CacheKey, EntityKind, SCHEMA_VERSION};
pub use manager::{CacheDashboard, CacheManager, CacheResult, CacheSource, FetchOptions};
pub use memory::{ENTRY_OVERHEAD_BYTES, MemoryCache};
pub use stats::{
    KeyQueryStats, KeyStats, MAX_TRACKED_KEYS, QueryStats, StatsRecorder, StatsSnapshot, TierStats,
};
pub use tier::{CachePayload, CacheTier, DisabledTier, EntryMeta, MemoryStats, TierHit, TierKind};

pub(crate) use config::{
    DEFAULT_MEMORY_CLEANUP_INTERVAL_MS, DEFAULT_MEMORY_MAX_SIZE_MB, DEFAULT_MEMORY_TTL_SECS,
    DEFAULT_REDIS_HOST, DEFAULT_REDIS_PORT, DEFAULT_REDIS_TIMEOUT_MS, DEFAULT_REDIS_TTL_SECS,
};
pub(crate) use lock::lock_or_recover;
