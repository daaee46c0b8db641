//! Read-through orchestration across the memory and distributed tiers.
//!
//! ```text
//! memory ──hit──▶ return (memory)
//!   │ miss
//!   ▼
//! redis ──hit──▶ backfill memory ──▶ return (redis)
//!   │ miss
//!   ▼
//! source ──▶ populate both tiers ──▶ return (database)
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::CacheConfig;
use super::distributed::RedisCache;
use super::error::CacheError;
use super::keys::CacheKey;
use super::lock::lock_or_recover;
use super::memory::MemoryCache;
use super::stats::{StatsRecorder, StatsSnapshot};
use super::tier::{CachePayload, CacheTier, DisabledTier, MemoryStats, TierKind};

const SOURCE: &str = "cache::manager";

/// Where a result was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSource {
    Memory,
    Redis,
    Database,
}

impl CacheSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheSource::Memory => "memory",
            CacheSource::Redis => "redis",
            CacheSource::Database => "database",
        }
    }
}

impl From<TierKind> for CacheSource {
    fn from(kind: TierKind) -> Self {
        match kind {
            TierKind::Memory => CacheSource::Memory,
            TierKind::Redis => CacheSource::Redis,
        }
    }
}

/// Outcome of a read-through lookup. `source` and `latency` are diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct CacheResult<T> {
    pub data: Option<T>,
    pub source: CacheSource,
    #[serde(rename = "latency_ms", serialize_with = "serialize_millis")]
    pub latency: Duration,
}

impl<T> CacheResult<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
        CacheResult {
            data: self.data.map(f),
            source: self.source,
            latency: self.latency,
        }
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }
}

fn serialize_millis<S: Serializer>(latency: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(latency.as_secs_f64() * 1000.0)
}

/// Per-call knobs for [`CacheManager::get_or_fetch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Skip both tiers, read the source and write the result through.
    pub force_refresh: bool,
    /// TTL applied to every tier written by this call.
    pub ttl: Option<Duration>,
}

impl FetchOptions {
    pub fn refresh() -> Self {
        Self {
            force_refresh: true,
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Payload served by the operations dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct CacheDashboard {
    pub stats: StatsSnapshot,
    pub memory: Option<MemoryStats>,
    pub memory_enabled: bool,
    pub redis_enabled: bool,
}

/// Owns both tiers and the stats recorder. Shared by `Arc`.
pub struct CacheManager {
    memory: Arc<dyn CacheTier>,
    distributed: Arc<dyn CacheTier>,
    stats: Arc<StatsRecorder>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CacheManager {
    /// Build the tiers described by `config`.
    ///
    /// An unreachable Redis is logged and replaced by a [`DisabledTier`].
    pub async fn init(config: &CacheConfig) -> Self {
        let mut sweeper = None;
        let memory: Arc<dyn CacheTier> = if config.memory.enabled {
            let cache = Arc::new(MemoryCache::from_config(&config.memory));
            if let Some(interval) = config.memory.cleanup_interval {
                sweeper = Some(cache.spawn_cleanup(interval));
            }
            info!(
                max_size_bytes = config.memory.max_size_bytes,
                ttl_secs = config.memory.ttl.as_secs(),
                sweep = config.memory.cleanup_interval.is_some(),
                "memory cache tier enabled"
            );
            cache
        } else {
            info!("memory cache tier disabled");
            Arc::new(DisabledTier::new(TierKind::Memory))
        };

        let distributed: Arc<dyn CacheTier> = if config.redis.enabled {
            match RedisCache::connect(&config.redis).await {
                Ok(cache) => {
                    info!(
                        url = %config.redis.url(),
                        namespace = %config.redis.namespace,
                        "distributed cache tier connected"
                    );
                    Arc::new(cache)
                }
                Err(err) => {
                    warn!(
                        source = SOURCE,
                        url = %config.redis.url(),
                        error = %err,
                        "distributed cache tier unavailable; continuing without it"
                    );
                    Arc::new(DisabledTier::new(TierKind::Redis))
                }
            }
        } else {
            info!("distributed cache tier disabled");
            Arc::new(DisabledTier::new(TierKind::Redis))
        };

        let manager = Self::with_tiers(memory, distributed);
        *lock_or_recover(&manager.sweeper, SOURCE, "init") = sweeper;
        manager
    }

    /// Assemble a manager from prebuilt tiers.
    pub fn with_tiers(memory: Arc<dyn CacheTier>, distributed: Arc<dyn CacheTier>) -> Self {
        Self {
            memory,
            distributed,
            stats: Arc::new(StatsRecorder::new()),
            sweeper: Mutex::new(None),
        }
    }

    /// Both tiers disabled; every call reads the source.
    pub fn disabled() -> Self {
        Self::with_tiers(
            Arc::new(DisabledTier::new(TierKind::Memory)),
            Arc::new(DisabledTier::new(TierKind::Redis)),
        )
    }

    pub fn stats(&self) -> &Arc<StatsRecorder> {
        &self.stats
    }

    pub fn memory_tier(&self) -> &Arc<dyn CacheTier> {
        &self.memory
    }

    pub fn distributed_tier(&self) -> &Arc<dyn CacheTier> {
        &self.distributed
    }

    /// Resolve `key` through memory, then Redis, then `fetch`.
    ///
    /// Tier failures are logged and treated as misses. Errors from `fetch`
    /// are returned unchanged. A `None` from `fetch` is cached like any other
    /// value.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        options: FetchOptions,
        fetch: F,
    ) -> Result<CacheResult<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let started = Instant::now();

        if !options.force_refresh {
            if let Some((data, _)) = self.read_tier::<T>(&*self.memory, key).await {
                return Ok(self.finish(data, CacheSource::Memory, started));
            }

            if let Some((data, payload)) = self.read_tier::<T>(&*self.distributed, key).await {
                self.write_tier(&*self.memory, key, payload, options.ttl).await;
                return Ok(self.finish(data, CacheSource::Redis, started));
            }
        }

        self.stats.record_query(key);
        let data = fetch().await?;

        match serde_json::to_string(&data) {
            Ok(json) => {
                let payload: CachePayload = Arc::from(json);
                self.write_tier(&*self.memory, key, Arc::clone(&payload), options.ttl)
                    .await;
                self.write_tier(&*self.distributed, key, payload, options.ttl)
                    .await;
            }
            Err(err) => {
                let err = CacheError::serialization(key.as_str(), err);
                warn!(op = "populate", key = %key, error = %err, "snapshot not cached");
            }
        }

        Ok(self.finish(data, CacheSource::Database, started))
    }

    async fn read_tier<T: DeserializeOwned>(
        &self,
        tier: &dyn CacheTier,
        key: &CacheKey,
    ) -> Option<(Option<T>, CachePayload)> {
        let kind = tier.kind();
        let hit = match tier.get(key).await {
            Ok(Some(hit)) => hit,
            Ok(None) => {
                self.stats.record_miss(kind, key);
                return None;
            }
            Err(err) => {
                warn!(
                    op = "get",
                    tier = kind.as_str(),
                    key = %key,
                    error = %err,
                    "cache read failed; treating as miss"
                );
                self.stats.record_miss(kind, key);
                return None;
            }
        };

        match serde_json::from_str::<Option<T>>(&hit.payload) {
            Ok(data) => {
                self.stats.record_hit(kind, key, hit.size, hit.meta.as_ref());
                Some((data, hit.payload))
            }
            Err(err) => {
                let err = CacheError::serialization(key.as_str(), err);
                warn!(
                    op = "decode",
                    tier = kind.as_str(),
                    key = %key,
                    error = %err,
                    "discarding undecodable cache entry"
                );
                self.stats.record_miss(kind, key);
                if let Err(err) = tier.del(key).await {
                    debug!(op = "del", tier = kind.as_str(), key = %key, error = %err, "failed to drop corrupt entry");
                }
                None
            }
        }
    }

    async fn write_tier(
        &self,
        tier: &dyn CacheTier,
        key: &CacheKey,
        payload: CachePayload,
        ttl: Option<Duration>,
    ) {
        if let Err(err) = tier.set(key, payload, ttl).await {
            warn!(
                op = "set",
                tier = tier.kind().as_str(),
                key = %key,
                error = %err,
                "cache write failed"
            );
        }
    }

    fn finish<T>(&self, data: Option<T>, source: CacheSource, started: Instant) -> CacheResult<T> {
        let latency = started.elapsed();
        self.stats.record_lookup(source, latency);
        debug!(source = source.as_str(), latency_ms = latency.as_secs_f64() * 1000.0, found = data.is_some(), "cache lookup resolved");
        CacheResult {
            data,
            source,
            latency,
        }
    }

    /// Delete `key` from both tiers. Failures are logged, never returned.
    pub async fn invalidate(&self, key: &CacheKey) {
        for tier in [&self.memory, &self.distributed] {
            if let Err(err) = tier.del(key).await {
                warn!(
                    op = "del",
                    tier = tier.kind().as_str(),
                    key = %key,
                    error = %err,
                    "cache invalidation failed"
                );
            }
        }
        debug!(key = %key, "cache entry invalidated");
    }

    /// Empty both tiers and zero the stats.
    pub async fn reset(&self) {
        for tier in [&self.memory, &self.distributed] {
            if let Err(err) = tier.reset().await {
                warn!(op = "reset", tier = tier.kind().as_str(), error = %err, "cache reset failed");
            }
        }
        self.stats.reset();
        info!("cache tiers reset");
    }

    pub fn dashboard(&self) -> CacheDashboard {
        CacheDashboard {
            stats: self.stats.get_stats(),
            memory: self.memory.usage(),
            memory_enabled: self.memory.is_enabled(),
            redis_enabled: self.distributed.is_enabled(),
        }
    }

    /// Stop the background sweep, if one is running.
    pub fn shutdown(&self) {
        if let Some(handle) = lock_or_recover(&self.sweeper, SOURCE, "shutdown").take() {
            handle.abort();
            debug!("memory sweep stopped");
        }
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde::Deserialize;

    use super::*;
    use crate::cache::stats::MAX_TRACKED_KEYS;
    use crate::cache::tier::{EntryMeta, TierHit};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Snapshot {
        name: String,
    }

    fn memory_manager() -> CacheManager {
        CacheManager::with_tiers(
            Arc::new(MemoryCache::new(0, Duration::from_secs(60))),
            Arc::new(DisabledTier::new(TierKind::Redis)),
        )
    }

    struct FailingTier;

    #[async_trait]
    impl CacheTier for FailingTier {
        fn kind(&self) -> TierKind {
            TierKind::Redis
        }

        async fn get(&self, _key: &CacheKey) -> Result<Option<TierHit>, CacheError> {
            Err(CacheError::timeout("get", Duration::from_millis(250)))
        }

        async fn set(
            &self,
            _key: &CacheKey,
            _payload: CachePayload,
            _ttl: Option<Duration>,
        ) -> Result<(), CacheError> {
            Err(CacheError::backend("set", "connection refused"))
        }

        async fn del(&self, _key: &CacheKey) -> Result<(), CacheError> {
            Err(CacheError::backend("del", "connection refused"))
        }

        async fn reset(&self) -> Result<(), CacheError> {
            Err(CacheError::backend("reset", "connection refused"))
        }

        fn entry_info(&self, _key: &CacheKey) -> Option<EntryMeta> {
            None
        }
    }

    #[tokio::test]
    async fn unknown_slugs_do_not_grow_stats_without_bound() {
        let manager = CacheManager::with_tiers(
            Arc::new(MemoryCache::new(4 * 1024, Duration::from_secs(60))),
            Arc::new(DisabledTier::new(TierKind::Redis)),
        );
        let lookups = MAX_TRACKED_KEYS + 200;

        for index in 0..lookups {
            let key = CacheKey::person("borrego_springs", &format!("nobody_{index}"));
            let result = manager
                .get_or_fetch(&key, FetchOptions::default(), || async {
                    Ok::<Option<Snapshot>, Infallible>(None)
                })
                .await
                .unwrap();
            assert!(result.data.is_none());
        }

        let stats = manager.dashboard().stats;
        assert!(stats.memory.keys.len() + stats.redis.keys.len() <= MAX_TRACKED_KEYS);
        assert!(stats.database.keys.len() <= MAX_TRACKED_KEYS);
        assert_eq!(stats.memory.misses, lookups as u64);
        assert_eq!(stats.redis.misses, lookups as u64);
        assert_eq!(stats.database.total, lookups as u64);
    }

    #[tokio::test]
    async fn cold_then_warm_read() {
        let manager = memory_manager();
        let key = CacheKey::town("borrego_springs");
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let fetch = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(Some(Snapshot {
                name: "Borrego Springs".into(),
            }))
        };

        let first = manager
            .get_or_fetch(&key, FetchOptions::default(), fetch)
            .await
            .unwrap();
        assert_eq!(first.source, CacheSource::Database);

        let second = manager
            .get_or_fetch(&key, FetchOptions::default(), fetch)
            .await
            .unwrap();
        assert_eq!(second.source, CacheSource::Memory);
        assert_eq!(second.data, first.data);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn source_errors_propagate_and_are_not_cached() {
        let manager = memory_manager();
        let key = CacheKey::homepage();

        let err = manager
            .get_or_fetch(&key, FetchOptions::default(), || async {
                Err::<Option<Snapshot>, _>("db down")
            })
            .await
            .unwrap_err();
        assert_eq!(err, "db down");
        assert!(manager.memory_tier().get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tier_failures_degrade_to_source_reads() {
        let manager = CacheManager::with_tiers(
            Arc::new(DisabledTier::new(TierKind::Memory)),
            Arc::new(FailingTier),
        );
        let key = CacheKey::homepage();

        let result = manager
            .get_or_fetch(&key, FetchOptions::default(), || async {
                Ok::<_, Infallible>(Some(Snapshot { name: "home".into() }))
            })
            .await
            .unwrap();
        assert_eq!(result.source, CacheSource::Database);
        assert_eq!(result.data.unwrap().name, "home");

        manager.invalidate(&key).await;
        manager.reset().await;
    }

    #[tokio::test]
    async fn corrupt_payload_is_a_miss_and_is_removed() {
        let manager = memory_manager();
        let key = CacheKey::homepage();
        manager
            .memory_tier()
            .set(&key, Arc::from("{not json"), None)
            .await
            .unwrap();

        let result = manager
            .get_or_fetch(&key, FetchOptions::default(), || async {
                Ok::<_, Infallible>(Some(Snapshot { name: "fresh".into() }))
            })
            .await
            .unwrap();
        assert_eq!(result.source, CacheSource::Database);

        let stored = manager.memory_tier().get(&key).await.unwrap().unwrap();
        assert_eq!(&*stored.payload, r#"{"name":"fresh"}"#);
    }

    #[tokio::test]
    async fn ttl_override_reaches_memory_tier() {
        let manager = memory_manager();
        let key = CacheKey::town("x");
        manager
            .get_or_fetch(
                &key,
                FetchOptions::default().with_ttl(Duration::from_secs(5)),
                || async { Ok::<_, Infallible>(Some(Snapshot { name: "x".into() })) },
            )
            .await
            .unwrap();

        let meta = manager.memory_tier().entry_info(&key).unwrap();
        assert_eq!(meta.ttl, Duration::from_secs(5));
    }

    #[test]
    fn result_serializes_latency_in_millis() {
        let result = CacheResult {
            data: Some(1),
            source: CacheSource::Redis,
            latency: Duration::from_micros(1500),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["source"], "redis");
        assert_eq!(json["latency_ms"], 1.5);
        assert_eq!(json["data"], 1);
    }

    #[tokio::test]
    async fn shutdown_aborts_sweeper() {
        let mut config = CacheConfig::default();
        config.memory.cleanup_interval = Some(Duration::from_secs(1));
        let manager = CacheManager::init(&config).await;
        assert!(lock_or_recover(&manager.sweeper, SOURCE, "test").is_some());
        manager.shutdown();
        assert!(lock_or_recover(&manager.sweeper, SOURCE, "test").is_none());
    }
}
