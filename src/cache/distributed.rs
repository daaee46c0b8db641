//! Redis-backed shared tier.
//!
//! Keys are written as `{namespace}:{cache_key}` so that several deployments
//! can share one Redis database and `reset` stays scoped to this namespace.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Connection, Pool, Runtime};
use redis::AsyncCommands;
use time::OffsetDateTime;
use tracing::{debug, info};

use super::config::RedisTierConfig;
use super::error::CacheError;
use super::keys::CacheKey;
use super::tier::{CachePayload, CacheTier, EntryMeta, TierHit, TierKind};

/// Page size for `SCAN` and the largest `DEL` issued by `reset`.
pub const RESET_BATCH_SIZE: usize = 1_000;

pub struct RedisCache {
    pool: Pool,
    namespace: String,
    default_ttl: Duration,
    timeout: Duration,
}

impl RedisCache {
    /// Build a pool for `config` and verify the server answers `PING`.
    pub async fn connect(config: &RedisTierConfig) -> Result<Self, CacheError> {
        let url = config.url();
        let mut pool_config = PoolConfig::from_url(url.clone());
        if let Some(pool) = pool_config.pool.as_mut() {
            pool.timeouts.wait = Some(config.timeout);
            pool.timeouts.create = Some(config.timeout);
            pool.timeouts.recycle = Some(config.timeout);
        }
        let pool = pool_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|err| CacheError::configuration(format!("invalid redis pool for {url}: {err}")))?;

        let cache = Self::from_pool(pool, config);
        cache
            .ping()
            .await
            .map_err(|err| CacheError::configuration(format!("redis at {url} is unreachable: {err}")))?;
        Ok(cache)
    }

    pub fn from_pool(pool: Pool, config: &RedisTierConfig) -> Self {
        Self {
            pool,
            namespace: config.namespace.clone(),
            default_ttl: config.ttl,
            timeout: config.timeout,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        self.bounded("ping", async {
            let mut conn = self.connection().await?;
            let _: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(|err| CacheError::backend("ping", err))?;
            Ok(())
        })
        .await
    }

    fn namespaced(&self, key: &CacheKey) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn scan_pattern(&self) -> String {
        format!("{}:*", escape_glob(&self.namespace))
    }

    async fn connection(&self) -> Result<Connection, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|err| CacheError::backend("connect", err))
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::timeout(operation, self.timeout)),
        }
    }

    async fn delete_batch(
        &self,
        conn: &mut Connection,
        batch: &[String],
    ) -> Result<usize, CacheError> {
        self.bounded("reset.del", async {
            let removed: usize = conn
                .del(batch)
                .await
                .map_err(|err| CacheError::backend("reset.del", err))?;
            Ok(removed)
        })
        .await
    }
}

#[async_trait]
impl CacheTier for RedisCache {
    fn kind(&self) -> TierKind {
        TierKind::Redis
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<TierHit>, CacheError> {
        let redis_key = self.namespaced(key);
        self.bounded("get", async {
            let mut conn = self.connection().await?;
            let (value, remaining): (Option<String>, i64) = redis::pipe()
                .get(&redis_key)
                .ttl(&redis_key)
                .query_async(&mut conn)
                .await
                .map_err(|err| CacheError::backend("get", err))?;

            Ok(value.map(|payload| {
                let meta = u64::try_from(remaining)
                    .ok()
                    .filter(|secs| *secs > 0)
                    .map(|secs| {
                        let ttl = Duration::from_secs(secs);
                        EntryMeta {
                            ttl,
                            cached_at: None,
                            expires_at: OffsetDateTime::now_utc() + ttl,
                        }
                    });
                TierHit {
                    size: payload.len(),
                    payload: Arc::from(payload),
                    meta,
                }
            }))
        })
        .await
    }

    async fn set(
        &self,
        key: &CacheKey,
        payload: CachePayload,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let redis_key = self.namespaced(key);
        let ttl_secs = ttl.unwrap_or(self.default_ttl).as_secs().max(1);
        self.bounded("set", async {
            let mut conn = self.connection().await?;
            let _: () = conn
                .set_ex(&redis_key, &*payload, ttl_secs)
                .await
                .map_err(|err| CacheError::backend("set", err))?;
            Ok(())
        })
        .await
    }

    async fn del(&self, key: &CacheKey) -> Result<(), CacheError> {
        let redis_key = self.namespaced(key);
        self.bounded("del", async {
            let mut conn = self.connection().await?;
            let _: () = conn
                .del(&redis_key)
                .await
                .map_err(|err| CacheError::backend("del", err))?;
            Ok(())
        })
        .await
    }

    /// Delete every key under this namespace with `SCAN` + batched `DEL`.
    async fn reset(&self) -> Result<(), CacheError> {
        let pattern = self.scan_pattern();
        let mut conn = self.bounded("reset.connect", self.connection()).await?;
        let mut cursor: u64 = 0;
        let mut pending: Vec<String> = Vec::with_capacity(RESET_BATCH_SIZE);
        let mut deleted = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = self
                .bounded("reset.scan", async {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(RESET_BATCH_SIZE)
                        .query_async(&mut conn)
                        .await
                        .map_err(|err| CacheError::backend("reset.scan", err))
                })
                .await?;
            pending.extend(keys);

            for batch in take_full_batches(&mut pending) {
                deleted += self.delete_batch(&mut conn, &batch).await?;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        if !pending.is_empty() {
            deleted += self.delete_batch(&mut conn, &pending).await?;
        }

        info!(namespace = %self.namespace, deleted, "distributed cache namespace reset");
        debug!(pattern = %pattern, "reset scan complete");
        Ok(())
    }
}

/// Split off every complete `DEL` batch, leaving the remainder in `pending`.
fn take_full_batches(pending: &mut Vec<String>) -> Vec<Vec<String>> {
    let full = pending.len() / RESET_BATCH_SIZE * RESET_BATCH_SIZE;
    pending
        .drain(..full)
        .collect::<Vec<_>>()
        .chunks(RESET_BATCH_SIZE)
        .map(<[String]>::to_vec)
        .collect()
}

/// Escape Redis glob metacharacters so a namespace matches literally.
fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_deletes_in_bounded_batches() {
        let mut pending: Vec<String> = (0..2_500)
            .map(|i| format!("townsfolk:town:t{i}:v1"))
            .collect();

        let batches = take_full_batches(&mut pending);
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|batch| batch.len() == RESET_BATCH_SIZE));
        assert_eq!(batches[0][0], "townsfolk:town:t0:v1");
        assert_eq!(pending.len(), 500);
        assert_eq!(pending[0], "townsfolk:town:t2000:v1");

        assert!(take_full_batches(&mut pending).is_empty());
        assert_eq!(pending.len(), 500);
    }

    #[test]
    fn glob_metacharacters_are_escaped() {
        assert_eq!(escape_glob("townsfolk"), "townsfolk");
        assert_eq!(escape_glob("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\");
    }

    #[tokio::test]
    async fn keys_are_prefixed_with_namespace() {
        let config = RedisTierConfig {
            namespace: "tenant[1]".to_string(),
            ..RedisTierConfig::default()
        };
        let pool = PoolConfig::from_url(config.url())
            .create_pool(Some(Runtime::Tokio1))
            .expect("pool builds without connecting");
        let cache = RedisCache::from_pool(pool, &config);

        assert_eq!(
            cache.namespaced(&CacheKey::town("borrego_springs")),
            "tenant[1]:town:borrego_springs:v1"
        );
        assert_eq!(cache.scan_pattern(), "tenant\\[1\\]:*");
    }
}
