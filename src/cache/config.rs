//! Cache configuration.
//!
//! Resolved from the `[cache]` section of the application settings; see
//! `crate::config` for the file, environment and CLI layering.

use std::time::Duration;

pub(crate) const DEFAULT_MEMORY_TTL_SECS: u64 = 300;
pub(crate) const DEFAULT_MEMORY_MAX_SIZE_MB: f64 = 64.0;
pub(crate) const DEFAULT_MEMORY_CLEANUP_INTERVAL_MS: u64 = 60_000;
pub(crate) const DEFAULT_REDIS_TTL_SECS: u64 = 3600;
pub(crate) const DEFAULT_REDIS_HOST: &str = "127.0.0.1";
pub(crate) const DEFAULT_REDIS_PORT: u16 = 6379;
pub(crate) const DEFAULT_REDIS_TIMEOUT_MS: u64 = 250;
pub const DEFAULT_NAMESPACE: &str = "townsfolk";

/// Settings for both cache tiers.
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    pub memory: MemoryTierConfig,
    pub redis: RedisTierConfig,
}

/// In-process tier settings.
#[derive(Debug, Clone)]
pub struct MemoryTierConfig {
    pub enabled: bool,
    /// TTL applied when a write carries no override.
    pub ttl: Duration,
    /// Byte budget. Zero means unbounded.
    pub max_size_bytes: usize,
    /// Period of the background sweep; `None` leaves expiry lazy.
    pub cleanup_interval: Option<Duration>,
}

impl Default for MemoryTierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(DEFAULT_MEMORY_TTL_SECS),
            max_size_bytes: megabytes_to_bytes(DEFAULT_MEMORY_MAX_SIZE_MB),
            cleanup_interval: None,
        }
    }
}

/// Distributed tier settings.
#[derive(Debug, Clone)]
pub struct RedisTierConfig {
    pub enabled: bool,
    pub ttl: Duration,
    pub host: String,
    pub port: u16,
    /// Prefix for every key this process writes; `reset` only touches it.
    pub namespace: String,
    /// Upper bound for any single round-trip.
    pub timeout: Duration,
}

impl Default for RedisTierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: Duration::from_secs(DEFAULT_REDIS_TTL_SECS),
            host: DEFAULT_REDIS_HOST.to_string(),
            port: DEFAULT_REDIS_PORT,
            namespace: DEFAULT_NAMESPACE.to_string(),
            timeout: Duration::from_millis(DEFAULT_REDIS_TIMEOUT_MS),
        }
    }
}

impl RedisTierConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        let memory = &settings.memory;
        let redis = &settings.redis;
        Self {
            memory: MemoryTierConfig {
                enabled: memory.enable,
                ttl: memory.ttl,
                max_size_bytes: megabytes_to_bytes(memory.max_size_mb),
                cleanup_interval: memory.cleanup_enabled.then_some(memory.cleanup_interval),
            },
            redis: RedisTierConfig {
                enabled: redis.enable,
                ttl: redis.ttl,
                host: redis.host.clone(),
                port: redis.port,
                namespace: redis.namespace.clone(),
                timeout: redis.timeout,
            },
        }
    }
}

/// Convert a fractional megabyte budget into bytes. Negative and non-finite
/// values collapse to zero (unbounded).
pub fn megabytes_to_bytes(megabytes: f64) -> usize {
    if !megabytes.is_finite() || megabytes <= 0.0 {
        return 0;
    }
    (megabytes * 1024.0 * 1024.0).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_megabytes_round_to_bytes() {
        assert_eq!(megabytes_to_bytes(1.0), 1_048_576);
        assert_eq!(megabytes_to_bytes(0.5), 524_288);
        assert_eq!(megabytes_to_bytes(0.0), 0);
        assert_eq!(megabytes_to_bytes(-3.0), 0);
        assert_eq!(megabytes_to_bytes(f64::NAN), 0);
    }

    #[test]
    fn defaults_enable_memory_only() {
        let config = CacheConfig::default();
        assert!(config.memory.enabled);
        assert!(!config.redis.enabled);
        assert_eq!(config.memory.ttl, Duration::from_secs(300));
        assert_eq!(config.redis.ttl, Duration::from_secs(3600));
        assert_eq!(config.redis.namespace, "townsfolk");
        assert_eq!(config.redis.url(), "redis://127.0.0.1:6379");
    }
}
