//! Configuration layer: typed settings with layered precedence
//! (file → `TOWNSFOLK__*` env → flat env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::{
    DEFAULT_MEMORY_CLEANUP_INTERVAL_MS, DEFAULT_MEMORY_MAX_SIZE_MB, DEFAULT_MEMORY_TTL_SECS,
    DEFAULT_NAMESPACE, DEFAULT_REDIS_HOST, DEFAULT_REDIS_PORT, DEFAULT_REDIS_TIMEOUT_MS,
    DEFAULT_REDIS_TTL_SECS,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "townsfolk";
const ENV_PREFIX: &str = "TOWNSFOLK";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_MEDIA_BASE_URL: &str = "http://127.0.0.1:3000/media/";
const DEFAULT_MEDIA_URL_CACHE_CAPACITY: usize = 4096;

/// Command-line arguments for the townsfolk binary.
#[derive(Debug, Parser)]
#[command(name = "townsfolk", version, about = "Townsfolk directory server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "TOWNSFOLK_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Apply pending database migrations and exit.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Toggle the in-process cache tier.
    #[arg(
        long = "cache-memory-enable",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_memory_enable: Option<bool>,

    /// Override the in-process tier TTL.
    #[arg(long = "cache-memory-ttl-seconds", value_name = "SECONDS")]
    pub cache_memory_ttl_seconds: Option<u64>,

    /// Override the in-process tier budget; 0 means unbounded.
    #[arg(long = "cache-memory-max-size-mb", value_name = "MB")]
    pub cache_memory_max_size_mb: Option<f64>,

    /// Toggle the Redis cache tier.
    #[arg(
        long = "cache-redis-enable",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_redis_enable: Option<bool>,

    /// Override the Redis tier TTL.
    #[arg(long = "cache-redis-ttl-seconds", value_name = "SECONDS")]
    pub cache_redis_ttl_seconds: Option<u64>,

    /// Override the Redis host.
    #[arg(long = "redis-host", value_name = "HOST")]
    pub redis_host: Option<String>,

    /// Override the Redis port.
    #[arg(long = "redis-port", value_name = "PORT")]
    pub redis_port: Option<u16>,

    /// Override the Redis key namespace.
    #[arg(long = "cache-redis-namespace", value_name = "NAMESPACE")]
    pub cache_redis_namespace: Option<String>,

    /// Override the media service base URL.
    #[arg(long = "media-base-url", value_name = "URL")]
    pub media_base_url: Option<String>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub media: MediaSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub memory: MemoryCacheSettings,
    pub redis: RedisCacheSettings,
}

#[derive(Debug, Clone)]
pub struct MemoryCacheSettings {
    pub enable: bool,
    pub ttl: Duration,
    /// Zero means unbounded.
    pub max_size_mb: f64,
    pub cleanup_enabled: bool,
    pub cleanup_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct RedisCacheSettings {
    pub enable: bool,
    pub ttl: Duration,
    pub host: String,
    pub port: u16,
    pub namespace: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct MediaSettings {
    pub base_url: Url,
    pub url_cache_capacity: NonZeroUsize,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence.
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_flat_env(|name| std::env::var(name).ok())?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    media: RawMediaSettings,
}

impl RawSettings {
    /// Apply the unprefixed deployment variables (`CACHE_MEMORY_TTL`,
    /// `REDIS_HOST`, `DATABASE_URL`, ...). `lookup` returns a variable's
    /// value when it is set.
    fn apply_flat_env<F>(&mut self, lookup: F) -> Result<(), LoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let memory = &mut self.cache.memory;
        if let Some(value) = flat_bool(&lookup, "CACHE_MEMORY_ENABLE")? {
            memory.enable = Some(value);
        }
        if let Some(value) = flat_parse::<u64, _>(&lookup, "CACHE_MEMORY_TTL")? {
            memory.ttl_seconds = Some(value);
        }
        if let Some(value) = flat_parse::<f64, _>(&lookup, "CACHE_MEMORY_MAX_SIZE_MB")? {
            memory.max_size_mb = Some(value);
        }
        if let Some(value) = flat_bool(&lookup, "CACHE_MEMORY_CLEANUP_ENABLED")? {
            memory.cleanup_enabled = Some(value);
        }
        if let Some(value) = flat_parse::<u64, _>(&lookup, "CACHE_MEMORY_CLEANUP_INTERVAL_MS")? {
            memory.cleanup_interval_ms = Some(value);
        }

        let redis = &mut self.cache.redis;
        if let Some(value) = flat_bool(&lookup, "CACHE_REDIS_ENABLE")? {
            redis.enable = Some(value);
        }
        if let Some(value) = flat_parse::<u64, _>(&lookup, "CACHE_REDIS_TTL")? {
            redis.ttl_seconds = Some(value);
        }
        if let Some(value) = flat_string(&lookup, "REDIS_HOST") {
            redis.host = Some(value);
        }
        if let Some(value) = flat_parse::<u16, _>(&lookup, "REDIS_PORT")? {
            redis.port = Some(value);
        }
        if let Some(value) = flat_string(&lookup, "CACHE_REDIS_NAMESPACE") {
            redis.namespace = Some(value);
        }
        if let Some(value) = flat_parse::<u64, _>(&lookup, "CACHE_REDIS_TIMEOUT_MS")? {
            redis.timeout_ms = Some(value);
        }

        if let Some(value) = flat_string(&lookup, "DATABASE_URL") {
            self.database.url = Some(value);
        }
        Ok(())
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(enable) = overrides.cache_memory_enable {
            self.cache.memory.enable = Some(enable);
        }
        if let Some(ttl) = overrides.cache_memory_ttl_seconds {
            self.cache.memory.ttl_seconds = Some(ttl);
        }
        if let Some(size) = overrides.cache_memory_max_size_mb {
            self.cache.memory.max_size_mb = Some(size);
        }
        if let Some(enable) = overrides.cache_redis_enable {
            self.cache.redis.enable = Some(enable);
        }
        if let Some(ttl) = overrides.cache_redis_ttl_seconds {
            self.cache.redis.ttl_seconds = Some(ttl);
        }
        if let Some(host) = overrides.redis_host.as_ref() {
            self.cache.redis.host = Some(host.clone());
        }
        if let Some(port) = overrides.redis_port {
            self.cache.redis.port = Some(port);
        }
        if let Some(namespace) = overrides.cache_redis_namespace.as_ref() {
            self.cache.redis.namespace = Some(namespace.clone());
        }
        if let Some(url) = overrides.media_base_url.as_ref() {
            self.media.base_url = Some(url.clone());
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            media,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            media: build_media_settings(media)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let RawCacheSettings { memory, redis } = cache;

    let memory_ttl = positive_secs(
        memory.ttl_seconds.unwrap_or(DEFAULT_MEMORY_TTL_SECS),
        "cache.memory.ttl_seconds",
    )?;
    let max_size_mb = memory.max_size_mb.unwrap_or(DEFAULT_MEMORY_MAX_SIZE_MB);
    if !max_size_mb.is_finite() || max_size_mb < 0.0 {
        return Err(LoadError::invalid(
            "cache.memory.max_size_mb",
            "must be a finite, non-negative number",
        ));
    }
    let cleanup_interval = positive_millis(
        memory
            .cleanup_interval_ms
            .unwrap_or(DEFAULT_MEMORY_CLEANUP_INTERVAL_MS),
        "cache.memory.cleanup_interval_ms",
    )?;

    let redis_ttl = positive_secs(
        redis.ttl_seconds.unwrap_or(DEFAULT_REDIS_TTL_SECS),
        "cache.redis.ttl_seconds",
    )?;
    let host = redis
        .host
        .map(|host| host.trim().to_string())
        .unwrap_or_else(|| DEFAULT_REDIS_HOST.to_string());
    if host.is_empty() {
        return Err(LoadError::invalid("cache.redis.host", "must not be empty"));
    }
    let port = redis.port.unwrap_or(DEFAULT_REDIS_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "cache.redis.port",
            "port must be greater than zero",
        ));
    }
    let namespace = redis
        .namespace
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
    // `reset` scans `{namespace}:*`, so a `:` would let one namespace cover
    // another's keys.
    if namespace.is_empty() || namespace.chars().any(|ch| ch.is_whitespace() || ch == ':') {
        return Err(LoadError::invalid(
            "cache.redis.namespace",
            "must be non-empty and contain no whitespace or `:`",
        ));
    }
    let timeout = positive_millis(
        redis.timeout_ms.unwrap_or(DEFAULT_REDIS_TIMEOUT_MS),
        "cache.redis.timeout_ms",
    )?;

    Ok(CacheSettings {
        memory: MemoryCacheSettings {
            enable: memory.enable.unwrap_or(true),
            ttl: memory_ttl,
            max_size_mb,
            cleanup_enabled: memory.cleanup_enabled.unwrap_or(false),
            cleanup_interval,
        },
        redis: RedisCacheSettings {
            enable: redis.enable.unwrap_or(false),
            ttl: redis_ttl,
            host,
            port,
            namespace,
            timeout,
        },
    })
}

fn build_media_settings(media: RawMediaSettings) -> Result<MediaSettings, LoadError> {
    let raw_url = media
        .base_url
        .unwrap_or_else(|| DEFAULT_MEDIA_BASE_URL.to_string());
    let base_url = Url::parse(raw_url.trim())
        .map_err(|err| LoadError::invalid("media.base_url", format!("failed to parse: {err}")))?;
    if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "media.base_url",
            "must be an absolute http(s) URL",
        ));
    }

    let capacity = media
        .url_cache_capacity
        .unwrap_or(DEFAULT_MEDIA_URL_CACHE_CAPACITY);
    let url_cache_capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
        LoadError::invalid("media.url_cache_capacity", "must be greater than zero")
    })?;

    Ok(MediaSettings {
        base_url,
        url_cache_capacity,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    memory: RawMemoryCacheSettings,
    redis: RawRedisCacheSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMemoryCacheSettings {
    enable: Option<bool>,
    ttl_seconds: Option<u64>,
    max_size_mb: Option<f64>,
    cleanup_enabled: Option<bool>,
    cleanup_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRedisCacheSettings {
    enable: Option<bool>,
    ttl_seconds: Option<u64>,
    host: Option<String>,
    port: Option<u16>,
    namespace: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMediaSettings {
    base_url: Option<String>,
    url_cache_capacity: Option<usize>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn positive_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn positive_millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}

/// Accepts `true/false/1/0/yes/no/on/off`, case-insensitively.
fn parse_boolish(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Set, non-blank variable value.
fn flat_string<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn flat_bool<F>(lookup: &F, name: &'static str) -> Result<Option<bool>, LoadError>
where
    F: Fn(&str) -> Option<String>,
{
    flat_string(lookup, name)
        .map(|value| {
            parse_boolish(&value)
                .ok_or_else(|| LoadError::invalid(name, format!("`{value}` is not a boolean")))
        })
        .transpose()
}

fn flat_parse<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, LoadError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    flat_string(lookup, name)
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|err| LoadError::invalid(name, format!("`{value}`: {err}")))
        })
        .transpose()
}
