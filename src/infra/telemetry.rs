use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Applied only when `RUST_LOG` is unset; aggregate reads issue many small
/// statements.
const QUIET_DIRECTIVES: &[&str] = &["sqlx::query=warn"];

/// Install the global tracing subscriber and describe cache metrics.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let mut env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
        for directive in QUIET_DIRECTIVES {
            if let Ok(directive) = directive.parse() {
                env_filter = env_filter.add_directive(directive);
            }
        }
    }

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "townsfolk_cache_hit_total",
            Unit::Count,
            "Cache hits, labelled by tier."
        );
        describe_counter!(
            "townsfolk_cache_miss_total",
            Unit::Count,
            "Cache misses, labelled by tier."
        );
        describe_counter!(
            "townsfolk_cache_source_fetch_total",
            Unit::Count,
            "Snapshots assembled from Postgres after missing every tier."
        );
        describe_histogram!(
            "townsfolk_cache_lookup_ms",
            Unit::Milliseconds,
            "End-to-end cached read latency, labelled by serving source."
        );
        describe_gauge!(
            "townsfolk_cache_memory_bytes",
            Unit::Bytes,
            "Estimated bytes held by the in-process tier."
        );
        describe_gauge!(
            "townsfolk_cache_memory_entries",
            Unit::Count,
            "Entries held by the in-process tier."
        );
        describe_counter!(
            "townsfolk_cache_memory_evict_total",
            Unit::Count,
            "In-process entries evicted to make room for new ones."
        );
        describe_counter!(
            "townsfolk_cache_memory_skip_total",
            Unit::Count,
            "Writes skipped because the entry exceeds the whole memory budget."
        );
    });
}
