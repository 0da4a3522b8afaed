use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

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

/// Register descriptions for every metric the crate emits.
///
/// Safe to call more than once; only the first call registers.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "restodb_cache_hit_total",
            Unit::Count,
            "Total number of summary cache hits."
        );
        describe_counter!(
            "restodb_cache_miss_total",
            Unit::Count,
            "Total number of summary cache misses."
        );
        describe_counter!(
            "restodb_cache_evict_total",
            Unit::Count,
            "Total number of summary cache evictions due to capacity."
        );
        describe_counter!(
            "restodb_buffer_append_total",
            Unit::Count,
            "Total number of write intents appended to the pending-write buffer."
        );
        describe_counter!(
            "restodb_checkpoint_committed_total",
            Unit::Count,
            "Total number of buffer entries marked committed by checkpoints."
        );
        describe_counter!(
            "restodb_checkpoint_failed_total",
            Unit::Count,
            "Total number of buffer entries left pending after a failed apply."
        );
        describe_histogram!(
            "restodb_checkpoint_ms",
            Unit::Milliseconds,
            "Checkpoint run latency in milliseconds."
        );
        describe_histogram!(
            "restodb_slow_path_ms",
            Unit::Milliseconds,
            "Restaurant store lookup latency on summary cache misses, in milliseconds."
        );
    });
}
