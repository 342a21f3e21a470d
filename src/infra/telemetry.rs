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
///
/// Log lines go to stderr so rendered output on stdout stays machine-readable.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "folio_diagram_cache_hit_total",
            Unit::Count,
            "Total number of diagram artifacts served from the artifact cache."
        );
        describe_counter!(
            "folio_diagram_cache_miss_total",
            Unit::Count,
            "Total number of diagram renders that required a conversion."
        );
        describe_counter!(
            "folio_diagram_failure_total",
            Unit::Count,
            "Total number of diagram conversions that failed or panicked."
        );
        describe_counter!(
            "folio_diagram_stale_total",
            Unit::Count,
            "Total number of diagram results discarded for a superseded render."
        );
        describe_histogram!(
            "folio_diagram_convert_ms",
            Unit::Milliseconds,
            "Diagram conversion latency in milliseconds."
        );
    });
}
