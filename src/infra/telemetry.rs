use std::{io, sync::Once};

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
/// Logs go to stderr; stdout is reserved for rendered output.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(io::stderr)
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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "mermaid_render_cache_hit_total",
            Unit::Count,
            "Renders answered from the result cache."
        );
        describe_counter!(
            "mermaid_render_cache_miss_total",
            Unit::Count,
            "Renders that had to invoke the mermaid CLI."
        );
        describe_counter!(
            "mermaid_render_cache_unavailable_total",
            Unit::Count,
            "Result cache operations that failed and were bypassed."
        );
        describe_counter!(
            "mermaid_render_filter_failure_total",
            Unit::Count,
            "Post-processing filter runs that failed and were skipped."
        );
        describe_histogram!(
            "mermaid_render_cli_ms",
            Unit::Milliseconds,
            "Mermaid CLI wall time in milliseconds."
        );
    });
}
