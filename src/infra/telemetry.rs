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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "graphsync_cache_rebuild_total",
            Unit::Count,
            "Total number of body cache rebuilds, labelled by cache kind."
        );
        describe_histogram!(
            "graphsync_cache_rebuild_ms",
            Unit::Milliseconds,
            "Body cache rebuild latency in milliseconds."
        );
        describe_counter!(
            "graphsync_body_materialize_failed_total",
            Unit::Count,
            "Total number of bodies whose renderable could not be built."
        );
        describe_counter!(
            "graphsync_command_push_total",
            Unit::Count,
            "Total number of commands recorded, labelled pushed or merged."
        );
        describe_counter!(
            "graphsync_request_failed_total",
            Unit::Count,
            "Total number of requests the server rejected."
        );
        describe_counter!(
            "graphsync_stale_callback_total",
            Unit::Count,
            "Total number of replies dropped because their target vanished."
        );
        describe_counter!(
            "graphsync_event_backlog_dropped_total",
            Unit::Count,
            "Total number of delivered graph events dropped from the polling backlog."
        );
        describe_gauge!(
            "graphsync_sim_notification_queue_len",
            Unit::Count,
            "Pending notifications in the in-memory server queue."
        );
    });
}
