// Metrics module for observability
// Describes the quota metrics and installs the Prometheus recorder

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use cassava_common::{CassavaError, Result};

use crate::startup::ReplayStats;

/// Initialize all metric descriptions
/// Should be called once after the recorder is installed
pub fn init_metrics() {
    describe_gauge!(
        "cassava_quota_usage",
        "Current resource usage per tenant and kind"
    );
    describe_counter!(
        "cassava_quota_events_total",
        "Total number of counted create and delete events"
    );
    describe_counter!(
        "cassava_replay_lines_total",
        "Total number of replay lines read"
    );
    describe_counter!(
        "cassava_replay_skipped_total",
        "Total number of replay lines skipped as invalid"
    );
    describe_gauge!(
        "cassava_shared_services",
        "Number of services classified as shared"
    );

    tracing::info!("Metrics initialized");
}

/// Install the global Prometheus recorder
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| CassavaError::InternalError(format!("install metrics recorder: {}", e)))
}

/// Record the outcome of a replay run
pub fn record_replay(stats: &ReplayStats) {
    counter!("cassava_replay_lines_total").increment(stats.lines);
    counter!("cassava_replay_skipped_total").increment(stats.skipped);
}

/// Update the shared service count
pub fn set_shared_services(count: usize) {
    gauge!("cassava_shared_services").set(count as f64);
}
