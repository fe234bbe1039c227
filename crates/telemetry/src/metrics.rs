//! Metrics recorder and metric catalogue.

use metrics::Unit;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use playground_core::{Error, Result};

pub const RESYNCS_TOTAL: &str = "playground_resyncs_total";
pub const RESYNC_DURATION_SECONDS: &str = "playground_resync_duration_seconds";
pub const TYPE_LIBS_REGISTERED_TOTAL: &str = "playground_type_libs_registered_total";
pub const TYPE_LOAD_FAILURES_TOTAL: &str = "playground_type_load_failures_total";

/// Register descriptions for every metric the workspace emits.
pub fn describe_metrics() {
    metrics::describe_counter!(RESYNCS_TOTAL, "Full filesystem re-reads triggered by the watcher");
    metrics::describe_histogram!(
        RESYNC_DURATION_SECONDS,
        Unit::Seconds,
        "Time spent reading the sandbox filesystem for one resync"
    );
    metrics::describe_counter!(
        TYPE_LIBS_REGISTERED_TOTAL,
        "Type definitions registered with the code-intelligence engine"
    );
    metrics::describe_counter!(
        TYPE_LOAD_FAILURES_TOTAL,
        "Type definition files skipped after a read or registration failure"
    );
}

/// Install the Prometheus recorder and return the handle used to render it.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::operation(format!("Failed to install Prometheus recorder: {}", e)))?;
    describe_metrics();
    tracing::info!("Prometheus metrics recorder initialized");
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_renders_with_local_recorder() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe_metrics();
            metrics::counter!(RESYNCS_TOTAL).increment(2);
            metrics::counter!(TYPE_LOAD_FAILURES_TOTAL).increment(1);
        });

        let rendered = handle.render();
        assert!(rendered.contains("playground_resyncs_total 2"));
        assert!(rendered.contains("playground_type_load_failures_total 1"));
        assert!(rendered.contains("# HELP playground_resyncs_total"));
    }
}
