//! Application metrics for Prometheus monitoring.
//!
//! This module provides:
//! - Prometheus metrics recorder initialization
//! - Metric definitions (counters, histograms, gauges)
//! - Helper functions for recording conversion metrics

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// This should be called once at application startup, before any metrics are recorded.
/// Returns `true` if this call installed the recorder, `false` if it was already
/// initialized. Concurrent callers block until the handle is stored.
pub fn init_metrics() -> bool {
    let mut installed = false;
    PROMETHEUS_HANDLE.get_or_init(|| {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Failed to set global metrics recorder (already set)");
        } else {
            describe_metrics();
            tracing::info!("Prometheus metrics initialized");
            installed = true;
        }
        handle
    });
    installed
}

fn describe_metrics() {
    describe_counter!(
        "conversions_started_total",
        "Number of conversion jobs accepted"
    );
    describe_counter!(
        "conversions_finished_total",
        "Number of conversion jobs that reached a terminal state, by outcome"
    );
    describe_histogram!(
        "conversion_duration_seconds",
        "Wall time of conversion jobs in seconds, by outcome"
    );
    describe_gauge!("jobs_tracked", "Jobs currently held in memory");
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn record_conversion_started() {
    counter!("conversions_started_total").increment(1);
}

/// Record a job reaching a terminal state.
///
/// # Arguments
/// * `outcome` - "completed", "failed" or "timeout"
/// * `duration` - Time from submission to the terminal state
pub fn record_conversion_finished(outcome: &str, duration: Duration) {
    counter!("conversions_finished_total", "outcome" => outcome.to_string()).increment(1);
    histogram!("conversion_duration_seconds", "outcome" => outcome.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_jobs_tracked(count: usize) {
    gauge!("jobs_tracked").set(count as f64);
}
