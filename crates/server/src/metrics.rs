// crates/server/src/metrics.rs
//! Application metrics for Prometheus monitoring.
//!
//! This module provides:
//! - Prometheus metrics recorder initialization
//! - Metric definitions (counters, histograms, gauges)
//! - Helper functions for recording metrics
//! - Render handle for the `/metrics` endpoint

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// This should be called once at application startup, before any metrics
/// are recorded. Returns `true` if initialization succeeded, `false` if
/// already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Failed to set global metrics recorder (already set)");
        return false;
    }

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Failed to store Prometheus handle (already set)");
    }

    describe_metrics();

    tracing::info!("Prometheus metrics initialized");
    true
}

/// Describe all application metrics for Prometheus.
fn describe_metrics() {
    describe_counter!(
        "jobs_submitted_total",
        "Jobs admitted through the admission controller, labeled by job type"
    );
    describe_counter!(
        "jobs_rejected_total",
        "Submissions rejected at admission, labeled by reason"
    );
    describe_counter!(
        "jobs_dispatched_total",
        "Jobs handed to a backend, labeled by backend kind"
    );
    describe_counter!(
        "jobs_completed_total",
        "Jobs that reached completed, labeled by job type"
    );
    describe_counter!(
        "jobs_failed_total",
        "Execution failures reported by backends, labeled by job type"
    );
    describe_counter!(
        "jobs_retried_total",
        "Failed jobs re-queued with backoff, labeled by job type"
    );
    describe_counter!(
        "jobs_cancelled_total",
        "Jobs cancelled by their owner, labeled by job type"
    );
    describe_counter!(
        "dispatch_errors_total",
        "Dispatch-time backend failures (job stays queued), labeled by backend kind"
    );
    describe_histogram!(
        "job_duration_seconds",
        "Wall-clock time from dispatch to completion"
    );
    describe_histogram!(
        "scheduler_pass_duration_seconds",
        "Duration of one scheduler candidate-selection pass"
    );
    describe_gauge!(
        "scheduler_dispatched_last_pass",
        "Jobs dispatched during the most recent scheduler pass"
    );
}

/// Render current metrics in Prometheus exposition format.
///
/// Returns an empty string if metrics were never initialized.
pub fn render_metrics() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(|h| h.render())
        .unwrap_or_default()
}

pub fn record_submitted(job_type: &str) {
    counter!("jobs_submitted_total", "job_type" => job_type.to_string()).increment(1);
}

pub fn record_rejected(reason: &'static str) {
    counter!("jobs_rejected_total", "reason" => reason).increment(1);
}

pub fn record_dispatched(backend_kind: &str) {
    counter!("jobs_dispatched_total", "backend_kind" => backend_kind.to_string()).increment(1);
}

pub fn record_completed(job_type: &str, duration_secs: Option<f64>) {
    counter!("jobs_completed_total", "job_type" => job_type.to_string()).increment(1);
    if let Some(secs) = duration_secs {
        histogram!("job_duration_seconds").record(secs);
    }
}

pub fn record_failed(job_type: &str) {
    counter!("jobs_failed_total", "job_type" => job_type.to_string()).increment(1);
}

pub fn record_retried(job_type: &str) {
    counter!("jobs_retried_total", "job_type" => job_type.to_string()).increment(1);
}

pub fn record_cancelled(job_type: &str) {
    counter!("jobs_cancelled_total", "job_type" => job_type.to_string()).increment(1);
}

pub fn record_dispatch_error(backend_kind: &str) {
    counter!("dispatch_errors_total", "backend_kind" => backend_kind.to_string()).increment(1);
}

pub fn record_scheduler_pass(duration_secs: f64, dispatched: usize) {
    histogram!("scheduler_pass_duration_seconds").record(duration_secs);
    gauge!("scheduler_dispatched_last_pass").set(dispatched as f64);
}
