//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_COMPLETED_TOTAL: &str = "v2m_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "v2m_jobs_failed_total";
    pub const JOBS_REQUEUED_TOTAL: &str = "v2m_jobs_requeued_total";
    pub const JOBS_SKIPPED_TOTAL: &str = "v2m_jobs_skipped_total";
    pub const STAGE_DURATION_SECONDS: &str = "v2m_stage_duration_seconds";
    pub const DOWNLOAD_BYTES_TOTAL: &str = "v2m_download_bytes_total";
}

/// Serve `/metrics` on `addr` from a background listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

pub fn record_job_completed() {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
}

/// `reason` is `permanent`, `exhausted` or `timeout`.
pub fn record_job_failed(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_job_requeued() {
    counter!(names::JOBS_REQUEUED_TOTAL).increment(1);
}

pub fn record_job_skipped() {
    counter!(names::JOBS_SKIPPED_TOTAL).increment(1);
}

pub fn record_stage_duration(stage: &str, duration_secs: f64) {
    let labels = [("stage", stage.to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_download_bytes(bytes: u64) {
    counter!(names::DOWNLOAD_BYTES_TOTAL).increment(bytes);
}
