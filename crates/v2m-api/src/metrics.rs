//! Prometheus metrics for the API server.

use std::sync::OnceLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "v2m_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "v2m_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "v2m_http_requests_in_flight";

    // Job lifecycle
    pub const JOBS_CREATED_TOTAL: &str = "v2m_jobs_created_total";
    pub const JOBS_RETRIED_TOTAL: &str = "v2m_jobs_retried_total";
    pub const DISPATCH_FAILURES_TOTAL: &str = "v2m_dispatch_failures_total";

    // Status streams
    pub const EVENT_STREAMS_ACTIVE: &str = "v2m_event_streams_active";

    // Retention
    pub const CLEANUP_DELETED_JOBS_TOTAL: &str = "v2m_cleanup_deleted_jobs_total";
    pub const CLEANUP_DELETED_OBJECTS_TOTAL: &str = "v2m_cleanup_deleted_objects_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "v2m_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// `platform` is the classifier tag of the new job.
pub fn record_job_created(platform: &str) {
    let labels = [("platform", platform.to_string())];
    counter!(names::JOBS_CREATED_TOTAL, &labels).increment(1);
}

pub fn record_job_retried() {
    counter!(names::JOBS_RETRIED_TOTAL).increment(1);
}

pub fn record_dispatch_failure() {
    counter!(names::DISPATCH_FAILURES_TOTAL).increment(1);
}

pub fn record_stream_opened() {
    gauge!(names::EVENT_STREAMS_ACTIVE).increment(1.0);
}

pub fn record_stream_closed() {
    gauge!(names::EVENT_STREAMS_ACTIVE).decrement(1.0);
}

pub fn record_cleanup(deleted_jobs: u64, deleted_objects: u64) {
    counter!(names::CLEANUP_DELETED_JOBS_TOTAL).increment(deleted_jobs);
    counter!(names::CLEANUP_DELETED_OBJECTS_TOTAL).increment(deleted_objects);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

fn uuid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
            .expect("static regex is valid")
    })
}

fn job_segment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/jobs/[^/]+").expect("static regex is valid"))
}

/// Sanitize path for metrics labels (collapse job ids).
fn sanitize_path(path: &str) -> String {
    let path = uuid_regex().replace_all(path, ":id");
    job_segment_regex().replace(&path, "/jobs/:id").to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}
