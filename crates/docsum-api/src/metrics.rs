//! Prometheus metrics for the HTTP surface.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex::Regex;

static UUID_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
        .expect("valid uuid regex")
});
static NUMERIC_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/[0-9]+(/|$)").expect("valid numeric segment regex"));

/// Install the Prometheus recorder and return the handle that renders it.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "docsum_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "docsum_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "docsum_http_requests_in_flight";

    pub const WORKER_BATCHES_TOTAL: &str = "docsum_worker_batches_total";
    pub const WORKER_AUTH_FAILURES_TOTAL: &str = "docsum_worker_auth_failures_total";

    pub const TRANSCRIPT_WORKER_REQUESTS_TOTAL: &str = "docsum_transcript_worker_requests_total";
    pub const TRANSCRIPT_WORKER_DURATION_SECONDS: &str =
        "docsum_transcript_worker_duration_seconds";
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

/// Record one worker entry point invocation.
pub fn record_worker_batch(outcome: &'static str) {
    counter!(names::WORKER_BATCHES_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_worker_auth_failure() {
    counter!(names::WORKER_AUTH_FAILURES_TOTAL).increment(1);
}

/// Record a remote transcript request by response code.
pub fn record_transcript_request(code: &str, duration_secs: f64) {
    let labels = [("code", code.to_string())];
    counter!(names::TRANSCRIPT_WORKER_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::TRANSCRIPT_WORKER_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Sanitize path for metrics labels (remove IDs).
fn sanitize_path(path: &str) -> String {
    let path = UUID_SEGMENT.replace_all(path, ":id");
    NUMERIC_SEGMENT.replace_all(&path, "/:id$1").to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/summaries/550e8400-e29b-41d4-a716-446655440000"),
            "/api/summaries/:id"
        );
        assert_eq!(sanitize_path("/jobs/42/retry"), "/jobs/:id/retry");
        assert_eq!(sanitize_path("/internal/summary-worker"), "/internal/summary-worker");
    }
}
