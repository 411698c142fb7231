//! Prometheus metrics for the summarization pipeline.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_CLAIMED_TOTAL: &str = "docsum_summary_jobs_claimed_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "docsum_summary_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "docsum_summary_jobs_failed_total";
    pub const JOB_DURATION_SECONDS: &str = "docsum_summary_job_duration_seconds";
    pub const CREDIT_REFUNDS_TOTAL: &str = "docsum_credit_refunds_total";
    pub const GEMINI_REQUESTS_TOTAL: &str = "docsum_gemini_requests_total";
    pub const TRANSCRIPT_ACQUIRED_TOTAL: &str = "docsum_transcript_acquired_total";
    pub const FALLBACK_SUMMARIES_TOTAL: &str = "docsum_fallback_summaries_total";
}

/// Install a Prometheus recorder with its own HTTP listener.
///
/// Used by the polling worker binary; the API binary renders metrics on its
/// own `/metrics` route instead.
pub fn install_exporter(port: u16) -> Result<(), BuildError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()
}

pub fn record_jobs_claimed(count: usize) {
    counter!(names::JOBS_CLAIMED_TOTAL).increment(count as u64);
}

pub fn record_job_completed(duration_secs: f64) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => "completed").record(duration_secs);
}

pub fn record_job_failed(code: &str, duration_secs: f64) {
    let labels = [("code", code.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => "failed").record(duration_secs);
}

pub fn record_credit_refund() {
    counter!(names::CREDIT_REFUNDS_TOTAL).increment(1);
}

pub fn record_gemini_request(model: &str, outcome: &str) {
    let labels = [("model", model.to_string()), ("outcome", outcome.to_string())];
    counter!(names::GEMINI_REQUESTS_TOTAL, &labels).increment(1);
}

pub fn record_transcript_acquired(source: &str) {
    let labels = [("source", source.to_string())];
    counter!(names::TRANSCRIPT_ACQUIRED_TOTAL, &labels).increment(1);
}

pub fn record_fallback_summary(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::FALLBACK_SUMMARIES_TOTAL, &labels).increment(1);
}
