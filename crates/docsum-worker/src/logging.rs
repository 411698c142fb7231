//! Per-job log context.

use docsum_models::ClaimedJob;
use tracing::{error, info, warn, Span};

/// Carries the identifiers every job event is tagged with.
#[derive(Debug, Clone)]
pub struct JobLogger {
    summary_id: String,
    job_id: String,
    attempt: i32,
}

impl JobLogger {
    pub fn for_job(job: &ClaimedJob) -> Self {
        Self {
            summary_id: job.summary_id.to_string(),
            job_id: job.job_id.to_string(),
            attempt: job.attempt_count,
        }
    }

    pub fn attempt(&self) -> i32 {
        self.attempt
    }

    pub fn log_start(&self, detail: &str) {
        info!(summary_id = %self.summary_id, job_id = %self.job_id, attempt = self.attempt, "Summarizing: {detail}");
    }

    pub fn log_progress(&self, detail: &str) {
        info!(summary_id = %self.summary_id, job_id = %self.job_id, attempt = self.attempt, "{detail}");
    }

    pub fn log_warning(&self, detail: &str) {
        warn!(summary_id = %self.summary_id, job_id = %self.job_id, attempt = self.attempt, "{detail}");
    }

    pub fn log_error(&self, detail: &str) {
        error!(summary_id = %self.summary_id, job_id = %self.job_id, attempt = self.attempt, "Summary attempt failed: {detail}");
    }

    pub fn log_completion(&self, detail: &str) {
        info!(summary_id = %self.summary_id, job_id = %self.job_id, attempt = self.attempt, "Summary completed: {detail}");
    }

    /// Span that outer instrumentation (HTTP clients, store calls) nests under.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("summary_job", summary_id = %self.summary_id, job_id = %self.job_id)
    }
}
