//! Batch executor: claim, summarize, reconcile.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use docsum_models::{ClaimedJob, ErrorCode, FailOutcome};
use docsum_store::{CreditLedger, FailRequest, StoreError, SummaryStore};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn, Instrument};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::metrics;
use crate::retry::{retry_async_if, FailureTracker, RetryConfig};
use crate::summarizer::{DocumentSummarizer, SummarizeError};

/// Counters returned by one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub picked: usize,
    pub completed: usize,
    pub failed: usize,
    pub avg_duration_ms: u64,
    pub failure_codes: BTreeMap<String, usize>,
}

#[derive(Debug)]
enum JobOutcome {
    Completed,
    Failed(ErrorCode),
}

#[derive(Debug)]
struct JobReport {
    outcome: JobOutcome,
    duration: Duration,
}

/// Error raised while a job holds its lease.
#[derive(Debug)]
enum JobError {
    Summarize(SummarizeError),
    Store(StoreError),
}

impl JobError {
    fn code(&self) -> ErrorCode {
        match self {
            JobError::Summarize(e) => e.code(),
            JobError::Store(e) => ErrorCode::from_message(&e.to_string()).unwrap_or(ErrorCode::Unknown),
        }
    }

    /// `[CODE] message`, without doubling a prefix the message already has.
    fn tagged_message(&self) -> String {
        let code = self.code();
        let message = match self {
            JobError::Summarize(e) => e.to_string(),
            JobError::Store(e) => e.to_string(),
        };
        if message.starts_with(&format!("[{}]", code.as_str())) {
            message
        } else {
            code.tag(message)
        }
    }
}

/// Attempt ceiling for a failure: retryable codes get the configured
/// ceiling, anything else fails on the current attempt.
pub fn resolve_max_attempts(code: ErrorCode, attempt_count: i32, ceiling: i32) -> i32 {
    if code.is_queue_retryable() {
        ceiling
    } else {
        attempt_count
    }
}

fn average_ms(durations: &[Duration]) -> u64 {
    if durations.is_empty() {
        return 0;
    }
    let total: f64 = durations.iter().map(|d| d.as_secs_f64() * 1000.0).sum();
    (total / durations.len() as f64).round() as u64
}

/// Drives claimed jobs through the summarizer and settles the outcome with
/// the queue and the ledger.
#[derive(Clone)]
pub struct JobExecutor {
    store: Arc<dyn SummaryStore>,
    ledger: Arc<dyn CreditLedger>,
    summarizer: Arc<dyn DocumentSummarizer>,
    config: WorkerConfig,
}

impl JobExecutor {
    pub fn new(
        store: Arc<dyn SummaryStore>,
        ledger: Arc<dyn CreditLedger>,
        summarizer: Arc<dyn DocumentSummarizer>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            summarizer,
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Claim one batch and process it.
    ///
    /// Only a failed claim is an error; per-job failures are reported in the
    /// returned counters.
    pub async fn run_batch(&self) -> WorkerResult<BatchReport> {
        let retry = RetryConfig::new("claim_jobs")
            .with_max_retries(2)
            .with_base_delay(Duration::from_millis(200));
        let batch_size = self.config.batch_size;
        let jobs = retry_async_if(
            &retry,
            || self.store.claim(batch_size),
            |e: &StoreError| matches!(e, StoreError::Database(_)),
        )
        .await
        .into_result()?;

        let picked = jobs.len();
        if picked > 0 {
            info!(picked, "Claimed summary jobs");
            metrics::record_jobs_claimed(picked);
        }

        let reports: Vec<JobReport> = stream::iter(jobs.into_iter().map(|job| {
            let logger = JobLogger::for_job(&job);
            let span = logger.create_span();
            self.process_job(job, logger).instrument(span)
        }))
        .buffer_unordered(self.config.max_concurrent_jobs.max(1))
        .collect()
        .await;

        let mut report = BatchReport {
            picked,
            ..Default::default()
        };
        let mut durations = Vec::with_capacity(reports.len());
        for job in reports {
            durations.push(job.duration);
            match job.outcome {
                JobOutcome::Completed => report.completed += 1,
                JobOutcome::Failed(code) => {
                    report.failed += 1;
                    *report
                        .failure_codes
                        .entry(code.as_str().to_string())
                        .or_default() += 1;
                }
            }
        }
        report.avg_duration_ms = average_ms(&durations);
        Ok(report)
    }

    async fn process_job(&self, job: ClaimedJob, logger: JobLogger) -> JobReport {
        let started = Instant::now();
        let request_id = format!("worker-{}-{}", job.job_id, job.attempt_count);
        logger.log_start(&format!("{} source, request {}", job.source_type.as_str(), request_id));

        let outcome = match self.summarize_and_complete(&job, &request_id, &logger).await {
            Ok(outcome) => outcome,
            Err(e) => self.handle_failure(&job, e, &logger).await,
        };

        let duration = started.elapsed();
        match &outcome {
            JobOutcome::Completed => metrics::record_job_completed(duration.as_secs_f64()),
            JobOutcome::Failed(code) => metrics::record_job_failed(code.as_str(), duration.as_secs_f64()),
        }
        JobReport { outcome, duration }
    }

    async fn summarize_and_complete(
        &self,
        job: &ClaimedJob,
        request_id: &str,
        logger: &JobLogger,
    ) -> Result<JobOutcome, JobError> {
        let marked = self
            .store
            .mark_processing(&job.summary_id)
            .await
            .map_err(JobError::Store)?;
        if !marked {
            logger.log_warning("summary is no longer pending, skipping");
            return Ok(JobOutcome::Failed(ErrorCode::SummaryCanceled));
        }
        logger.log_progress("summary marked processing");

        let summary_text = self
            .summarizer
            .summarize(job.source_type, &job.original_content, request_id)
            .await
            .map_err(JobError::Summarize)?;

        let applied = self
            .store
            .complete(&job.summary_id, &job.job_id, &summary_text)
            .await
            .map_err(JobError::Store)?;
        if !applied {
            logger.log_warning("summary was canceled while processing, result dropped");
            return Ok(JobOutcome::Failed(ErrorCode::SummaryCanceled));
        }

        logger.log_completion(&format!("{} chars", summary_text.chars().count()));
        Ok(JobOutcome::Completed)
    }

    async fn handle_failure(&self, job: &ClaimedJob, err: JobError, logger: &JobLogger) -> JobOutcome {
        let code = err.code();
        let request = FailRequest {
            summary_id: job.summary_id.clone(),
            job_id: job.job_id.clone(),
            attempt_count: job.attempt_count,
            error_message: err.tagged_message(),
            max_attempts: resolve_max_attempts(code, job.attempt_count, self.config.max_attempts),
        };
        logger.log_error(&request.error_message);

        let outcome = match self.store.fail(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(job_id = %job.job_id, error = %e, "Failed to record job failure");
                return JobOutcome::Failed(code);
            }
        };

        info!(
            job_id = %job.job_id,
            code = %code,
            terminal = outcome.terminal,
            canceled_by_user = outcome.canceled_by_user,
            "Job failure recorded"
        );

        self.refund_if_needed(job, &outcome).await;
        JobOutcome::Failed(code)
    }

    async fn refund_if_needed(&self, job: &ClaimedJob, outcome: &FailOutcome) {
        if !outcome.should_refund() {
            return;
        }
        let Some(user_id) = outcome.user_id.as_deref() else {
            return;
        };

        match self.ledger.refund(user_id).await {
            Ok(Some(balance)) => {
                metrics::record_credit_refund();
                info!(job_id = %job.job_id, user_id = %user_id, balance, "Credit refunded");
            }
            Ok(None) => {
                warn!(job_id = %job.job_id, user_id = %user_id, "Refund skipped: user not found");
            }
            Err(e) => {
                error!(job_id = %job.job_id, user_id = %user_id, error = %e, "Credit refund failed");
            }
        }
    }

    /// Poll until `shutdown` flips to true.
    ///
    /// A full batch is followed immediately by another; otherwise the loop
    /// waits `poll_interval`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> WorkerResult<()> {
        info!(
            "Starting summary executor: batch {} / {} concurrent / every {:?}",
            self.config.batch_size, self.config.max_concurrent_jobs, self.config.poll_interval
        );
        let mut failures = FailureTracker::new(5);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let drained = match self.run_batch().await {
                Ok(report) => {
                    failures.record_success();
                    if report.picked > 0 {
                        info!(
                            picked = report.picked,
                            completed = report.completed,
                            failed = report.failed,
                            avg_duration_ms = report.avg_duration_ms,
                            "Batch finished"
                        );
                    }
                    report.picked < self.config.batch_size
                }
                Err(e) => {
                    if failures.record_failure() {
                        error!(code = e.code(), error = %e, "Batch failed");
                    }
                    true
                }
            };

            if drained {
                tokio::select! {
                    _ = shutdown.changed() => {}
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        info!("Summary executor stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_max_attempts() {
        assert_eq!(resolve_max_attempts(ErrorCode::Timeout, 1, 3), 3);
        assert_eq!(resolve_max_attempts(ErrorCode::TranscriptBlocked, 1, 3), 1);
        assert_eq!(resolve_max_attempts(ErrorCode::FallbackOutputInvalid, 2, 3), 2);
    }

    #[test]
    fn test_average_ms_rounds() {
        assert_eq!(average_ms(&[]), 0);
        assert_eq!(
            average_ms(&[Duration::from_millis(1), Duration::from_millis(2)]),
            2
        );
    }

    #[test]
    fn test_tagged_message_not_doubled() {
        let err = JobError::Summarize(SummarizeError::FallbackOutputInvalid("bad".to_string()));
        assert_eq!(err.tagged_message(), "[FALLBACK_OUTPUT_INVALID] bad");

        let err = JobError::Store(StoreError::not_found("summary"));
        assert_eq!(err.code(), ErrorCode::Unknown);
        assert_eq!(err.tagged_message(), "[GEMINI_UNKNOWN_ERROR] Not found: summary");
    }

    #[test]
    fn test_batch_report_wire_shape() {
        let mut report = BatchReport {
            picked: 2,
            completed: 1,
            failed: 1,
            avg_duration_ms: 15,
            ..Default::default()
        };
        report.failure_codes.insert("GEMINI_TIMEOUT".to_string(), 1);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["avgDurationMs"], 15);
        assert_eq!(json["failureCodes"]["GEMINI_TIMEOUT"], 1);
    }
}
