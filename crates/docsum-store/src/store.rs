//! Persistence and queue interface for summaries and their jobs.

use async_trait::async_trait;
use docsum_models::{ClaimedJob, FailOutcome, Job, JobId, SourceType, SummaryId, SummaryRequest};

use crate::error::StoreResult;

/// Input for `create_summary`.
#[derive(Debug, Clone)]
pub struct NewSummary {
    pub user_id: Option<String>,
    pub source_type: SourceType,
    pub original_content: String,
}

/// Input for `fail`.
#[derive(Debug, Clone)]
pub struct FailRequest {
    pub summary_id: SummaryId,
    pub job_id: JobId,
    /// Attempt number of the failed lease
    pub attempt_count: i32,
    /// `[CODE]`-prefixed message to record
    pub error_message: String,
    /// Retry ceiling; `attempt_count >= max_attempts` is terminal
    pub max_attempts: i32,
}

impl FailRequest {
    pub fn retries_left(&self) -> bool {
        self.attempt_count < self.max_attempts
    }
}

/// Summary persistence with lease-based job queue semantics.
///
/// Every state change is a status-guarded transition, so concurrent workers
/// and user cancellation can race safely.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Insert a pending summary and its queued job atomically.
    async fn create_summary(&self, new: NewSummary) -> StoreResult<(SummaryRequest, Job)>;

    async fn get_summary(&self, id: &SummaryId) -> StoreResult<Option<SummaryRequest>>;

    /// Fetch a summary only if it belongs to `user_id`.
    async fn get_summary_for_user(
        &self,
        id: &SummaryId,
        user_id: &str,
    ) -> StoreResult<Option<SummaryRequest>>;

    async fn get_job(&self, id: &JobId) -> StoreResult<Option<Job>>;

    async fn jobs_for_summary(&self, id: &SummaryId) -> StoreResult<Vec<Job>>;

    /// Lease up to `limit` eligible jobs, oldest first.
    ///
    /// A job is eligible when it is queued, its `scheduled_at` has passed and
    /// its summary is pending. Each returned job is moved to `processing` with
    /// its attempt count incremented. Jobs leased by a concurrent caller are
    /// skipped, never returned twice.
    async fn claim(&self, limit: usize) -> StoreResult<Vec<ClaimedJob>>;

    /// Conditional `pending -> processing`. Returns false if not applied.
    async fn mark_processing(&self, summary_id: &SummaryId) -> StoreResult<bool>;

    /// Conditional `processing -> completed`.
    ///
    /// When the guard fails the job is marked failed, the summary is left
    /// untouched and `false` is returned.
    async fn complete(
        &self,
        summary_id: &SummaryId,
        job_id: &JobId,
        summary_text: &str,
    ) -> StoreResult<bool>;

    /// Record a failed attempt and decide between requeue and terminal failure.
    async fn fail(&self, request: FailRequest) -> StoreResult<FailOutcome>;

    /// Owner cancellation. Returns `None` if the summary is missing or owned
    /// by someone else; otherwise the (possibly unchanged) row.
    async fn cancel(
        &self,
        summary_id: &SummaryId,
        owner_id: &str,
    ) -> StoreResult<Option<SummaryRequest>>;

    /// Newest first.
    async fn list_summaries_by_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<SummaryRequest>>;

    /// Delete a user's summaries (and their jobs). Returns the number deleted.
    async fn delete_summaries_by_user(&self, user_id: &str) -> StoreResult<u64>;

    /// Readiness probe.
    async fn ping(&self) -> StoreResult<()>;
}
