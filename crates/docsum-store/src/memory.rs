//! In-memory store for tests and local development.
//!
//! All state lives behind one async mutex, which makes `claim` trivially
//! exclusive across concurrent callers.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use docsum_models::{
    summary::is_canceled_message, ClaimedJob, FailOutcome, Job, JobId, JobStatus, SummaryId,
    SummaryRequest, SummaryStatus, CANCELED_MESSAGE,
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::DEFAULT_REQUEUE_DELAY_SECS;
use crate::error::StoreResult;
use crate::store::{FailRequest, NewSummary, SummaryStore};

#[derive(Default)]
struct State {
    summaries: HashMap<SummaryId, SummaryRequest>,
    jobs: HashMap<JobId, Job>,
}

/// Process-local `SummaryStore`.
pub struct MemorySummaryStore {
    state: Mutex<State>,
    requeue_delay: Duration,
}

impl Default for MemorySummaryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_REQUEUE_DELAY_SECS))
    }
}

impl MemorySummaryStore {
    pub fn new(requeue_delay: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            requeue_delay,
        }
    }

    fn requeue_delta(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.requeue_delay).unwrap_or(chrono::Duration::zero())
    }
}

#[async_trait]
impl SummaryStore for MemorySummaryStore {
    async fn create_summary(&self, new: NewSummary) -> StoreResult<(SummaryRequest, Job)> {
        let summary = SummaryRequest::new(new.user_id, new.source_type, new.original_content);
        let job = Job::new(summary.id.clone());

        let mut state = self.state.lock().await;
        state.summaries.insert(summary.id.clone(), summary.clone());
        state.jobs.insert(job.id.clone(), job.clone());
        Ok((summary, job))
    }

    async fn get_summary(&self, id: &SummaryId) -> StoreResult<Option<SummaryRequest>> {
        Ok(self.state.lock().await.summaries.get(id).cloned())
    }

    async fn get_summary_for_user(
        &self,
        id: &SummaryId,
        user_id: &str,
    ) -> StoreResult<Option<SummaryRequest>> {
        Ok(self
            .state
            .lock()
            .await
            .summaries
            .get(id)
            .filter(|s| s.user_id.as_deref() == Some(user_id))
            .cloned())
    }

    async fn get_job(&self, id: &JobId) -> StoreResult<Option<Job>> {
        Ok(self.state.lock().await.jobs.get(id).cloned())
    }

    async fn jobs_for_summary(&self, id: &SummaryId) -> StoreResult<Vec<Job>> {
        let state = self.state.lock().await;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|j| &j.summary_id == id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn claim(&self, limit: usize) -> StoreResult<Vec<ClaimedJob>> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let mut eligible: Vec<(chrono::DateTime<Utc>, JobId)> = state
            .jobs
            .values()
            .filter(|job| job.is_claimable(now))
            .filter(|job| {
                state
                    .summaries
                    .get(&job.summary_id)
                    .is_some_and(|s| s.status == SummaryStatus::Pending)
            })
            .map(|job| (job.created_at, job.id.clone()))
            .collect();
        eligible.sort_by_key(|(created_at, _)| *created_at);
        eligible.truncate(limit);

        let mut claimed = Vec::with_capacity(eligible.len());
        for (_, job_id) in eligible {
            let Some(job) = state.jobs.get_mut(&job_id) else {
                continue;
            };
            job.status = JobStatus::Processing;
            job.locked_at = Some(now);
            job.updated_at = now;
            job.attempt_count += 1;
            let (summary_id, attempt_count) = (job.summary_id.clone(), job.attempt_count);

            if let Some(summary) = state.summaries.get(&summary_id) {
                claimed.push(ClaimedJob {
                    job_id,
                    summary_id,
                    attempt_count,
                    source_type: summary.source_type,
                    original_content: summary.original_content.clone(),
                });
            }
        }

        debug!(count = claimed.len(), "Claimed jobs from memory store");
        Ok(claimed)
    }

    async fn mark_processing(&self, summary_id: &SummaryId) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.summaries.get_mut(summary_id) {
            Some(summary) if summary.status == SummaryStatus::Pending => {
                summary.status = SummaryStatus::Processing;
                summary.error_message = None;
                summary.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete(
        &self,
        summary_id: &SummaryId,
        job_id: &JobId,
        summary_text: &str,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let applied = match state.summaries.get_mut(summary_id) {
            Some(summary) if summary.status == SummaryStatus::Processing => {
                summary.status = SummaryStatus::Completed;
                summary.summary_text = Some(summary_text.to_string());
                summary.error_message = None;
                summary.updated_at = now;
                true
            }
            _ => false,
        };

        if let Some(job) = state.jobs.get_mut(job_id) {
            job.status = if applied {
                JobStatus::Completed
            } else {
                JobStatus::Failed
            };
            job.locked_at = None;
            job.updated_at = now;
        }

        Ok(applied)
    }

    async fn fail(&self, request: FailRequest) -> StoreResult<FailOutcome> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let retry_at = now + self.requeue_delta();

        let Some(summary) = state.summaries.get_mut(&request.summary_id) else {
            return Ok(FailOutcome::default());
        };

        let canceled_by_user = summary.status == SummaryStatus::Failed
            && summary.error_message.as_deref().is_some_and(is_canceled_message);
        let retry = request.retries_left() && !canceled_by_user;

        summary.status = if retry {
            SummaryStatus::Pending
        } else {
            SummaryStatus::Failed
        };
        summary.error_message = Some(if canceled_by_user {
            CANCELED_MESSAGE.to_string()
        } else {
            request.error_message.clone()
        });
        summary.summary_text = None;
        summary.updated_at = now;
        let user_id = summary.user_id.clone();

        if let Some(job) = state.jobs.get_mut(&request.job_id) {
            if retry {
                job.status = JobStatus::Queued;
                job.scheduled_at = retry_at;
            } else {
                job.status = JobStatus::Failed;
                job.scheduled_at = now;
            }
            job.locked_at = None;
            job.updated_at = now;
        }

        Ok(FailOutcome {
            terminal: !retry,
            canceled_by_user,
            user_id,
        })
    }

    async fn cancel(
        &self,
        summary_id: &SummaryId,
        owner_id: &str,
    ) -> StoreResult<Option<SummaryRequest>> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let Some(summary) = state
            .summaries
            .get_mut(summary_id)
            .filter(|s| s.user_id.as_deref() == Some(owner_id))
        else {
            return Ok(None);
        };

        if summary.status.is_terminal() {
            return Ok(Some(summary.clone()));
        }

        summary.status = SummaryStatus::Failed;
        summary.error_message = Some(CANCELED_MESSAGE.to_string());
        summary.updated_at = now;
        let snapshot = summary.clone();

        for job in state.jobs.values_mut() {
            if &job.summary_id == summary_id
                && matches!(job.status, JobStatus::Queued | JobStatus::Processing)
            {
                job.status = JobStatus::Failed;
                job.scheduled_at = now;
                job.locked_at = None;
                job.updated_at = now;
            }
        }

        Ok(Some(snapshot))
    }

    async fn list_summaries_by_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<SummaryRequest>> {
        let state = self.state.lock().await;
        let mut rows: Vec<SummaryRequest> = state
            .summaries
            .values()
            .filter(|s| s.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn delete_summaries_by_user(&self, user_id: &str) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let doomed: Vec<SummaryId> = state
            .summaries
            .values()
            .filter(|s| s.user_id.as_deref() == Some(user_id))
            .map(|s| s.id.clone())
            .collect();

        for id in &doomed {
            state.summaries.remove(id);
        }
        state.jobs.retain(|_, job| !doomed.contains(&job.summary_id));

        Ok(doomed.len() as u64)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
