//! Job definitions for queue processing.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::summary::{SourceType, SummaryId};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job state in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting in queue (possibly scheduled in the future)
    #[default]
    Queued,
    /// Job is leased by a worker
    Processing,
    /// Job completed successfully
    Completed,
    /// Job failed terminally
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A queue row. One job is reused across retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub summary_id: SummaryId,
    pub status: JobStatus,
    /// Incremented on every claim
    pub attempt_count: i32,
    /// Earliest time the job may be claimed
    pub scheduled_at: DateTime<Utc>,
    /// Set while the job is processing
    pub locked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new queued job for a summary, eligible immediately.
    pub fn new(summary_id: SummaryId) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            summary_id,
            status: JobStatus::Queued,
            attempt_count: 0,
            scheduled_at: now,
            locked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the job can be claimed at `now`.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Queued && self.scheduled_at <= now
    }
}

/// A job handed to a worker by `claim`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedJob {
    pub job_id: JobId,
    pub summary_id: SummaryId,
    /// Attempt number of this lease (1-based)
    pub attempt_count: i32,
    pub source_type: SourceType,
    pub original_content: String,
}

/// Result of reporting a failure to the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct FailOutcome {
    /// No further retry will happen
    pub terminal: bool,
    /// The failure was caused by owner cancellation
    pub canceled_by_user: bool,
    /// Owner of the summary, if still known
    pub user_id: Option<String>,
}

impl FailOutcome {
    /// Whether the owner should get their credit back.
    pub fn should_refund(&self) -> bool {
        self.terminal && !self.canceled_by_user && self.user_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_claimable() {
        let job = Job::new(SummaryId::new());
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempt_count, 0);
        assert!(job.locked_at.is_none());
        assert!(job.is_claimable(Utc::now()));
        assert!(!job.is_claimable(job.scheduled_at - chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_job_status_round_trip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!(JobStatus::Completed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }

    #[test]
    fn test_fail_outcome_refund_rule() {
        let base = FailOutcome {
            terminal: true,
            canceled_by_user: false,
            user_id: Some("u1".into()),
        };
        assert!(base.should_refund());
        assert!(!FailOutcome { terminal: false, ..base.clone() }.should_refund());
        assert!(!FailOutcome { canceled_by_user: true, ..base.clone() }.should_refund());
        assert!(!FailOutcome { user_id: None, ..base }.should_refund());
    }

    #[test]
    fn test_fail_outcome_serializes_camel_case() {
        let json = serde_json::to_value(FailOutcome::default()).unwrap();
        assert_eq!(json["canceledByUser"], false);
        assert_eq!(json["terminal"], false);
    }
}
