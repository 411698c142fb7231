//! Postgres-backed store.
//!
//! Ids are stored as `uuid` and exchanged as text; every query casts at the
//! boundary (`$1::uuid`, `id::text`).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docsum_models::{
    summary::is_canceled_message, ClaimedJob, FailOutcome, Job, JobId, JobStatus, SourceType,
    SummaryId, SummaryRequest, SummaryStatus, CANCELED_MESSAGE,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

/// Ids that cannot be a `uuid` match no row; checking first keeps the
/// `$n::uuid` casts from turning a lookup miss into a database error.
pub(crate) fn is_uuid(value: &str) -> bool {
    Uuid::parse_str(value).is_ok()
}
use crate::store::{FailRequest, NewSummary, SummaryStore};

macro_rules! summary_columns {
    () => {
        "id::text AS id, user_id::text AS user_id, source_type, original_content, \
         summary_text, status, error_message, created_at, updated_at"
    };
}

macro_rules! job_columns {
    () => {
        "id::text AS id, summary_id::text AS summary_id, status, attempt_count, \
         scheduled_at, locked_at, created_at, updated_at"
    };
}

/// Connect a pool and run embedded migrations.
pub async fn connect_pool(config: &StoreConfig, database_url: &str) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!(max_connections = config.max_connections, "Connected to Postgres");
    Ok(pool)
}

fn parse_column<T: std::str::FromStr<Err = String>>(row: &PgRow, column: &str) -> StoreResult<T> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|e: String| StoreError::corrupt_row(format!("{column}: {e}")))
}

fn summary_from_row(row: &PgRow) -> StoreResult<SummaryRequest> {
    Ok(SummaryRequest {
        id: SummaryId::from_string(row.try_get::<String, _>("id")?),
        user_id: row.try_get("user_id")?,
        source_type: parse_column::<SourceType>(row, "source_type")?,
        original_content: row.try_get("original_content")?,
        summary_text: row.try_get("summary_text")?,
        status: parse_column::<SummaryStatus>(row, "status")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn job_from_row(row: &PgRow) -> StoreResult<Job> {
    Ok(Job {
        id: JobId::from_string(row.try_get::<String, _>("id")?),
        summary_id: SummaryId::from_string(row.try_get::<String, _>("summary_id")?),
        status: parse_column::<JobStatus>(row, "status")?,
        attempt_count: row.try_get("attempt_count")?,
        scheduled_at: row.try_get("scheduled_at")?,
        locked_at: row.try_get("locked_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// `SummaryStore` over a Postgres pool.
#[derive(Clone)]
pub struct PgSummaryStore {
    pool: PgPool,
    requeue_delay: Duration,
}

impl PgSummaryStore {
    pub fn new(pool: PgPool, requeue_delay: Duration) -> Self {
        Self {
            pool,
            requeue_delay,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SummaryStore for PgSummaryStore {
    async fn create_summary(&self, new: NewSummary) -> StoreResult<(SummaryRequest, Job)> {
        let summary_id = Uuid::new_v4().to_string();
        let job_id = Uuid::new_v4().to_string();
        let mut tx = self.pool.begin().await?;

        let summary_row = sqlx::query(concat!(
            "INSERT INTO summaries (id, user_id, source_type, original_content, status) \
             VALUES ($1::uuid, $2::uuid, $3, $4, 'pending') RETURNING ",
            summary_columns!()
        ))
        .bind(&summary_id)
        .bind(new.user_id.as_deref())
        .bind(new.source_type.as_str())
        .bind(&new.original_content)
        .fetch_one(&mut *tx)
        .await?;

        let job_row = sqlx::query(concat!(
            "INSERT INTO summary_jobs (id, summary_id, status, attempt_count, scheduled_at) \
             VALUES ($1::uuid, $2::uuid, 'queued', 0, NOW()) RETURNING ",
            job_columns!()
        ))
        .bind(&job_id)
        .bind(&summary_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(summary_id = %summary_id, job_id = %job_id, "Created summary and job");
        Ok((summary_from_row(&summary_row)?, job_from_row(&job_row)?))
    }

    async fn get_summary(&self, id: &SummaryId) -> StoreResult<Option<SummaryRequest>> {
        if !is_uuid(id.as_str()) {
            return Ok(None);
        }
        sqlx::query(concat!(
            "SELECT ",
            summary_columns!(),
            " FROM summaries WHERE id = $1::uuid"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(summary_from_row)
        .transpose()
    }

    async fn get_summary_for_user(
        &self,
        id: &SummaryId,
        user_id: &str,
    ) -> StoreResult<Option<SummaryRequest>> {
        if !is_uuid(id.as_str()) || !is_uuid(user_id) {
            return Ok(None);
        }
        sqlx::query(concat!(
            "SELECT ",
            summary_columns!(),
            " FROM summaries WHERE id = $1::uuid AND user_id = $2::uuid"
        ))
        .bind(id.as_str())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(summary_from_row)
        .transpose()
    }

    async fn get_job(&self, id: &JobId) -> StoreResult<Option<Job>> {
        if !is_uuid(id.as_str()) {
            return Ok(None);
        }
        sqlx::query(concat!(
            "SELECT ",
            job_columns!(),
            " FROM summary_jobs WHERE id = $1::uuid"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(job_from_row)
        .transpose()
    }

    async fn jobs_for_summary(&self, id: &SummaryId) -> StoreResult<Vec<Job>> {
        if !is_uuid(id.as_str()) {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(concat!(
            "SELECT ",
            job_columns!(),
            " FROM summary_jobs WHERE summary_id = $1::uuid ORDER BY created_at ASC"
        ))
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    async fn claim(&self, limit: usize) -> StoreResult<Vec<ClaimedJob>> {
        let rows = sqlx::query(
            r#"
            WITH picked AS (
                SELECT j.id
                FROM summary_jobs j
                JOIN summaries s ON s.id = j.summary_id
                WHERE j.status = 'queued'
                  AND j.scheduled_at <= NOW()
                  AND s.status = 'pending'
                ORDER BY j.created_at ASC
                LIMIT $1
                FOR UPDATE OF j SKIP LOCKED
            )
            UPDATE summary_jobs AS sj
            SET status = 'processing',
                locked_at = NOW(),
                updated_at = NOW(),
                attempt_count = sj.attempt_count + 1
            FROM picked, summaries s
            WHERE sj.id = picked.id
              AND s.id = sj.summary_id
            RETURNING sj.id::text AS job_id,
                      sj.summary_id::text AS summary_id,
                      sj.attempt_count,
                      sj.created_at,
                      s.source_type,
                      s.original_content
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut claimed = rows
            .iter()
            .map(|row| {
                let created_at: DateTime<Utc> = row.try_get("created_at")?;
                let job = ClaimedJob {
                    job_id: JobId::from_string(row.try_get::<String, _>("job_id")?),
                    summary_id: SummaryId::from_string(row.try_get::<String, _>("summary_id")?),
                    attempt_count: row.try_get("attempt_count")?,
                    source_type: parse_column::<SourceType>(row, "source_type")?,
                    original_content: row.try_get("original_content")?,
                };
                Ok((created_at, job))
            })
            .collect::<StoreResult<Vec<_>>>()?;

        // RETURNING carries no ordering guarantee.
        claimed.sort_by_key(|(created_at, _)| *created_at);
        debug!(count = claimed.len(), "Claimed jobs");
        Ok(claimed.into_iter().map(|(_, job)| job).collect())
    }

    async fn mark_processing(&self, summary_id: &SummaryId) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE summaries SET status = 'processing', error_message = NULL, updated_at = NOW() \
             WHERE id = $1::uuid AND status = 'pending'",
        )
        .bind(summary_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete(
        &self,
        summary_id: &SummaryId,
        job_id: &JobId,
        summary_text: &str,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE summaries SET status = 'completed', summary_text = $2, error_message = NULL, \
             updated_at = NOW() WHERE id = $1::uuid AND status = 'processing'",
        )
        .bind(summary_id.as_str())
        .bind(summary_text)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let applied = updated > 0;
        let job_status = if applied {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };

        sqlx::query(
            "UPDATE summary_jobs SET status = $2, locked_at = NULL, updated_at = NOW() \
             WHERE id = $1::uuid",
        )
        .bind(job_id.as_str())
        .bind(job_status.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if !applied {
            warn!(summary_id = %summary_id, job_id = %job_id, "Completion not applied, summary was no longer processing");
        }
        Ok(applied)
    }

    async fn fail(&self, request: FailRequest) -> StoreResult<FailOutcome> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query(
            "SELECT status, error_message, user_id::text AS user_id FROM summaries \
             WHERE id = $1::uuid FOR UPDATE",
        )
        .bind(request.summary_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            return Ok(FailOutcome::default());
        };

        let status = parse_column::<SummaryStatus>(&current, "status")?;
        let error_message: Option<String> = current.try_get("error_message")?;
        let user_id: Option<String> = current.try_get("user_id")?;

        let canceled_by_user = status == SummaryStatus::Failed
            && error_message.as_deref().is_some_and(is_canceled_message);
        let retry = request.retries_left() && !canceled_by_user;

        let (summary_status, job_status, delay_ms) = if retry {
            (
                SummaryStatus::Pending,
                JobStatus::Queued,
                self.requeue_delay.as_millis() as i64,
            )
        } else {
            (SummaryStatus::Failed, JobStatus::Failed, 0)
        };
        let recorded_message = if canceled_by_user {
            CANCELED_MESSAGE
        } else {
            request.error_message.as_str()
        };

        sqlx::query(
            "UPDATE summaries SET status = $2, error_message = $3, summary_text = NULL, \
             updated_at = NOW() WHERE id = $1::uuid",
        )
        .bind(request.summary_id.as_str())
        .bind(summary_status.as_str())
        .bind(recorded_message)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE summary_jobs SET status = $2, \
             scheduled_at = NOW() + $3::bigint * INTERVAL '1 millisecond', \
             locked_at = NULL, updated_at = NOW() WHERE id = $1::uuid",
        )
        .bind(request.job_id.as_str())
        .bind(job_status.as_str())
        .bind(delay_ms)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

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
        if !is_uuid(summary_id.as_str()) || !is_uuid(owner_id) {
            return Ok(None);
        }
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(concat!(
            "UPDATE summaries SET status = 'failed', error_message = $3, updated_at = NOW() \
             WHERE id = $1::uuid AND user_id = $2::uuid AND status IN ('pending', 'processing') \
             RETURNING ",
            summary_columns!()
        ))
        .bind(summary_id.as_str())
        .bind(owner_id)
        .bind(CANCELED_MESSAGE)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(updated) = updated else {
            let existing = sqlx::query(concat!(
                "SELECT ",
                summary_columns!(),
                " FROM summaries WHERE id = $1::uuid AND user_id = $2::uuid"
            ))
            .bind(summary_id.as_str())
            .bind(owner_id)
            .fetch_optional(&mut *tx)
            .await?;
            tx.commit().await?;
            return existing.as_ref().map(summary_from_row).transpose();
        };

        sqlx::query(
            "UPDATE summary_jobs SET status = 'failed', scheduled_at = NOW(), locked_at = NULL, \
             updated_at = NOW() WHERE summary_id = $1::uuid AND status IN ('queued', 'processing')",
        )
        .bind(summary_id.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(summary_id = %summary_id, "Summary canceled by owner");
        summary_from_row(&updated).map(Some)
    }

    async fn list_summaries_by_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<SummaryRequest>> {
        if !is_uuid(user_id) {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(concat!(
            "SELECT ",
            summary_columns!(),
            " FROM summaries WHERE user_id = $1::uuid ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(summary_from_row).collect()
    }

    async fn delete_summaries_by_user(&self, user_id: &str) -> StoreResult<u64> {
        if !is_uuid(user_id) {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM summaries WHERE user_id = $1::uuid")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_uuid() {
        assert!(is_uuid(&Uuid::new_v4().to_string()));
        assert!(!is_uuid("user-1"));
        assert!(!is_uuid(""));
    }
}
