//! Submission and cancellation helpers used by the front door.

use docsum_models::{normalize_youtube_url, ErrorCode, SourceType, SummaryId, SummaryRequest};
use serde::Serialize;
use tracing::{error, info};

use crate::error::{StoreError, StoreResult};
use crate::ledger::CreditLedger;
use crate::store::{NewSummary, SummaryStore};

/// Longest accepted text submission, in characters.
pub const MAX_CONTENT_CHARS: usize = 50_000;

/// Result of an accepted submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub summary: SummaryRequest,
    pub remaining_credits: i32,
}

/// Validate and normalize submitted content.
///
/// Video references are rewritten to the canonical watch URL.
pub fn normalize_content(source_type: SourceType, content: &str) -> StoreResult<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(StoreError::invalid_input("INVALID_INPUT", "content is empty"));
    }
    if trimmed.chars().count() > MAX_CONTENT_CHARS {
        return Err(StoreError::invalid_input(
            "INVALID_INPUT",
            format!("content exceeds {MAX_CONTENT_CHARS} characters"),
        ));
    }

    match source_type {
        SourceType::Text => Ok(trimmed.to_string()),
        SourceType::Video => normalize_youtube_url(trimmed)
            .map(|video| video.url)
            .map_err(|e| StoreError::invalid_input(ErrorCode::UrlInvalid.as_str(), e.to_string())),
    }
}

/// Charge one credit and enqueue a summary.
///
/// The credit is returned if the summary cannot be persisted.
pub async fn submit_summary(
    store: &dyn SummaryStore,
    ledger: &dyn CreditLedger,
    user_id: &str,
    source_type: SourceType,
    content: &str,
) -> StoreResult<Submission> {
    let original_content = normalize_content(source_type, content)?;

    let remaining_credits = ledger
        .consume(user_id)
        .await?
        .ok_or_else(|| StoreError::InsufficientCredits(format!("user {user_id} has no credits left")))?;

    let created = store
        .create_summary(NewSummary {
            user_id: Some(user_id.to_string()),
            source_type,
            original_content,
        })
        .await;

    match created {
        Ok((summary, job)) => {
            info!(
                summary_id = %summary.id,
                job_id = %job.id,
                source_type = %source_type,
                remaining_credits,
                "Summary submitted"
            );
            Ok(Submission {
                summary,
                remaining_credits,
            })
        }
        Err(e) => {
            if let Err(refund_err) = ledger.refund(user_id).await {
                error!(user_id = %user_id, error = %refund_err, "Failed to restore credit after submission error");
            }
            Err(e)
        }
    }
}

/// Cancel a summary on behalf of its owner.
pub async fn cancel_summary(
    store: &dyn SummaryStore,
    summary_id: &SummaryId,
    owner_id: &str,
) -> StoreResult<SummaryRequest> {
    store
        .cancel(summary_id, owner_id)
        .await?
        .ok_or_else(|| StoreError::not_found(format!("summary {summary_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{MemoryCreditLedger, MockCreditLedger};
    use crate::memory::MemorySummaryStore;
    use docsum_models::SummaryStatus;

    #[test]
    fn test_normalize_content() {
        assert_eq!(
            normalize_content(SourceType::Video, " https://youtu.be/dQw4w9WgXcQ ").unwrap(),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
        assert_eq!(
            normalize_content(SourceType::Video, "https://vimeo.com/1").unwrap_err().code(),
            "YOUTUBE_URL_INVALID"
        );
        assert_eq!(
            normalize_content(SourceType::Text, "   ").unwrap_err().code(),
            "INVALID_INPUT"
        );
        let too_long = "a".repeat(MAX_CONTENT_CHARS + 1);
        assert!(normalize_content(SourceType::Text, &too_long).is_err());
    }

    #[tokio::test]
    async fn test_submit_consumes_credit() {
        let store = MemorySummaryStore::default();
        let ledger = MemoryCreditLedger::new().with_user("u1", 1);

        let submission = submit_summary(&store, &ledger, "u1", SourceType::Text, "some text")
            .await
            .unwrap();
        assert_eq!(submission.remaining_credits, 0);
        assert_eq!(submission.summary.status, SummaryStatus::Pending);
        assert_eq!(store.jobs_for_summary(&submission.summary.id).await.unwrap().len(), 1);

        let err = submit_summary(&store, &ledger, "u1", SourceType::Text, "more text")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_CREDITS");
    }

    #[tokio::test]
    async fn test_invalid_input_does_not_charge() {
        let store = MemorySummaryStore::default();
        let mut ledger = MockCreditLedger::new();
        ledger.expect_consume().never();

        let err = submit_summary(&store, &ledger, "u1", SourceType::Video, "not a url")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "YOUTUBE_URL_INVALID");
    }

    #[tokio::test]
    async fn test_cancel_summary_not_found() {
        let store = MemorySummaryStore::default();
        let err = cancel_summary(&store, &SummaryId::new(), "u1").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
