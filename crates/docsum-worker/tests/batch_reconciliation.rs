//! Batch runs settled against the in-memory queue and a mocked ledger.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docsum_models::{JobStatus, SourceType, SummaryId, SummaryStatus, CANCELED_MESSAGE};
use docsum_store::{
    CreditLedger, MemoryCreditLedger, MemorySummaryStore, MockCreditLedger, NewSummary, SummaryStore,
};
use docsum_worker::gemini::GenerationError;
use docsum_worker::summarizer::SummarizeResult;
use docsum_worker::{DocumentSummarizer, JobExecutor, SummarizeError, WorkerConfig};
use mockall::predicate::eq;
use tokio::sync::Mutex;

const SUMMARY: &str = "TL;DR\n- one\n- two\n- three\n\nFull Summary\nbody";

/// Replays a fixed sequence of results, one per call.
struct Scripted {
    results: Mutex<VecDeque<SummarizeResult<String>>>,
}

impl Scripted {
    fn new(results: Vec<SummarizeResult<String>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into()),
        })
    }
}

#[async_trait]
impl DocumentSummarizer for Scripted {
    async fn summarize(&self, _: SourceType, _: &str, _: &str) -> SummarizeResult<String> {
        self.results
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(SUMMARY.to_string()))
    }
}

/// Lets the owner cancel while generation is in flight.
struct CancelsMidway {
    store: Arc<MemorySummaryStore>,
    summary_id: SummaryId,
}

#[async_trait]
impl DocumentSummarizer for CancelsMidway {
    async fn summarize(&self, _: SourceType, _: &str, _: &str) -> SummarizeResult<String> {
        self.store.cancel(&self.summary_id, "user-1").await.unwrap();
        Ok(SUMMARY.to_string())
    }
}

fn config() -> WorkerConfig {
    WorkerConfig::default().with_batch_size(5).with_max_attempts(3)
}

async fn seed(store: &MemorySummaryStore) -> SummaryId {
    let (summary, _) = store
        .create_summary(NewSummary {
            user_id: Some("user-1".to_string()),
            source_type: SourceType::Text,
            original_content: "Some long article.".to_string(),
        })
        .await
        .unwrap();
    summary.id
}

fn timeout() -> SummarizeResult<String> {
    Err(SummarizeError::Generation(GenerationError::timeout("deadline exceeded")))
}

#[tokio::test]
async fn successful_job_completes_without_ledger_activity() {
    let store = Arc::new(MemorySummaryStore::new(Duration::ZERO));
    let id = seed(&store).await;
    let ledger = MockCreditLedger::new();

    let executor = JobExecutor::new(store.clone(), Arc::new(ledger), Scripted::new(vec![]), config());
    let report = executor.run_batch().await.unwrap();

    assert_eq!((report.picked, report.completed, report.failed), (1, 1, 0));
    assert!(report.failure_codes.is_empty());

    let summary = store.get_summary(&id).await.unwrap().unwrap();
    assert_eq!(summary.status, SummaryStatus::Completed);
    assert_eq!(summary.summary_text.as_deref(), Some(SUMMARY));
    let jobs = store.jobs_for_summary(&id).await.unwrap();
    assert_eq!(jobs[0].status, JobStatus::Completed);
}

#[tokio::test]
async fn retryable_failures_requeue_until_the_ceiling_then_refund_once() {
    let store = Arc::new(MemorySummaryStore::new(Duration::ZERO));
    let id = seed(&store).await;

    let mut ledger = MockCreditLedger::new();
    ledger
        .expect_refund()
        .with(eq("user-1"))
        .times(1)
        .returning(|_| Ok(Some(5)));

    let summarizer = Scripted::new(vec![timeout(), timeout(), timeout()]);
    let executor = JobExecutor::new(store.clone(), Arc::new(ledger), summarizer, config());

    for attempt in 1..=2 {
        let report = executor.run_batch().await.unwrap();
        assert_eq!(report.failed, 1, "attempt {attempt}");
        assert_eq!(report.failure_codes.get("GEMINI_TIMEOUT"), Some(&1));

        let summary = store.get_summary(&id).await.unwrap().unwrap();
        assert_eq!(summary.status, SummaryStatus::Pending);
        assert!(summary.error_message.unwrap().starts_with("[GEMINI_TIMEOUT]"));
    }

    let report = executor.run_batch().await.unwrap();
    assert_eq!(report.failed, 1);

    let summary = store.get_summary(&id).await.unwrap().unwrap();
    assert_eq!(summary.status, SummaryStatus::Failed);
    let jobs = store.jobs_for_summary(&id).await.unwrap();
    assert_eq!(jobs[0].status, JobStatus::Failed);
    assert_eq!(jobs[0].attempt_count, 3);

    assert_eq!(executor.run_batch().await.unwrap().picked, 0);
}

#[tokio::test]
async fn non_retryable_failure_is_terminal_on_first_attempt() {
    let store = Arc::new(MemorySummaryStore::new(Duration::ZERO));
    let id = seed(&store).await;
    let ledger = Arc::new(MemoryCreditLedger::new().with_user("user-1", 0));

    let summarizer = Scripted::new(vec![Err(SummarizeError::FallbackOutputInvalid(
        "layout check failed".to_string(),
    ))]);
    let executor = JobExecutor::new(store.clone(), ledger.clone(), summarizer, config());
    let report = executor.run_batch().await.unwrap();

    assert_eq!(report.failure_codes.get("FALLBACK_OUTPUT_INVALID"), Some(&1));
    let summary = store.get_summary(&id).await.unwrap().unwrap();
    assert_eq!(summary.status, SummaryStatus::Failed);
    assert_eq!(
        summary.error_message.as_deref(),
        Some("[FALLBACK_OUTPUT_INVALID] layout check failed")
    );
    assert_eq!(ledger.balance("user-1").await.unwrap(), Some(1));
}

#[tokio::test]
async fn cancellation_during_generation_drops_the_result_without_refund() {
    let store = Arc::new(MemorySummaryStore::new(Duration::ZERO));
    let id = seed(&store).await;
    let summarizer = Arc::new(CancelsMidway {
        store: store.clone(),
        summary_id: id.clone(),
    });

    let mut ledger = MockCreditLedger::new();
    ledger.expect_refund().never();

    let executor = JobExecutor::new(store.clone(), Arc::new(ledger), summarizer, config());
    let report = executor.run_batch().await.unwrap();

    assert_eq!(report.completed, 0);
    assert_eq!(report.failure_codes.get("SUMMARY_CANCELED"), Some(&1));

    let summary = store.get_summary(&id).await.unwrap().unwrap();
    assert_eq!(summary.status, SummaryStatus::Failed);
    assert_eq!(summary.error_message.as_deref(), Some(CANCELED_MESSAGE));
    assert!(summary.summary_text.is_none());
}

#[tokio::test]
async fn empty_queue_reports_zeroes() {
    let store = Arc::new(MemorySummaryStore::new(Duration::ZERO));
    let executor = JobExecutor::new(
        store,
        Arc::new(MockCreditLedger::new()),
        Scripted::new(vec![]),
        config(),
    );
    let report = executor.run_batch().await.unwrap();
    assert_eq!(report.picked, 0);
    assert_eq!(report.avg_duration_ms, 0);
}
