//! Summarization worker.
//!
//! This crate provides:
//! - YouTube transcript acquisition with an out-of-process fallback
//! - Gemini generation with model failover and retry/backoff
//! - Deterministic extractive fallback summaries
//! - The batch executor that settles jobs with the queue and the ledger

pub mod config;
pub mod error;
pub mod executor;
pub mod fallback;
pub mod gemini;
pub mod logging;
pub mod metrics;
pub mod prompts;
pub mod retry;
pub mod summarizer;
pub mod transcript;

use std::sync::Arc;

use docsum_store::Backends;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{BatchReport, JobExecutor};
pub use logging::JobLogger;
pub use summarizer::{DocumentSummarizer, SummarizeError, Summarizer};

/// Wire an executor from environment configuration onto existing backends.
pub fn executor_from_env(backends: &Backends) -> WorkerResult<JobExecutor> {
    let summarizer = Summarizer::from_env()?;
    Ok(JobExecutor::new(
        Arc::clone(&backends.store),
        Arc::clone(&backends.ledger),
        Arc::new(summarizer),
        WorkerConfig::from_env(),
    ))
}
