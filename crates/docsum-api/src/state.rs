//! Application state.

use std::sync::Arc;

use docsum_store::{Backends, SummaryStore};
use docsum_worker::transcript::YtDlpExtractor;
use docsum_worker::{executor_from_env, JobExecutor};
use reqwest::Client;

use crate::config::{ApiConfig, TranscriptWorkerConfig};
use crate::error::ApiResult;

/// Shared state of the main API server.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn SummaryStore>,
    pub executor: Arc<JobExecutor>,
    /// `true` when running on the process-local store
    pub in_memory: bool,
}

impl AppState {
    /// Connect the store and wire the executor from environment configuration.
    pub async fn new(config: ApiConfig) -> ApiResult<Self> {
        let backends = docsum_store::connect_from_env().await?;
        let executor = executor_from_env(&backends)?;
        Ok(Self::from_parts(config, &backends, executor))
    }

    pub fn from_parts(config: ApiConfig, backends: &Backends, executor: JobExecutor) -> Self {
        Self {
            config,
            store: Arc::clone(&backends.store),
            executor: Arc::new(executor),
            in_memory: backends.in_memory,
        }
    }
}

/// Shared state of the remote transcript worker.
#[derive(Clone)]
pub struct TranscriptWorkerState {
    pub config: Arc<TranscriptWorkerConfig>,
    pub extractor: Arc<YtDlpExtractor>,
    pub http: Client,
}

impl TranscriptWorkerState {
    pub fn new(config: TranscriptWorkerConfig) -> Self {
        let extractor = YtDlpExtractor::new(config.ytdlp.clone());
        Self {
            config: Arc::new(config),
            extractor: Arc::new(extractor),
            http: Client::new(),
        }
    }
}
