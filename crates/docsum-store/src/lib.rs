//! Summary persistence, job queue and credit ledger.
//!
//! This crate provides:
//! - `SummaryStore`: lease-based job queue over summaries and jobs
//! - `CreditLedger`: atomic per-user credit balance
//! - Postgres (sqlx) and in-memory backends for both
//! - Submission helpers that tie the two together

pub mod config;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod submit;

use std::sync::Arc;

use tracing::warn;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use ledger::{CreditLedger, MemoryCreditLedger, PgCreditLedger, DEFAULT_USER_CREDITS};
#[cfg(any(test, feature = "mock"))]
pub use ledger::MockCreditLedger;
pub use memory::MemorySummaryStore;
pub use postgres::{connect_pool, PgSummaryStore};
pub use store::{FailRequest, NewSummary, SummaryStore};
pub use submit::{cancel_summary, normalize_content, submit_summary, Submission, MAX_CONTENT_CHARS};

/// Store and ledger handles shared by the binaries.
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn SummaryStore>,
    pub ledger: Arc<dyn CreditLedger>,
    /// `true` when running on the process-local backends
    pub in_memory: bool,
}

/// Build backends from configuration.
///
/// Without a database URL the in-memory store and ledger are used; state is
/// then lost on restart and not shared between processes.
pub async fn connect(config: &StoreConfig) -> StoreResult<Backends> {
    match config.database_url.as_deref() {
        Some(url) => {
            let pool = connect_pool(config, url).await?;
            Ok(Backends {
                store: Arc::new(PgSummaryStore::new(pool.clone(), config.requeue_delay)),
                ledger: Arc::new(PgCreditLedger::new(pool)),
                in_memory: false,
            })
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory store and ledger");
            Ok(Backends {
                store: Arc::new(MemorySummaryStore::new(config.requeue_delay)),
                ledger: Arc::new(MemoryCreditLedger::new()),
                in_memory: true,
            })
        }
    }
}

/// Connect using `StoreConfig::from_env`.
pub async fn connect_from_env() -> StoreResult<Backends> {
    connect(&StoreConfig::from_env()).await
}
