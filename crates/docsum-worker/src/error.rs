//! Worker error types.

use docsum_store::StoreError;
use thiserror::Error;

use crate::gemini::GenerationError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Queue operation failed: {0}")]
    QueueFailed(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Generation client error: {0}")]
    Generation(#[from] GenerationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn queue_failed(msg: impl Into<String>) -> Self {
        Self::QueueFailed(msg.into())
    }

    /// Machine-readable code for HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            WorkerError::ConfigError(_) => "WORKER_CONFIG_INVALID",
            WorkerError::QueueFailed(_) => "QUEUE_FAILED",
            WorkerError::Store(e) => e.code(),
            WorkerError::Generation(e) => e.code().as_str(),
            WorkerError::Io(_) => "IO_ERROR",
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkerError::QueueFailed(_) | WorkerError::Store(StoreError::Database(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(WorkerError::config_error("x").code(), "WORKER_CONFIG_INVALID");
        assert_eq!(
            WorkerError::from(StoreError::not_found("summary")).code(),
            "NOT_FOUND"
        );
        assert!(WorkerError::queue_failed("claim").is_retryable());
        assert!(!WorkerError::config_error("x").is_retryable());
    }
}
