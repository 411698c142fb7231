//! Transcript acquisition errors.

use docsum_models::ErrorCode;
use thiserror::Error;

pub type TranscriptResult<T> = Result<T, TranscriptError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("[YOUTUBE_URL_INVALID] {0}")]
    InvalidUrl(String),

    #[error("[YOUTUBE_METADATA_FETCH_FAILED] {0}")]
    MetadataFetchFailed(String),

    #[error("[YOUTUBE_TRANSCRIPT_BLOCKED] {0}")]
    Blocked(String),

    #[error("[YOUTUBE_TRANSCRIPT_UNAVAILABLE] {0}")]
    Unavailable(String),

    #[error("[YOUTUBE_TRANSCRIPT_FETCH_FAILED] {0}")]
    FetchFailed(String),

    #[error("[TRANSCRIPT_WORKER_TIMEOUT] {0}")]
    WorkerTimeout(String),

    #[error("[TRANSCRIPT_WORKER_UNAVAILABLE] {0}")]
    WorkerUnavailable(String),
}

impl TranscriptError {
    pub fn invalid_url(msg: impl Into<String>) -> Self {
        Self::InvalidUrl(msg.into())
    }

    pub fn metadata_fetch_failed(msg: impl Into<String>) -> Self {
        Self::MetadataFetchFailed(msg.into())
    }

    pub fn blocked(msg: impl Into<String>) -> Self {
        Self::Blocked(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn fetch_failed(msg: impl Into<String>) -> Self {
        Self::FetchFailed(msg.into())
    }

    pub fn worker_timeout(msg: impl Into<String>) -> Self {
        Self::WorkerTimeout(msg.into())
    }

    pub fn worker_unavailable(msg: impl Into<String>) -> Self {
        Self::WorkerUnavailable(msg.into())
    }

    /// Rebuild an error from a code reported by a remote worker.
    ///
    /// Returns `None` for codes outside the acquisition group.
    pub fn from_code(code: ErrorCode, message: impl Into<String>) -> Option<Self> {
        let message = message.into();
        Some(match code {
            ErrorCode::UrlInvalid => Self::InvalidUrl(message),
            ErrorCode::MetadataFetchFailed => Self::MetadataFetchFailed(message),
            ErrorCode::TranscriptBlocked => Self::Blocked(message),
            ErrorCode::TranscriptUnavailable => Self::Unavailable(message),
            ErrorCode::TranscriptFetchFailed => Self::FetchFailed(message),
            ErrorCode::WorkerTimeout => Self::WorkerTimeout(message),
            ErrorCode::WorkerUnavailable => Self::WorkerUnavailable(message),
            _ => return None,
        })
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            TranscriptError::InvalidUrl(_) => ErrorCode::UrlInvalid,
            TranscriptError::MetadataFetchFailed(_) => ErrorCode::MetadataFetchFailed,
            TranscriptError::Blocked(_) => ErrorCode::TranscriptBlocked,
            TranscriptError::Unavailable(_) => ErrorCode::TranscriptUnavailable,
            TranscriptError::FetchFailed(_) => ErrorCode::TranscriptFetchFailed,
            TranscriptError::WorkerTimeout(_) => ErrorCode::WorkerTimeout,
            TranscriptError::WorkerUnavailable(_) => ErrorCode::WorkerUnavailable,
        }
    }

    /// Message without the `[CODE]` prefix.
    pub fn message(&self) -> &str {
        match self {
            TranscriptError::InvalidUrl(m)
            | TranscriptError::MetadataFetchFailed(m)
            | TranscriptError::Blocked(m)
            | TranscriptError::Unavailable(m)
            | TranscriptError::FetchFailed(m)
            | TranscriptError::WorkerTimeout(m)
            | TranscriptError::WorkerUnavailable(m) => m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code_round_trip() {
        let err = TranscriptError::from_code(ErrorCode::TranscriptBlocked, "consent page").unwrap();
        assert_eq!(err, TranscriptError::blocked("consent page"));
        assert_eq!(err.code(), ErrorCode::TranscriptBlocked);
        assert_eq!(err.message(), "consent page");
        assert!(TranscriptError::from_code(ErrorCode::Timeout, "x").is_none());
    }
}
