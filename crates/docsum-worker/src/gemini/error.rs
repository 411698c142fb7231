//! Generation client errors.

use docsum_models::ErrorCode;
use thiserror::Error;

pub type GenerationResult<T> = Result<T, GenerationError>;

/// Failure of a generation call, carrying its taxonomy code in the message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("[MISSING_GEMINI_KEY] {0}")]
    MissingKey(String),

    #[error("[GEMINI_REQUEST_FAILED] {0}")]
    RequestFailed(String),

    #[error("[GEMINI_TIMEOUT] {0}")]
    Timeout(String),

    #[error("[GEMINI_EMPTY_RESPONSE] {0}")]
    EmptyResponse(String),

    #[error("[GEMINI_CONFIG_INVALID] {0}")]
    ConfigInvalid(String),

    #[error("[GEMINI_UNKNOWN_ERROR] {0}")]
    Unknown(String),
}

impl GenerationError {
    pub fn missing_key(msg: impl Into<String>) -> Self {
        Self::MissingKey(msg.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn empty_response(msg: impl Into<String>) -> Self {
        Self::EmptyResponse(msg.into())
    }

    pub fn config_invalid(msg: impl Into<String>) -> Self {
        Self::ConfigInvalid(msg.into())
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            GenerationError::MissingKey(_) => ErrorCode::MissingKey,
            GenerationError::RequestFailed(_) => ErrorCode::RequestFailed,
            GenerationError::Timeout(_) => ErrorCode::Timeout,
            GenerationError::EmptyResponse(_) => ErrorCode::EmptyResponse,
            GenerationError::ConfigInvalid(_) => ErrorCode::ConfigInvalid,
            GenerationError::Unknown(_) => ErrorCode::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_carries_code() {
        let err = GenerationError::timeout("no answer within 45000ms");
        assert_eq!(err.to_string(), "[GEMINI_TIMEOUT] no answer within 45000ms");
        assert_eq!(ErrorCode::from_message(&err.to_string()), Some(err.code()));
    }
}
