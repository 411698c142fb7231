//! Store error types.

use docsum_models::ErrorCode;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("[INSUFFICIENT_CREDITS] {0}")]
    InsufficientCredits(String),

    #[error("[{code}] {message}")]
    InvalidInput { code: &'static str, message: String },

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_input(code: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            code,
            message: message.into(),
        }
    }

    pub fn corrupt_row(msg: impl Into<String>) -> Self {
        Self::CorruptRow(msg.into())
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Database(_) | StoreError::Migration(_) => "DATABASE_ERROR",
            StoreError::NotFound(_) => "NOT_FOUND",
            StoreError::InsufficientCredits(_) => ErrorCode::InsufficientCredits.as_str(),
            StoreError::InvalidInput { code, .. } => code,
            StoreError::CorruptRow(_) => "CORRUPT_ROW",
        }
    }

    /// Whether the failure is on the caller's side.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound(_) | StoreError::InsufficientCredits(_) | StoreError::InvalidInput { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let err = StoreError::invalid_input("YOUTUBE_URL_INVALID", "bad url");
        assert_eq!(err.code(), "YOUTUBE_URL_INVALID");
        assert_eq!(err.to_string(), "[YOUTUBE_URL_INVALID] bad url");
        assert!(err.is_client_error());

        let err = StoreError::InsufficientCredits("user-1".into());
        assert_eq!(ErrorCode::from_message(&err.to_string()), Some(ErrorCode::InsufficientCredits));

        assert!(!StoreError::corrupt_row("status").is_client_error());
    }
}
