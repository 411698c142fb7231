//! Machine-readable error codes.
//!
//! Every failure that crosses a component boundary carries one of these codes
//! as a `[CODE]` prefix in its human-readable message. The prefix survives
//! persistence (it is stored in `summaries.error_message`), which lets the
//! worker re-derive the code after a round-trip through the database.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

static CODE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([A-Z0-9_]+)\]").expect("valid error code regex"));

/// Stable error code taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub enum ErrorCode {
    // Input validation
    #[serde(rename = "YOUTUBE_URL_INVALID")]
    UrlInvalid,

    // Acquisition
    #[serde(rename = "YOUTUBE_METADATA_FETCH_FAILED")]
    MetadataFetchFailed,
    #[serde(rename = "YOUTUBE_TRANSCRIPT_BLOCKED")]
    TranscriptBlocked,
    #[serde(rename = "YOUTUBE_TRANSCRIPT_UNAVAILABLE")]
    TranscriptUnavailable,
    #[serde(rename = "YOUTUBE_TRANSCRIPT_FETCH_FAILED")]
    TranscriptFetchFailed,
    #[serde(rename = "TRANSCRIPT_WORKER_TIMEOUT")]
    WorkerTimeout,
    #[serde(rename = "TRANSCRIPT_WORKER_UNAVAILABLE")]
    WorkerUnavailable,

    // Generation
    #[serde(rename = "MISSING_GEMINI_KEY")]
    MissingKey,
    #[serde(rename = "GEMINI_REQUEST_FAILED")]
    RequestFailed,
    #[serde(rename = "GEMINI_TIMEOUT")]
    Timeout,
    #[serde(rename = "GEMINI_EMPTY_RESPONSE")]
    EmptyResponse,
    #[serde(rename = "GEMINI_OUTPUT_INVALID")]
    OutputInvalid,
    #[serde(rename = "GEMINI_CONFIG_INVALID")]
    ConfigInvalid,
    #[serde(rename = "GEMINI_UNKNOWN_ERROR")]
    Unknown,

    // Queue / domain
    #[serde(rename = "SUMMARY_CANCELED")]
    SummaryCanceled,
    #[serde(rename = "FALLBACK_OUTPUT_INVALID")]
    FallbackOutputInvalid,

    // Ledger
    #[serde(rename = "INSUFFICIENT_CREDITS")]
    InsufficientCredits,
}

impl ErrorCode {
    /// All codes, in taxonomy order.
    pub const ALL: [ErrorCode; 17] = [
        ErrorCode::UrlInvalid,
        ErrorCode::MetadataFetchFailed,
        ErrorCode::TranscriptBlocked,
        ErrorCode::TranscriptUnavailable,
        ErrorCode::TranscriptFetchFailed,
        ErrorCode::WorkerTimeout,
        ErrorCode::WorkerUnavailable,
        ErrorCode::MissingKey,
        ErrorCode::RequestFailed,
        ErrorCode::Timeout,
        ErrorCode::EmptyResponse,
        ErrorCode::OutputInvalid,
        ErrorCode::ConfigInvalid,
        ErrorCode::Unknown,
        ErrorCode::SummaryCanceled,
        ErrorCode::FallbackOutputInvalid,
        ErrorCode::InsufficientCredits,
    ];

    /// Wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UrlInvalid => "YOUTUBE_URL_INVALID",
            ErrorCode::MetadataFetchFailed => "YOUTUBE_METADATA_FETCH_FAILED",
            ErrorCode::TranscriptBlocked => "YOUTUBE_TRANSCRIPT_BLOCKED",
            ErrorCode::TranscriptUnavailable => "YOUTUBE_TRANSCRIPT_UNAVAILABLE",
            ErrorCode::TranscriptFetchFailed => "YOUTUBE_TRANSCRIPT_FETCH_FAILED",
            ErrorCode::WorkerTimeout => "TRANSCRIPT_WORKER_TIMEOUT",
            ErrorCode::WorkerUnavailable => "TRANSCRIPT_WORKER_UNAVAILABLE",
            ErrorCode::MissingKey => "MISSING_GEMINI_KEY",
            ErrorCode::RequestFailed => "GEMINI_REQUEST_FAILED",
            ErrorCode::Timeout => "GEMINI_TIMEOUT",
            ErrorCode::EmptyResponse => "GEMINI_EMPTY_RESPONSE",
            ErrorCode::OutputInvalid => "GEMINI_OUTPUT_INVALID",
            ErrorCode::ConfigInvalid => "GEMINI_CONFIG_INVALID",
            ErrorCode::Unknown => "GEMINI_UNKNOWN_ERROR",
            ErrorCode::SummaryCanceled => "SUMMARY_CANCELED",
            ErrorCode::FallbackOutputInvalid => "FALLBACK_OUTPUT_INVALID",
            ErrorCode::InsufficientCredits => "INSUFFICIENT_CREDITS",
        }
    }

    /// Extract the first `[CODE]` prefix from a message.
    ///
    /// Returns `None` when the message carries no bracketed code or the code
    /// is not part of the taxonomy.
    pub fn from_message(message: &str) -> Option<Self> {
        CODE_PREFIX
            .captures(message)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Transient provider errors that the queue is allowed to retry.
    pub fn is_queue_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::RequestFailed
                | ErrorCode::Timeout
                | ErrorCode::Unknown
                | ErrorCode::EmptyResponse
                | ErrorCode::OutputInvalid
        )
    }

    /// Format a message with this code as its prefix.
    pub fn tag(&self, message: impl AsRef<str>) -> String {
        format!("[{}] {}", self.as_str(), message.as_ref())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known error code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown error code: {0}")]
pub struct UnknownErrorCode(pub String);

impl FromStr for ErrorCode {
    type Err = UnknownErrorCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCode::ALL
            .iter()
            .copied()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| UnknownErrorCode(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_message_extracts_prefix() {
        assert_eq!(
            ErrorCode::from_message("[GEMINI_TIMEOUT] request timed out"),
            Some(ErrorCode::Timeout)
        );
        assert_eq!(
            ErrorCode::from_message("wrapped: [YOUTUBE_TRANSCRIPT_BLOCKED] consent page"),
            Some(ErrorCode::TranscriptBlocked)
        );
        assert_eq!(ErrorCode::from_message("no code here"), None);
        assert_eq!(ErrorCode::from_message("[NOT_A_CODE] nope"), None);
    }

    #[test]
    fn test_round_trip_through_str() {
        for code in ErrorCode::ALL {
            assert_eq!(code.as_str().parse::<ErrorCode>().unwrap(), code);
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn test_queue_retryable_allowlist() {
        let retryable: Vec<_> = ErrorCode::ALL
            .iter()
            .filter(|c| c.is_queue_retryable())
            .map(|c| c.as_str())
            .collect();
        assert_eq!(
            retryable,
            vec![
                "GEMINI_REQUEST_FAILED",
                "GEMINI_TIMEOUT",
                "GEMINI_EMPTY_RESPONSE",
                "GEMINI_OUTPUT_INVALID",
                "GEMINI_UNKNOWN_ERROR",
            ]
        );
        assert!(!ErrorCode::ConfigInvalid.is_queue_retryable());
        assert!(!ErrorCode::SummaryCanceled.is_queue_retryable());
    }

    #[test]
    fn test_tag() {
        assert_eq!(
            ErrorCode::SummaryCanceled.tag("canceled by user"),
            "[SUMMARY_CANCELED] canceled by user"
        );
    }
}
