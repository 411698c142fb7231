//! Summary request definitions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error_code::ErrorCode;
use crate::youtube::normalize_youtube_url;

/// Error message written by user cancellation.
///
/// The `[SUMMARY_CANCELED]` prefix doubles as the marker the queue looks for
/// when deciding whether a failure was caused by the owner.
pub const CANCELED_MESSAGE: &str = "[SUMMARY_CANCELED] Summary was canceled by the user.";

const TITLE_MAX_CHARS: usize = 42;

/// Unique identifier for a summary request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SummaryId(pub String);

impl SummaryId {
    /// Generate a new random summary ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SummaryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SummaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of document submitted for summarization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Raw text pasted by the user
    Text,
    /// A YouTube video reference
    Video,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Text => "text",
            SourceType::Video => "video",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(SourceType::Text),
            // Rows written by older deployments used the platform name.
            "video" | "youtube" => Ok(SourceType::Video),
            other => Err(format!("unknown source type: {other}")),
        }
    }
}

/// Summary lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStatus {
    /// Waiting for a worker (initial state, and after a retry requeue)
    #[default]
    Pending,
    /// A worker owns the lease and is summarizing
    Processing,
    /// Summary text is available
    Completed,
    /// Terminal failure or user cancellation
    Failed,
}

impl SummaryStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStatus::Pending => "pending",
            SummaryStatus::Processing => "processing",
            SummaryStatus::Completed => "completed",
            SummaryStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, SummaryStatus::Completed | SummaryStatus::Failed)
    }
}

impl fmt::Display for SummaryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SummaryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SummaryStatus::Pending),
            "processing" => Ok(SummaryStatus::Processing),
            "completed" => Ok(SummaryStatus::Completed),
            "failed" => Ok(SummaryStatus::Failed),
            other => Err(format!("unknown summary status: {other}")),
        }
    }
}

/// A user-submitted document and its summarization state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest {
    pub id: SummaryId,
    /// Owner; `None` once the user row has been deleted
    pub user_id: Option<String>,
    pub source_type: SourceType,
    /// Input text, or the normalized video URL
    pub original_content: String,
    /// Present iff `status == Completed`
    pub summary_text: Option<String>,
    pub status: SummaryStatus,
    /// `[CODE]`-prefixed failure description
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SummaryRequest {
    /// Create a new pending summary request.
    pub fn new(
        user_id: Option<String>,
        source_type: SourceType,
        original_content: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SummaryId::new(),
            user_id,
            source_type,
            original_content: original_content.into(),
            summary_text: None,
            status: SummaryStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the current error message is the user cancellation marker.
    pub fn is_canceled(&self) -> bool {
        self.error_message
            .as_deref()
            .is_some_and(is_canceled_message)
    }

    /// Machine-readable code of the current error, if any.
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error_message.as_deref().and_then(ErrorCode::from_message)
    }

    /// Short display title for history listings.
    pub fn title(&self) -> String {
        derive_summary_title(&self.original_content)
    }

    pub fn list_item(&self) -> SummaryListItem {
        SummaryListItem {
            id: self.id.clone(),
            title: self.title(),
            status: self.status,
            created_at: self.created_at,
        }
    }
}

/// Compact row used by history listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SummaryListItem {
    pub id: SummaryId,
    pub title: String,
    pub status: SummaryStatus,
    pub created_at: DateTime<Utc>,
}

/// Check whether an error message carries the cancellation marker.
pub fn is_canceled_message(message: &str) -> bool {
    message.contains("[SUMMARY_CANCELED]")
}

fn truncate_title(value: &str) -> String {
    if value.chars().count() <= TITLE_MAX_CHARS {
        return value.to_string();
    }
    let head: String = value.chars().take(TITLE_MAX_CHARS).collect();
    format!("{}...", head.trim())
}

/// Derive a short title from submitted content.
///
/// Video references become `YouTube summary (<id>)`; other URLs become
/// `host/path`; anything else is the collapsed text, truncated.
pub fn derive_summary_title(content: &str) -> String {
    let normalized = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return "Untitled summary".to_string();
    }

    let lowered = normalized.to_ascii_lowercase();
    let looks_like_url = !normalized.contains(' ')
        && (lowered.starts_with("http://")
            || lowered.starts_with("https://")
            || lowered.starts_with("www."));
    if looks_like_url {
        if let Ok(video) = normalize_youtube_url(&normalized) {
            return format!("YouTube summary ({})", video.video_id);
        }
        let candidate = if lowered.starts_with("http") {
            normalized.clone()
        } else {
            format!("https://{normalized}")
        };
        if let Ok(parsed) = url::Url::parse(&candidate) {
            let host = parsed
                .host_str()
                .unwrap_or_default()
                .trim_start_matches("www.")
                .to_ascii_lowercase();
            let path = parsed.path().trim_end_matches('/');
            return truncate_title(&format!("{host}{path}"));
        }
    }

    truncate_title(&normalized)
}

/// Extract the TL;DR bullet points from a completed summary.
///
/// Returns at most three bullets. Summaries without a TL;DR section fall back
/// to their first sentences.
pub fn extract_tldr(summary_text: Option<&str>) -> Vec<String> {
    let Some(text) = summary_text else {
        return Vec::new();
    };

    let mut in_tldr = false;
    let mut bullets = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("tl;dr") {
            in_tldr = true;
            continue;
        }
        if !in_tldr {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("full summary") {
            break;
        }
        if let Some(rest) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("• "))
        {
            let rest = rest.trim();
            if !rest.is_empty() {
                bullets.push(rest.to_string());
            }
        }
        if bullets.len() == 3 {
            break;
        }
    }

    if !bullets.is_empty() {
        return bullets;
    }

    text.split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(3)
        .map(str::to_string)
        .collect()
}
