//! Shared data models for the docsum backend.
//!
//! This crate provides Serde-serializable types for:
//! - Summary requests and their lifecycle status
//! - Queue jobs, claim snapshots and failure outcomes
//! - The machine-readable error code taxonomy
//! - YouTube URL normalization

pub mod error_code;
pub mod job;
pub mod summary;
pub mod youtube;

// Re-export common types
pub use error_code::ErrorCode;
pub use job::{ClaimedJob, FailOutcome, Job, JobId, JobStatus};
pub use summary::{
    derive_summary_title, extract_tldr, SourceType, SummaryId, SummaryListItem, SummaryRequest,
    SummaryStatus, CANCELED_MESSAGE,
};
pub use youtube::{normalize_youtube_url, NormalizedVideoUrl, YoutubeUrlError, YoutubeUrlResult};
