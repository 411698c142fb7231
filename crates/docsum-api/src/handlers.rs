//! HTTP handlers.

pub mod health;
pub mod summary_worker;
pub mod transcript_worker;

pub use health::{health, ready};
pub use summary_worker::run_summary_worker;
pub use transcript_worker::{transcript_health, youtube_transcript};
