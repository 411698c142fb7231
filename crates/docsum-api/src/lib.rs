//! Axum HTTP surface.
//!
//! This crate provides:
//! - The scheduler-facing summary worker entry point
//! - Liveness/readiness probes and Prometheus metrics
//! - The standalone remote transcript worker

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod state;

pub use config::{ApiConfig, TranscriptWorkerConfig};
pub use error::{ApiError, ApiResult};
pub use routes::{create_router, transcript_worker_router};
pub use state::{AppState, TranscriptWorkerState};
