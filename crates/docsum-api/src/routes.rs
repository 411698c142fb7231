//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use docsum_worker::transcript::remote::TRANSCRIPT_PATH;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::handlers::{
    health, ready, run_summary_worker, transcript_health, youtube_transcript,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging, security_headers};
use crate::state::{AppState, TranscriptWorkerState};

/// Transcript request bodies are tiny.
const TRANSCRIPT_BODY_LIMIT: usize = 64 * 1024;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let internal_routes = Router::new().route(
        "/internal/summary-worker",
        get(run_summary_worker).post(run_summary_worker),
    );

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(internal_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(TimeoutLayer::new(state.config.request_timeout))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

/// Router for the standalone remote transcript worker.
pub fn transcript_worker_router(state: TranscriptWorkerState) -> Router {
    Router::new()
        .route(TRANSCRIPT_PATH, post(youtube_transcript))
        .route("/healthz", get(transcript_health))
        .layer(RequestBodyLimitLayer::new(TRANSCRIPT_BODY_LIMIT))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_logging))
        .with_state(state)
}
