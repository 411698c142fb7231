//! Scheduler-facing summary worker entry point.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use docsum_worker::BatchReport;
use tracing::{error, info, warn};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::security::is_worker_authorized;
use crate::state::AppState;

/// Claim and process one batch. Served for both GET and POST.
///
/// The batch runs on its own task: a dropped request (client gone, request
/// timeout) must not abandon jobs that are already leased.
pub async fn run_summary_worker(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<BatchReport>> {
    if !is_worker_authorized(state.config.internal_worker_secret.as_deref(), &headers) {
        warn!("Rejected summary worker request with missing or wrong secret");
        metrics::record_worker_auth_failure();
        return Err(ApiError::unauthorized("Unauthorized worker request"));
    }

    let executor = Arc::clone(&state.executor);
    let batch = tokio::spawn(async move { executor.run_batch().await });

    match batch.await.map_err(|e| ApiError::internal(format!("summary batch task failed: {e}")))? {
        Ok(report) => {
            metrics::record_worker_batch("ok");
            info!(
                picked = report.picked,
                completed = report.completed,
                failed = report.failed,
                avg_duration_ms = report.avg_duration_ms,
                "Summary worker batch finished"
            );
            Ok(Json(report))
        }
        Err(e) => {
            metrics::record_worker_batch("error");
            error!(code = e.code(), error = %e, "Summary worker batch failed");
            Err(e.into())
        }
    }
}
