//! Liveness and readiness probes.

use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct Liveness {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

/// Answers as long as the process is serving requests.
pub async fn health() -> Json<Liveness> {
    Json(Liveness {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
pub struct Readiness {
    pub status: &'static str,
    pub checks: StoreChecks,
}

#[derive(Serialize)]
pub struct StoreChecks {
    pub store: StoreProbe,
}

#[derive(Serialize)]
pub struct StoreProbe {
    pub status: &'static str,
    pub backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 200 when the store answers a ping, 503 with the failure otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let backend = if state.in_memory { "memory" } else { "postgres" };
    let started = Instant::now();
    let ping = state.store.ping().await;

    let probe = StoreProbe {
        status: if ping.is_ok() { "ok" } else { "error" },
        backend,
        latency_ms: ping.as_ref().ok().map(|_| started.elapsed().as_millis() as u64),
        error: ping.err().map(|e| e.to_string()),
    };
    let status = if probe.error.is_none() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = Readiness {
        status: if status.is_success() { "ready" } else { "degraded" },
        checks: StoreChecks { store: probe },
    };
    (status, Json(body))
}
