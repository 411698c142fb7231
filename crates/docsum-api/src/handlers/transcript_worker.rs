//! Remote transcript worker: runs `yt-dlp` on behalf of callers whose own
//! network is blocked by YouTube.

use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use docsum_models::{normalize_youtube_url, ErrorCode};
use docsum_worker::transcript::remote::{
    clamp_max_chars, normalize_preferred_languages, RemoteTranscriptFailure,
    RemoteTranscriptRequest, RemoteTranscriptResponse, WORKER_KEY_HEADER,
};
use docsum_worker::transcript::ytdlp::sub_langs_for;
use docsum_worker::transcript::{clip_text, TranscriptError, UNKNOWN_TITLE};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::security::secrets_match;
use crate::state::TranscriptWorkerState;

pub const PROVIDER: &str = "yt-dlp";

/// Failure body with the status it is sent with.
#[derive(Debug)]
pub struct TranscriptFailure {
    status: StatusCode,
    body: RemoteTranscriptFailure,
}

impl TranscriptFailure {
    fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            status,
            body: RemoteTranscriptFailure {
                code: code.as_str().to_string(),
                message: message.into(),
                retryable,
            },
        }
    }

    /// Status and retry hint for an extractor run that produced nothing.
    fn from_extractor(error: &TranscriptError) -> Self {
        let (status, retryable) = match error {
            TranscriptError::WorkerTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, true),
            TranscriptError::Blocked(_) => (StatusCode::BAD_GATEWAY, false),
            TranscriptError::Unavailable(_) => (StatusCode::UNPROCESSABLE_ENTITY, false),
            TranscriptError::FetchFailed(_) => (StatusCode::BAD_GATEWAY, true),
            _ => (StatusCode::SERVICE_UNAVAILABLE, true),
        };
        Self::new(status, error.code(), error.message(), retryable)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for TranscriptFailure {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Deserialize)]
struct OEmbed {
    title: Option<String>,
}

/// Title from oEmbed; any failure yields the unknown-title placeholder.
async fn fetch_title(http: &Client, base_url: &str, timeout: Duration, video_url: &str) -> String {
    let url = format!(
        "{}/oembed?format=json&url={}",
        base_url,
        urlencoding::encode(video_url)
    );

    let title = match http.get(&url).timeout(timeout).send().await {
        Ok(response) if response.status().is_success() => response
            .json::<OEmbed>()
            .await
            .ok()
            .and_then(|o| o.title),
        Ok(response) => {
            info!(status = response.status().as_u16(), "oEmbed title lookup not ok");
            None
        }
        Err(e) => {
            info!(error = %e, "oEmbed title lookup failed");
            None
        }
    };

    title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string())
}

async fn handle(
    state: &TranscriptWorkerState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<RemoteTranscriptResponse, TranscriptFailure> {
    let Some(expected) = state.config.key.as_deref() else {
        return Err(TranscriptFailure::new(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::WorkerUnavailable,
            "TRANSCRIPT_WORKER_KEY is not configured",
            true,
        ));
    };

    let provided = headers
        .get(WORKER_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !secrets_match(expected, provided) {
        return Err(TranscriptFailure::new(
            StatusCode::UNAUTHORIZED,
            ErrorCode::WorkerUnavailable,
            "Unauthorized transcript worker request",
            false,
        ));
    }

    let request: RemoteTranscriptRequest = serde_json::from_slice(body).map_err(|e| {
        TranscriptFailure::new(
            StatusCode::BAD_REQUEST,
            ErrorCode::UrlInvalid,
            format!("Invalid request body: {e}"),
            false,
        )
    })?;

    let video = normalize_youtube_url(&request.youtube_url).map_err(|e| {
        TranscriptFailure::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::UrlInvalid,
            format!("Not a valid YouTube URL: {e}"),
            false,
        )
    })?;

    let started = Instant::now();
    let request_id = request
        .request_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let max_chars = clamp_max_chars(request.max_chars);
    let sub_langs = if state.config.sub_langs_pinned {
        state.config.ytdlp.sub_langs.clone()
    } else {
        sub_langs_for(&normalize_preferred_languages(
            request.preferred_languages.as_deref(),
        ))
    };

    info!(
        request_id = %request_id,
        video_id = %video.video_id,
        sub_langs = %sub_langs,
        "Transcript request accepted"
    );

    let run = state.extractor.run(&video, &sub_langs).await.map_err(|e| {
        warn!(request_id = %request_id, error = %e, "yt-dlp could not run");
        TranscriptFailure::new(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::WorkerUnavailable,
            format!("transcript worker runtime error: {e}"),
            true,
        )
    })?;

    let Some(parsed) = run.subtitles.clone() else {
        let failure = TranscriptFailure::from_extractor(&run.failure());
        warn!(
            request_id = %request_id,
            video_id = %video.video_id,
            code = %failure.body.code,
            exit_code = ?run.exit_code,
            vtt_count = run.vtt_count,
            "yt-dlp produced no transcript"
        );
        return Err(failure);
    };

    let title = fetch_title(
        &state.http,
        &state.config.oembed_base_url,
        state.config.oembed_timeout,
        &video.url,
    )
    .await;

    Ok(RemoteTranscriptResponse {
        transcript: clip_text(&parsed.transcript, max_chars),
        video_id: video.video_id,
        title: Some(title),
        language_code: parsed.language_code,
        provider: PROVIDER.to_string(),
        duration_ms: started.elapsed().as_millis() as u64,
        request_id: Some(request_id),
    })
}

/// `POST /v1/youtube-transcript`
pub async fn youtube_transcript(
    State(state): State<TranscriptWorkerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    match handle(&state, &headers, &body).await {
        Ok(payload) => {
            metrics::record_transcript_request("OK", started.elapsed().as_secs_f64());
            info!(
                video_id = %payload.video_id,
                language_code = %payload.language_code,
                duration_ms = payload.duration_ms,
                "Transcript served"
            );
            Json(payload).into_response()
        }
        Err(failure) => {
            metrics::record_transcript_request(&failure.body.code, started.elapsed().as_secs_f64());
            failure.into_response()
        }
    }
}

/// `GET /healthz`
pub async fn transcript_health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extractor_failure_statuses() {
        let cases = [
            (TranscriptError::worker_timeout("t"), StatusCode::GATEWAY_TIMEOUT, true),
            (TranscriptError::blocked("b"), StatusCode::BAD_GATEWAY, false),
            (TranscriptError::unavailable("u"), StatusCode::UNPROCESSABLE_ENTITY, false),
            (TranscriptError::fetch_failed("f"), StatusCode::BAD_GATEWAY, true),
        ];
        for (error, status, retryable) in cases {
            let failure = TranscriptFailure::from_extractor(&error);
            assert_eq!(failure.status(), status);
            assert_eq!(failure.body.retryable, retryable);
            assert_eq!(failure.body.code, error.code().as_str());
        }
    }
}
