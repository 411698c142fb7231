//! Client for the remote transcript worker, plus the wire types it shares
//! with the server side.

use std::time::Duration;

use async_trait::async_trait;
use docsum_models::{ErrorCode, NormalizedVideoUrl};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::{TranscriptError, TranscriptResult};
use super::{ExtractedSubtitles, SubtitleExtractor};

pub const WORKER_KEY_HEADER: &str = "x-transcript-worker-key";
pub const TRANSCRIPT_PATH: &str = "/v1/youtube-transcript";

pub const DEFAULT_MAX_CHARS: usize = 14_000;
pub const MIN_MAX_CHARS: usize = 1_000;
pub const MAX_MAX_CHARS: usize = 50_000;

pub const DEFAULT_PREFERRED_LANGUAGES: [&str; 3] = ["ko", "en", "ja"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTranscriptRequest {
    pub youtube_url: String,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub preferred_languages: Option<Vec<String>>,
    #[serde(default)]
    pub max_chars: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTranscriptResponse {
    pub transcript: String,
    pub video_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub language_code: String,
    pub provider: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTranscriptFailure {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub retryable: bool,
}

/// Lowercase and deduplicate; empty input gets the default preference.
pub fn normalize_preferred_languages(languages: Option<&[String]>) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for lang in languages.unwrap_or_default() {
        let lang = lang.trim().to_lowercase();
        if !lang.is_empty() && !normalized.contains(&lang) {
            normalized.push(lang);
        }
    }
    if normalized.is_empty() {
        return DEFAULT_PREFERRED_LANGUAGES
            .iter()
            .map(|l| l.to_string())
            .collect();
    }
    normalized
}

pub fn clamp_max_chars(max_chars: Option<usize>) -> usize {
    max_chars
        .unwrap_or(DEFAULT_MAX_CHARS)
        .clamp(MIN_MAX_CHARS, MAX_MAX_CHARS)
}

#[derive(Debug, Clone)]
pub struct RemoteTranscriptConfig {
    pub url: Option<String>,
    pub key: Option<String>,
    pub timeout: Duration,
}

impl Default for RemoteTranscriptConfig {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            timeout: Duration::from_secs(45),
        }
    }
}

impl RemoteTranscriptConfig {
    pub fn from_env() -> Self {
        let non_empty = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            url: non_empty("TRANSCRIPT_WORKER_URL"),
            key: non_empty("TRANSCRIPT_WORKER_KEY"),
            timeout: std::env::var("TRANSCRIPT_WORKER_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or_else(|| Self::default().timeout),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    pub fn endpoint(&self) -> Option<String> {
        self.url
            .as_deref()
            .map(|url| format!("{}{}", url.trim_end_matches('/'), TRANSCRIPT_PATH))
    }
}

/// Calls a remote transcript worker instead of running `yt-dlp` locally.
#[derive(Debug, Clone)]
pub struct RemoteTranscriptClient {
    http: Client,
    config: RemoteTranscriptConfig,
    preferred_languages: Vec<String>,
    max_chars: usize,
}

impl RemoteTranscriptClient {
    pub fn new(config: RemoteTranscriptConfig) -> Self {
        Self {
            http: Client::new(),
            config,
            preferred_languages: normalize_preferred_languages(None),
            max_chars: DEFAULT_MAX_CHARS,
        }
    }

    pub fn with_preferred_languages(mut self, languages: &[String]) -> Self {
        self.preferred_languages = normalize_preferred_languages(Some(languages));
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = clamp_max_chars(Some(max_chars));
        self
    }

    pub async fn fetch(
        &self,
        youtube_url: &str,
        request_id: Option<&str>,
    ) -> TranscriptResult<RemoteTranscriptResponse> {
        let (Some(endpoint), Some(key)) = (self.config.endpoint(), self.config.key.as_deref())
        else {
            return Err(TranscriptError::worker_unavailable(
                "Transcript worker URL or key is not configured",
            ));
        };

        let body = RemoteTranscriptRequest {
            youtube_url: youtube_url.to_string(),
            request_id: request_id.map(str::to_string),
            preferred_languages: Some(self.preferred_languages.clone()),
            max_chars: Some(self.max_chars),
        };

        let response = self
            .http
            .post(&endpoint)
            .timeout(self.config.timeout)
            .header(WORKER_KEY_HEADER, key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TranscriptError::worker_timeout(format!(
                        "Transcript worker timed out (endpoint: {endpoint})"
                    ))
                } else {
                    TranscriptError::worker_unavailable(format!(
                        "Transcript worker request failed: {e} (endpoint: {endpoint})"
                    ))
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TranscriptError::worker_timeout(format!(
                    "Transcript worker timed out (endpoint: {endpoint})"
                ))
            } else {
                TranscriptError::worker_unavailable(format!(
                    "Transcript worker body unreadable: {e} (endpoint: {endpoint})"
                ))
            }
        })?;

        if !status.is_success() {
            let mapped = serde_json::from_str::<RemoteTranscriptFailure>(&text)
                .ok()
                .and_then(|failure| {
                    let code = failure.code.parse::<ErrorCode>().ok()?;
                    TranscriptError::from_code(code, failure.message)
                });
            return Err(mapped.unwrap_or_else(|| {
                warn!(status = status.as_u16(), endpoint = %endpoint, "Transcript worker returned an unrecognized error");
                TranscriptError::worker_unavailable(format!(
                    "Transcript worker returned {} (endpoint: {endpoint})",
                    status.as_u16()
                ))
            }));
        }

        let payload: RemoteTranscriptResponse = serde_json::from_str(&text).map_err(|_| {
            TranscriptError::worker_unavailable(format!(
                "Transcript worker returned an invalid payload (endpoint: {endpoint})"
            ))
        })?;

        if payload.transcript.trim().is_empty()
            || payload.video_id.trim().is_empty()
            || payload.language_code.trim().is_empty()
            || payload.provider.trim().is_empty()
        {
            return Err(TranscriptError::worker_unavailable(format!(
                "Transcript worker returned an incomplete payload (endpoint: {endpoint})"
            )));
        }

        info!(
            video_id = %payload.video_id,
            provider = %payload.provider,
            duration_ms = payload.duration_ms,
            "Transcript worker returned subtitles"
        );
        Ok(payload)
    }
}

#[async_trait]
impl SubtitleExtractor for RemoteTranscriptClient {
    async fn extract(&self, video: &NormalizedVideoUrl) -> TranscriptResult<ExtractedSubtitles> {
        let payload = self.fetch(&video.url, None).await?;
        Ok(ExtractedSubtitles {
            transcript: payload.transcript,
            language_code: Some(payload.language_code),
            title: payload
                .title
                .filter(|t| !t.trim().is_empty() && t != "(unknown)"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_preferred_languages() {
        let input = vec!["EN".to_string(), " ko ".to_string(), "en".to_string(), String::new()];
        assert_eq!(normalize_preferred_languages(Some(&input)), vec!["en", "ko"]);
        assert_eq!(normalize_preferred_languages(None), vec!["ko", "en", "ja"]);
    }

    #[test]
    fn test_clamp_max_chars() {
        assert_eq!(clamp_max_chars(None), 14_000);
        assert_eq!(clamp_max_chars(Some(10)), 1_000);
        assert_eq!(clamp_max_chars(Some(90_000)), 50_000);
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = RemoteTranscriptConfig {
            url: Some("https://worker.test/".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.endpoint().as_deref(),
            Some("https://worker.test/v1/youtube-transcript")
        );
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let client = RemoteTranscriptClient::new(RemoteTranscriptConfig {
            url: Some("https://worker.test".to_string()),
            ..Default::default()
        });
        let err = client.fetch("https://youtu.be/abcdefghijk", None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::WorkerUnavailable);
    }
}
