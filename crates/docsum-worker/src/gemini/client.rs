//! Gemini REST client with model failover.
//!
//! Each candidate model gets up to `max_retries + 1` attempts with
//! exponential backoff. Model-selection errors (unknown model, unsupported
//! API version) skip straight to the next candidate without spending retry
//! budget.

use std::sync::{LazyLock, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::config::{GeminiConfig, GeminiLogLevel};
use super::error::{GenerationError, GenerationResult};
use super::{GenerationRequest, TextGenerator};
use crate::metrics;
use crate::retry::RetryConfig;

const MAX_BACKOFF: Duration = Duration::from_secs(12);
const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

static RETRYABLE_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)rate limit|too many requests|resource exhausted|resource_exhausted|overloaded|temporar(?:y|ily) unavailable")
        .expect("valid retryable message regex")
});

struct CachedHttp {
    api_key: String,
    api_version: String,
    base_url: String,
    client: Client,
}

static SHARED_HTTP: LazyLock<Mutex<Option<CachedHttp>>> = LazyLock::new(|| Mutex::new(None));

/// Process-wide HTTP client, rebuilt only when the key, API version or base
/// URL changes.
fn shared_http(config: &GeminiConfig, api_key: &str) -> Client {
    let mut cached = SHARED_HTTP.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(entry) = cached.as_ref() {
        if entry.api_key == api_key
            && entry.api_version == config.api_version
            && entry.base_url == config.base_url
        {
            return entry.client.clone();
        }
    }

    debug!(api_version = %config.api_version, base_url = %config.base_url, "Building Gemini HTTP client");
    let client = Client::new();
    *cached = Some(CachedHttp {
        api_key: api_key.to_string(),
        api_version: config.api_version.clone(),
        base_url: config.base_url.clone(),
        client: client.clone(),
    });
    client
}

/// Gemini API request.
#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    File {
        #[serde(rename = "fileData")]
        file_data: FileData<'a>,
    },
    Text {
        text: &'a str,
    },
}

#[derive(Debug, Serialize)]
struct FileData<'a> {
    #[serde(rename = "fileUri")]
    file_uri: &'a str,
    #[serde(rename = "mimeType")]
    mime_type: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    temperature: f32,
    #[serde(rename = "topP")]
    top_p: f32,
}

/// Gemini API response.
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Outcome of one HTTP attempt against one model.
#[derive(Debug)]
enum AttemptFailure {
    Timeout(String),
    Transport(String),
    Status { status: u16, message: String },
    Empty,
    Undecodable(String),
}

impl AttemptFailure {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptFailure::Timeout(_) => true,
            AttemptFailure::Transport(message) => RETRYABLE_MESSAGE.is_match(message),
            AttemptFailure::Status { status, message } => {
                RETRYABLE_STATUSES.contains(status) || RETRYABLE_MESSAGE.is_match(message)
            }
            AttemptFailure::Empty | AttemptFailure::Undecodable(_) => false,
        }
    }

    fn is_model_selection(&self) -> bool {
        match self {
            AttemptFailure::Status { status: 404, .. } => true,
            AttemptFailure::Status { status: 400, message } => {
                let lowered = message.to_lowercase();
                lowered.contains("not found for api version")
                    || lowered.contains("not supported for generatecontent")
                    || (lowered.contains("model") && lowered.contains("not found"))
            }
            _ => false,
        }
    }

    fn status(&self) -> Option<u16> {
        match self {
            AttemptFailure::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            AttemptFailure::Timeout(_) => "timeout",
            AttemptFailure::Transport(_) => "transport_error",
            AttemptFailure::Status { .. } => "http_error",
            AttemptFailure::Empty => "empty",
            AttemptFailure::Undecodable(_) => "undecodable",
        }
    }

    fn into_error(self, model: &str) -> GenerationError {
        match self {
            AttemptFailure::Timeout(message) => {
                GenerationError::timeout(format!("Gemini request to {model} timed out: {message}"))
            }
            AttemptFailure::Transport(message) => {
                GenerationError::request_failed(format!("Gemini request to {model} failed: {message}"))
            }
            AttemptFailure::Status { status, message } => GenerationError::request_failed(format!(
                "Gemini returned {status} for {model}: {}",
                head(&message, 240)
            )),
            AttemptFailure::Empty => {
                GenerationError::empty_response(format!("Gemini response from {model} had no text"))
            }
            AttemptFailure::Undecodable(message) => GenerationError::unknown(format!(
                "Failed to parse Gemini response from {model}: {message}"
            )),
        }
    }
}

fn head(value: &str, max_chars: usize) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(max_chars)
        .collect()
}

/// Gemini API client.
pub struct GeminiClient {
    config: GeminiConfig,
    backoff: RetryConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        let backoff = RetryConfig::new("gemini_generate")
            .with_max_retries(config.max_retries)
            .with_base_delay(config.retry_base_delay)
            .with_max_delay(MAX_BACKOFF);
        Self { config, backoff }
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn verbose(&self) -> bool {
        self.config.log_level == GeminiLogLevel::Debug
    }

    /// Call `generateContent` once for one model.
    async fn call_model(
        &self,
        http: &Client,
        api_key: &str,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<String, AttemptFailure> {
        let url = format!(
            "{}/{}/models/{}:generateContent",
            self.config.base_url, self.config.api_version, model
        );

        let mut parts = Vec::with_capacity(2);
        if let Some(file_uri) = request.file_uri.as_deref() {
            parts.push(Part::File {
                file_data: FileData {
                    file_uri,
                    mime_type: request.file_mime_type.as_deref().unwrap_or("video/*"),
                },
            });
        }
        parts.push(Part::Text {
            text: &request.prompt,
        });

        let body = GeminiRequest {
            contents: vec![Content {
                role: "user",
                parts,
            }],
            generation_config: GenerationConfig {
                max_output_tokens: self.config.max_output_tokens_for(model),
                temperature: self.config.temperature,
                top_p: self.config.top_p,
            },
        };

        let response = http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AttemptFailure::Timeout(e.to_string())
                } else {
                    AttemptFailure::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let raw = response.text().await.map_err(|e| {
            if e.is_timeout() {
                AttemptFailure::Timeout(e.to_string())
            } else {
                AttemptFailure::Transport(e.to_string())
            }
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&raw)
                .map(|envelope| envelope.error.message)
                .unwrap_or(raw);
            return Err(AttemptFailure::Status {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GeminiResponse =
            serde_json::from_str(&raw).map_err(|e| AttemptFailure::Undecodable(e.to_string()))?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let text = text.trim();
        if text.is_empty() {
            return Err(AttemptFailure::Empty);
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, request: GenerationRequest) -> GenerationResult<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| GenerationError::missing_key("GEMINI_API_KEY is not set"))?;

        let candidates = request
            .model_candidates
            .clone()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| self.config.candidates());
        let http = shared_http(&self.config, api_key);
        let last_index = candidates.len().saturating_sub(1);

        for (index, model) in candidates.iter().enumerate() {
            let has_next = index < last_index;
            let mut attempt = 0u32;

            loop {
                let started = Instant::now();
                if self.verbose() {
                    debug!(
                        request_id = %request.request_id,
                        model = %model,
                        model_index = index + 1,
                        candidate_count = candidates.len(),
                        attempt = attempt + 1,
                        "Gemini request started"
                    );
                }

                let failure = match self.call_model(&http, api_key, model, &request).await {
                    Ok(text) => {
                        metrics::record_gemini_request(model, "success");
                        info!(
                            request_id = %request.request_id,
                            model = %model,
                            attempt = attempt + 1,
                            duration_ms = started.elapsed().as_millis() as u64,
                            "Gemini request completed"
                        );
                        return Ok(text);
                    }
                    Err(failure) => failure,
                };

                metrics::record_gemini_request(model, failure.label());
                let duration_ms = started.elapsed().as_millis() as u64;
                let retryable = failure.is_retryable();

                if retryable && attempt < self.backoff.max_retries {
                    let delay = self.backoff.delay_for_attempt(attempt);
                    info!(
                        request_id = %request.request_id,
                        model = %model,
                        attempt = attempt + 1,
                        status = ?failure.status(),
                        retry_delay_ms = delay.as_millis() as u64,
                        duration_ms,
                        "Gemini request retry scheduled"
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                    continue;
                }

                if failure.is_model_selection() {
                    if has_next {
                        info!(
                            request_id = %request.request_id,
                            model = %model,
                            status = ?failure.status(),
                            "Switching model candidate (model unavailable)"
                        );
                        break;
                    }
                    error!(request_id = %request.request_id, model = %model, "Gemini model unavailable");
                    return Err(GenerationError::config_invalid(format!(
                        "Gemini model {model} is not available; check GEMINI_MODEL and GEMINI_MODEL_CANDIDATES"
                    )));
                }

                if retryable && has_next {
                    warn!(
                        request_id = %request.request_id,
                        model = %model,
                        status = ?failure.status(),
                        "Switching model candidate after exhausting retries"
                    );
                    break;
                }

                let err = failure.into_error(model);
                error!(
                    request_id = %request.request_id,
                    model = %model,
                    attempt = attempt + 1,
                    duration_ms,
                    error = %err,
                    "Gemini request failed"
                );
                return Err(err);
            }
        }

        Err(GenerationError::request_failed(
            "No Gemini model candidate produced a response",
        ))
    }
}
