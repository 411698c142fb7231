//! Text generation via the Gemini API.

mod client;
mod config;
mod error;

use async_trait::async_trait;

pub use client::GeminiClient;
pub use config::{GeminiConfig, GeminiLogLevel, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use error::{GenerationError, GenerationResult};

/// One generation call.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Overrides the configured candidate list when set
    pub model_candidates: Option<Vec<String>>,
    /// Media reference sent as a `fileData` part ahead of the prompt
    pub file_uri: Option<String>,
    pub file_mime_type: Option<String>,
    pub request_id: String,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            request_id: request_id.into(),
            ..Default::default()
        }
    }

    pub fn with_file(mut self, file_uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        self.file_uri = Some(file_uri.into());
        self.file_mime_type = Some(mime_type.into());
        self
    }
}

/// A backend that turns a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> GenerationResult<String>;
}

