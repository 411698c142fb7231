//! Gemini runtime configuration.

use std::time::Duration;

use super::error::{GenerationError, GenerationResult};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_API_VERSION: &str = "v1";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Verbosity of per-request Gemini logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeminiLogLevel {
    #[default]
    Info,
    Debug,
}

/// Gemini client configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    /// Ordered failover list; never empty after `from_env`
    pub model_candidates: Vec<String>,
    pub api_version: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub log_level: GeminiLogLevel,
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            model_candidates: vec![DEFAULT_MODEL.to_string()],
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_millis(45_000),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(700),
            max_output_tokens: 1200,
            temperature: 0.2,
            top_p: 0.9,
            log_level: GeminiLogLevel::Info,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl GeminiConfig {
    /// Load configuration from environment variables.
    ///
    /// Malformed numeric values are rejected with `GEMINI_CONFIG_INVALID`
    /// instead of silently falling back to defaults.
    pub fn from_env() -> GenerationResult<Self> {
        let defaults = Self::default();

        let model = env_trimmed("GEMINI_MODEL").unwrap_or(defaults.model);
        let model_candidates = parse_model_candidates(env_trimmed("GEMINI_MODEL_CANDIDATES"), &model);

        Ok(Self {
            api_key: env_trimmed("GEMINI_API_KEY"),
            model_candidates,
            model,
            api_version: env_trimmed("GEMINI_API_VERSION").unwrap_or(defaults.api_version),
            timeout: Duration::from_millis(parse_positive("GEMINI_TIMEOUT_MS", 45_000)?),
            max_retries: parse_positive("GEMINI_MAX_RETRIES", 2)? as u32,
            retry_base_delay: Duration::from_millis(parse_positive(
                "GEMINI_RETRY_BASE_DELAY_MS",
                700,
            )?),
            max_output_tokens: parse_positive("GEMINI_MAX_OUTPUT_TOKENS", 1200)? as u32,
            temperature: parse_bounded("GEMINI_TEMPERATURE", defaults.temperature, 0.0, 2.0)?,
            top_p: parse_bounded("GEMINI_TOP_P", defaults.top_p, 0.0, 1.0)?,
            log_level: parse_log_level(env_trimmed("GEMINI_LOG_LEVEL"))?,
            base_url: env_trimmed("GEMINI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model_candidates<I, S>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.model_candidates = candidates.into_iter().map(Into::into).collect();
        if let Some(first) = self.model_candidates.first() {
            self.model = first.clone();
        }
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }

    /// Candidates to try, falling back to the primary model.
    pub fn candidates(&self) -> Vec<String> {
        if self.model_candidates.is_empty() {
            vec![self.model.clone()]
        } else {
            self.model_candidates.clone()
        }
    }

    /// `maxOutputTokens` for a model; thinking models get at least 8192.
    pub fn max_output_tokens_for(&self, model: &str) -> u32 {
        if model.to_lowercase().contains("gemini-2.5") {
            self.max_output_tokens.max(8192)
        } else {
            self.max_output_tokens
        }
    }
}

fn env_trimmed(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_positive(name: &str, default: u64) -> GenerationResult<u64> {
    match env_trimmed(name) {
        None => Ok(default),
        Some(raw) => raw.parse::<u64>().ok().filter(|n| *n > 0).ok_or_else(|| {
            GenerationError::config_invalid(format!("{name} must be a positive integer, got {raw:?}"))
        }),
    }
}

fn parse_bounded(name: &str, default: f32, min: f32, max: f32) -> GenerationResult<f32> {
    match env_trimmed(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite() && *v >= min && *v <= max)
            .ok_or_else(|| {
                GenerationError::config_invalid(format!(
                    "{name} must be a number between {min} and {max}, got {raw:?}"
                ))
            }),
    }
}

fn parse_log_level(raw: Option<String>) -> GenerationResult<GeminiLogLevel> {
    match raw.map(|v| v.to_lowercase()).as_deref() {
        None | Some("info") => Ok(GeminiLogLevel::Info),
        Some("debug") => Ok(GeminiLogLevel::Debug),
        Some(other) => Err(GenerationError::config_invalid(format!(
            "GEMINI_LOG_LEVEL must be info or debug, got {other:?}"
        ))),
    }
}

fn parse_model_candidates(raw: Option<String>, fallback: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    for entry in raw.as_deref().unwrap_or_default().split(',') {
        let entry = entry.trim();
        if !entry.is_empty() && !candidates.iter().any(|c| c == entry) {
            candidates.push(entry.to_string());
        }
    }
    if candidates.is_empty() {
        candidates.push(fallback.to_string());
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 12] = [
        "GEMINI_API_KEY",
        "GEMINI_MODEL",
        "GEMINI_MODEL_CANDIDATES",
        "GEMINI_API_VERSION",
        "GEMINI_TIMEOUT_MS",
        "GEMINI_MAX_RETRIES",
        "GEMINI_RETRY_BASE_DELAY_MS",
        "GEMINI_MAX_OUTPUT_TOKENS",
        "GEMINI_TEMPERATURE",
        "GEMINI_TOP_P",
        "GEMINI_LOG_LEVEL",
        "GEMINI_BASE_URL",
    ];

    fn clear_env() {
        for key in VARS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = GeminiConfig::from_env().unwrap();
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.model_candidates, vec!["gemini-2.0-flash"]);
        assert_eq!(config.api_version, "v1");
        assert_eq!(config.timeout, Duration::from_millis(45_000));
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.log_level, GeminiLogLevel::Info);
        assert!(config.api_key.is_none());
    }

    #[test]
    #[serial]
    fn test_candidates_deduplicated() {
        clear_env();
        std::env::set_var("GEMINI_MODEL_CANDIDATES", "gemini-2.5-flash, gemini-2.0-flash,gemini-2.5-flash,,");
        let config = GeminiConfig::from_env().unwrap();
        assert_eq!(config.model_candidates, vec!["gemini-2.5-flash", "gemini-2.0-flash"]);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_values_rejected() {
        clear_env();
        std::env::set_var("GEMINI_TIMEOUT_MS", "-5");
        assert!(matches!(GeminiConfig::from_env(), Err(GenerationError::ConfigInvalid(_))));
        clear_env();

        std::env::set_var("GEMINI_TOP_P", "1.5");
        assert!(matches!(GeminiConfig::from_env(), Err(GenerationError::ConfigInvalid(_))));
        clear_env();

        std::env::set_var("GEMINI_LOG_LEVEL", "trace");
        assert!(matches!(GeminiConfig::from_env(), Err(GenerationError::ConfigInvalid(_))));
        clear_env();
    }

    #[test]
    fn test_thinking_models_get_token_floor() {
        let config = GeminiConfig::default();
        assert_eq!(config.max_output_tokens_for("gemini-2.5-flash"), 8192);
        assert_eq!(config.max_output_tokens_for("gemini-2.0-flash"), 1200);
    }
}
