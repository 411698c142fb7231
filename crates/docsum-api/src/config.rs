//! API configuration.

use std::time::Duration;

use docsum_worker::transcript::remote::MAX_MAX_CHARS;
use docsum_worker::transcript::YtDlpConfig;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Request timeout
    pub request_timeout: Duration,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Shared secret for the summary worker entry point; unauthenticated when unset
    pub internal_worker_secret: Option<String>,
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(300),
            max_body_size: 1024 * 1024, // 1MB
            environment: "development".to_string(),
            internal_worker_secret: None,
            metrics_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            request_timeout: std::env::var("REQUEST_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            internal_worker_secret: std::env::var("INTERNAL_WORKER_SECRET")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    pub fn with_worker_secret(mut self, secret: impl Into<String>) -> Self {
        self.internal_worker_secret = Some(secret.into());
        self
    }
}

/// Remote transcript worker configuration.
#[derive(Debug, Clone)]
pub struct TranscriptWorkerConfig {
    pub port: u16,
    /// Required by every transcript request; requests fail with 503 when unset
    pub key: Option<String>,
    /// Base URL for the oEmbed title lookup
    pub oembed_base_url: String,
    pub oembed_timeout: Duration,
    pub ytdlp: YtDlpConfig,
    /// Whether `YTDLP_SUB_LANGS` overrides the per-request preference
    pub sub_langs_pinned: bool,
}

impl Default for TranscriptWorkerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            key: None,
            oembed_base_url: "https://www.youtube.com".to_string(),
            oembed_timeout: Duration::from_secs(5),
            ytdlp: YtDlpConfig {
                max_chars: MAX_MAX_CHARS,
                ..Default::default()
            },
            sub_langs_pinned: false,
        }
    }
}

impl TranscriptWorkerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut ytdlp = YtDlpConfig::from_env();
        // Per-request maxChars clips afterwards.
        ytdlp.max_chars = MAX_MAX_CHARS;

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            key: std::env::var("TRANSCRIPT_WORKER_KEY")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            oembed_base_url: defaults.oembed_base_url,
            oembed_timeout: defaults.oembed_timeout,
            ytdlp,
            sub_langs_pinned: std::env::var("YTDLP_SUB_LANGS")
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_oembed_base_url(mut self, url: impl Into<String>) -> Self {
        self.oembed_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_ytdlp(mut self, ytdlp: YtDlpConfig) -> Self {
        self.ytdlp = ytdlp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_worker_secret_trimmed_and_optional() {
        std::env::set_var("INTERNAL_WORKER_SECRET", "  s3cret ");
        assert_eq!(ApiConfig::from_env().internal_worker_secret.as_deref(), Some("s3cret"));

        std::env::set_var("INTERNAL_WORKER_SECRET", "   ");
        assert!(ApiConfig::from_env().internal_worker_secret.is_none());
        std::env::remove_var("INTERNAL_WORKER_SECRET");
    }

    #[test]
    #[serial]
    fn test_transcript_worker_defaults() {
        std::env::remove_var("PORT");
        std::env::remove_var("TRANSCRIPT_WORKER_KEY");
        std::env::remove_var("YTDLP_SUB_LANGS");
        let config = TranscriptWorkerConfig::from_env();
        assert_eq!(config.port, 8080);
        assert!(config.key.is_none());
        assert!(!config.sub_langs_pinned);
        assert_eq!(config.ytdlp.max_chars, MAX_MAX_CHARS);
    }
}
