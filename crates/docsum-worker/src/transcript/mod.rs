//! YouTube transcript acquisition.
//!
//! The acquirer runs a fixed cascade:
//! 1. Player metadata (innertube, then the watch page).
//! 2. Caption tracks ranked by language, each tried over several URL variants.
//! 3. An out-of-process extractor (`yt-dlp` or a remote transcript worker),
//!    only when YouTube blocked the in-process requests.

mod captions;
mod error;
mod parse;
mod player;
pub mod remote;
pub mod ytdlp;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docsum_models::{normalize_youtube_url, NormalizedVideoUrl};
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::metrics;

pub use captions::{candidate_urls, rank_tracks, track_score};
pub use error::{TranscriptError, TranscriptResult};
pub use parse::{clip_text, parse_caption_body, parse_json3, parse_vtt, parse_xml};
pub use player::{extract_player_response, is_blocked_watch_page, CaptionTrack, PlayerResponse};
pub use remote::{RemoteTranscriptClient, RemoteTranscriptConfig};
pub use ytdlp::{YtDlpConfig, YtDlpExtractor};

pub const UNKNOWN_TITLE: &str = "(unknown)";

/// Languages probed when a video exposes no caption tracks.
const NO_TRACK_LANGUAGES: [&str; 3] = ["ko", "en", "ja"];

/// Where a transcript came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranscriptProvider {
    Captions,
    Extractor,
}

impl TranscriptProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptProvider::Captions => "captions",
            TranscriptProvider::Extractor => "extractor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoTranscript {
    pub transcript: String,
    pub video_id: String,
    pub title: String,
    pub language_code: String,
    pub normalized_url: String,
    pub provider: TranscriptProvider,
}

/// Subtitles produced out of process.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedSubtitles {
    pub transcript: String,
    pub language_code: Option<String>,
    pub title: Option<String>,
}

#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn acquire(&self, video_url: &str) -> TranscriptResult<VideoTranscript>;
}

/// Last-resort subtitle source used when YouTube blocks direct requests.
#[async_trait]
pub trait SubtitleExtractor: Send + Sync {
    async fn extract(&self, video: &NormalizedVideoUrl) -> TranscriptResult<ExtractedSubtitles>;
}

#[derive(Debug, Clone)]
pub struct TranscriptConfig {
    pub base_url: String,
    pub max_chars: usize,
    pub watch_timeout: Duration,
    pub fetch_timeout: Duration,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.youtube.com".to_string(),
            max_chars: 14_000,
            watch_timeout: Duration::from_secs(12),
            fetch_timeout: Duration::from_secs(12),
        }
    }
}

impl TranscriptConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let millis = |name: &str, default: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            base_url: std::env::var("YOUTUBE_BASE_URL")
                .ok()
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.base_url),
            max_chars: std::env::var("TRANSCRIPT_MAX_CHARS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_chars),
            watch_timeout: millis("TRANSCRIPT_WATCH_TIMEOUT_MS", defaults.watch_timeout),
            fetch_timeout: millis("TRANSCRIPT_FETCH_TIMEOUT_MS", defaults.fetch_timeout),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }
}

/// First blocked error, else first unavailable error, else the last error.
#[derive(Debug, Default)]
struct AttemptErrors {
    blocked: Option<TranscriptError>,
    unavailable: Option<TranscriptError>,
    last: Option<TranscriptError>,
}

impl AttemptErrors {
    fn record(&mut self, error: TranscriptError) {
        match &error {
            TranscriptError::Blocked(_) if self.blocked.is_none() => {
                self.blocked = Some(error.clone())
            }
            TranscriptError::Unavailable(_) if self.unavailable.is_none() => {
                self.unavailable = Some(error.clone())
            }
            _ => {}
        }
        self.last = Some(error);
    }

    fn saw_blocked(&self) -> bool {
        self.blocked.is_some()
    }

    fn into_error(self) -> TranscriptError {
        self.blocked
            .or(self.unavailable)
            .or(self.last)
            .unwrap_or_else(|| TranscriptError::fetch_failed("Could not load the YouTube transcript"))
    }
}

/// Transcript acquirer for YouTube videos.
#[derive(Clone)]
pub struct TranscriptAcquirer {
    http: Client,
    config: TranscriptConfig,
    extractor: Option<Arc<dyn SubtitleExtractor>>,
}

impl TranscriptAcquirer {
    pub fn new(config: TranscriptConfig) -> Self {
        Self {
            http: Client::new(),
            config,
            extractor: None,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn SubtitleExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Build from environment. A configured remote worker replaces local `yt-dlp`.
    pub fn from_env() -> Self {
        let config = TranscriptConfig::from_env();
        let remote = RemoteTranscriptConfig::from_env();
        let acquirer = Self::new(config.clone());

        if remote.is_configured() {
            info!("Transcript extractor: remote worker");
            return acquirer.with_extractor(Arc::new(
                RemoteTranscriptClient::new(remote).with_max_chars(config.max_chars),
            ));
        }

        let ytdlp = YtDlpConfig::from_env();
        if ytdlp.disabled {
            info!("Transcript extractor: disabled");
            return acquirer;
        }
        info!(path = %ytdlp.path, "Transcript extractor: yt-dlp");
        acquirer.with_extractor(Arc::new(YtDlpExtractor::new(ytdlp)))
    }

    pub fn config(&self) -> &TranscriptConfig {
        &self.config
    }

    async fn run_extractor(&self, video: &NormalizedVideoUrl) -> Option<ExtractedSubtitles> {
        let extractor = self.extractor.as_ref()?;
        match extractor.extract(video).await {
            Ok(subtitles) if !subtitles.transcript.trim().is_empty() => Some(ExtractedSubtitles {
                transcript: clip_text(&subtitles.transcript, self.config.max_chars),
                ..subtitles
            }),
            Ok(_) => None,
            Err(e) => {
                warn!(video_id = %video.video_id, code = %e.code(), error = %e.message(), "Subtitle extractor failed");
                None
            }
        }
    }

    fn from_extracted(
        video: &NormalizedVideoUrl,
        subtitles: ExtractedSubtitles,
        title: Option<String>,
        fallback_language: Option<String>,
    ) -> VideoTranscript {
        metrics::record_transcript_acquired(TranscriptProvider::Extractor.as_str());
        VideoTranscript {
            transcript: subtitles.transcript,
            video_id: video.video_id.clone(),
            title: title
                .or(subtitles.title)
                .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            language_code: subtitles
                .language_code
                .or(fallback_language)
                .unwrap_or_else(|| ytdlp::YTDLP_LANGUAGE_FALLBACK.to_string()),
            normalized_url: video.url.clone(),
            provider: TranscriptProvider::Extractor,
        }
    }
}

#[async_trait]
impl TranscriptSource for TranscriptAcquirer {
    async fn acquire(&self, video_url: &str) -> TranscriptResult<VideoTranscript> {
        let video = normalize_youtube_url(video_url)
            .map_err(|e| TranscriptError::invalid_url(format!("Not a valid YouTube URL: {e}")))?;

        let player = match player::fetch_player_response(&self.http, &self.config, &video.video_id).await {
            Ok(player) => player,
            Err(e @ TranscriptError::Blocked(_)) => {
                info!(video_id = %video.video_id, "Watch page blocked, trying extractor");
                return match self.run_extractor(&video).await {
                    Some(subtitles) => Ok(Self::from_extracted(&video, subtitles, None, None)),
                    None => Err(e),
                };
            }
            Err(e) => return Err(e),
        };

        let ranked = rank_tracks(&player.caption_tracks());
        let candidates: Vec<CaptionTrack> = if ranked.is_empty() {
            NO_TRACK_LANGUAGES
                .iter()
                .map(|lang| CaptionTrack::synthetic(lang))
                .collect()
        } else {
            ranked.clone()
        };

        let mut errors = AttemptErrors::default();
        for (index, track) in candidates.iter().enumerate() {
            match captions::fetch_track(&self.http, &self.config, &video.video_id, track).await {
                Ok(transcript) => {
                    metrics::record_transcript_acquired(TranscriptProvider::Captions.as_str());
                    return Ok(VideoTranscript {
                        transcript,
                        video_id: video.video_id.clone(),
                        title: player.title().unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
                        language_code: track
                            .language_code
                            .as_deref()
                            .map(str::trim)
                            .filter(|l| !l.is_empty())
                            .unwrap_or(ytdlp::YTDLP_LANGUAGE_FALLBACK)
                            .to_string(),
                        normalized_url: video.url.clone(),
                        provider: TranscriptProvider::Captions,
                    });
                }
                Err(e) => {
                    info!(
                        video_id = %video.video_id,
                        track_index = index,
                        language_code = track.language_code.as_deref().unwrap_or("-"),
                        kind = track.kind.as_deref().unwrap_or("-"),
                        code = %e.code(),
                        "Caption track attempt failed"
                    );
                    errors.record(e);
                }
            }
        }

        if errors.saw_blocked() {
            if let Some(subtitles) = self.run_extractor(&video).await {
                let top_language = ranked.first().and_then(|t| t.language_code.clone());
                return Ok(Self::from_extracted(
                    &video,
                    subtitles,
                    player.title(),
                    top_language,
                ));
            }
        }

        Err(errors.into_error())
    }
}
