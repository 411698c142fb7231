//! Summary orchestration: generation, output validation and fallback.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use docsum_models::{normalize_youtube_url, ErrorCode, SourceType};
use regex::Regex;
use thiserror::Error;
use tracing::{info, warn};

use crate::fallback::{build_fallback, FallbackSource};
use crate::gemini::{GeminiClient, GeminiConfig, GenerationError, GenerationRequest, GenerationResult, TextGenerator};
use crate::metrics;
use crate::prompts;
use crate::transcript::{TranscriptAcquirer, TranscriptError, TranscriptSource};

/// Mime type sent with direct video generation.
pub const VIDEO_MIME_TYPE: &str = "video/*";

static FENCE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^```\w*[ \t]*\n?").expect("valid fence regex"));
static FENCE_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^```[ \t]*$").expect("valid fence regex"));
static HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*#{1,6}\s+").expect("valid header regex"));
static STAR_BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)\*(\s+)").expect("valid star bullet regex"));
static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*{1,3}([^*\n]+)\*{1,3}").expect("valid emphasis regex"));
static TLDR_COLON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(TL;DR)\s*:\s*$").expect("valid tldr regex"));
static FULL_SUMMARY_COLON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(Full Summary)\s*:\s*$").expect("valid heading regex"));
static NUMBERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)\d+[.)]\s+").expect("valid numbered list regex"));
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-•]\s+").expect("valid bullet regex"));

pub type SummarizeResult<T> = Result<T, SummarizeError>;

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error(transparent)]
    Transcript(#[from] TranscriptError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("[GEMINI_OUTPUT_INVALID] {0}")]
    OutputInvalid(String),

    #[error("[FALLBACK_OUTPUT_INVALID] {0}")]
    FallbackOutputInvalid(String),
}

impl SummarizeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SummarizeError::Transcript(e) => e.code(),
            SummarizeError::Generation(e) => e.code(),
            SummarizeError::OutputInvalid(_) => ErrorCode::OutputInvalid,
            SummarizeError::FallbackOutputInvalid(_) => ErrorCode::FallbackOutputInvalid,
        }
    }
}

/// Remove markdown decorations models like to add.
pub fn strip_markdown(text: &str) -> String {
    let without_fences = FENCE_OPEN.replace_all(text, "");
    let without_fences = FENCE_CLOSE.replace_all(&without_fences, "");

    without_fences
        .split('\n')
        .map(|line| {
            let line = HEADER.replace(line, "");
            let line = STAR_BULLET.replace(&line, "${1}-${2}");
            let line = EMPHASIS.replace_all(&line, "${1}");
            let line = TLDR_COLON.replace(&line, "${1}");
            let line = FULL_SUMMARY_COLON.replace(&line, "${1}");
            NUMBERED.replace(&line, "${1}- ").into_owned()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Normalize line endings and whitespace after stripping markdown.
pub fn normalize_summary(raw: &str) -> String {
    strip_markdown(&raw.replace("\r\n", "\n"))
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn bullet_count(text: &str) -> usize {
    text.lines().filter(|line| BULLET.is_match(line)).count()
}

/// `TL;DR` heading, `Full Summary` heading and at least three bullets.
pub fn validate_format(text: &str) -> bool {
    let has_heading = |heading: &str| {
        text.lines()
            .any(|line| line.trim().eq_ignore_ascii_case(heading))
    };
    has_heading("TL;DR") && has_heading("Full Summary") && bullet_count(text) >= 3
}

/// Turns a source document into summary text.
#[async_trait]
pub trait DocumentSummarizer: Send + Sync {
    /// Always returns text unless the fallback itself is malformed.
    async fn summarize(
        &self,
        source_type: SourceType,
        content: &str,
        request_id: &str,
    ) -> SummarizeResult<String>;
}

pub struct Summarizer {
    generator: Arc<dyn TextGenerator>,
    transcripts: Arc<dyn TranscriptSource>,
}

impl Summarizer {
    pub fn new(generator: Arc<dyn TextGenerator>, transcripts: Arc<dyn TranscriptSource>) -> Self {
        Self {
            generator,
            transcripts,
        }
    }

    /// Gemini client and transcript acquirer configured from the environment.
    pub fn from_env() -> GenerationResult<Self> {
        let generator: Arc<dyn TextGenerator> = Arc::new(GeminiClient::new(GeminiConfig::from_env()?));
        let transcripts: Arc<dyn TranscriptSource> = Arc::new(TranscriptAcquirer::from_env());
        Ok(Self::new(generator, transcripts))
    }

    async fn generate_validated(&self, request: GenerationRequest) -> SummarizeResult<String> {
        let request_id = request.request_id.clone();
        let raw = self.generator.generate(request).await?;
        let normalized = normalize_summary(&raw);

        if normalized.is_empty() {
            return Err(SummarizeError::OutputInvalid(
                "Generated text was empty after normalization".to_string(),
            ));
        }
        if !validate_format(&normalized) {
            warn!(
                request_id = %request_id,
                bullets = bullet_count(&normalized),
                head = %normalized.chars().take(200).collect::<String>(),
                "Generated text failed format validation"
            );
            return Err(SummarizeError::OutputInvalid(
                "Generated text does not follow the TL;DR / Full Summary layout".to_string(),
            ));
        }
        Ok(normalized)
    }

    fn finish_fallback(&self, source: FallbackSource<'_>, reason: ErrorCode, request_id: &str) -> SummarizeResult<String> {
        metrics::record_fallback_summary(reason.as_str());
        info!(request_id = %request_id, reason = %reason, "Using extractive fallback summary");

        let normalized = normalize_summary(&build_fallback(source, reason));
        if validate_format(&normalized) {
            Ok(normalized)
        } else {
            Err(SummarizeError::FallbackOutputInvalid(format!(
                "Fallback summary failed format validation (reason: {reason})"
            )))
        }
    }

    async fn summarize_text(&self, content: &str, request_id: &str) -> SummarizeResult<String> {
        let request = GenerationRequest::new(prompts::text_prompt(content), request_id);
        match self.generate_validated(request).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                warn!(request_id = %request_id, code = %e.code(), error = %e, "Text generation failed");
                self.finish_fallback(FallbackSource::Text(content), e.code(), request_id)
            }
        }
    }

    async fn summarize_video(&self, content: &str, request_id: &str) -> SummarizeResult<String> {
        let transcript = match self.transcripts.acquire(content).await {
            Ok(transcript) => transcript,
            Err(e) => {
                warn!(request_id = %request_id, code = %e.code(), error = %e.message(), "Transcript acquisition failed");
                let video = normalize_youtube_url(content).ok();
                let source = FallbackSource::Video {
                    url: video.as_ref().map(|v| v.url.as_str()).unwrap_or(content.trim()),
                    video_id: video.as_ref().map(|v| v.video_id.as_str()),
                };
                return self.finish_fallback(source, e.code(), request_id);
            }
        };

        let request = GenerationRequest::new(prompts::transcript_prompt(&transcript), request_id);
        match self.generate_validated(request).await {
            Ok(summary) => return Ok(summary),
            Err(e) => {
                warn!(request_id = %request_id, code = %e.code(), error = %e, "Transcript generation failed, trying direct video");
            }
        }

        let request = GenerationRequest::new(prompts::video_prompt(&transcript.normalized_url), request_id)
            .with_file(transcript.normalized_url.clone(), VIDEO_MIME_TYPE);
        let reason = match self.generate_validated(request).await {
            Ok(summary) => return Ok(summary),
            Err(e) => {
                warn!(request_id = %request_id, code = %e.code(), error = %e, "Direct video generation failed");
                e.code()
            }
        };

        self.finish_fallback(FallbackSource::Transcript(&transcript), reason, request_id)
    }
}

#[async_trait]
impl DocumentSummarizer for Summarizer {
    async fn summarize(
        &self,
        source_type: SourceType,
        content: &str,
        request_id: &str,
    ) -> SummarizeResult<String> {
        match source_type {
            SourceType::Text => self.summarize_text(content, request_id).await,
            SourceType::Video => self.summarize_video(content, request_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::transcript::{TranscriptProvider, TranscriptResult, VideoTranscript};

    const VALID: &str = "TL;DR\n- a\n- b\n- c\n\nFull Summary\nbody";

    struct ScriptedGenerator {
        responses: Mutex<VecDeque<GenerationResult<String>>>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedGenerator {
        fn new(responses: Vec<GenerationResult<String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<GenerationRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, request: GenerationRequest) -> GenerationResult<String> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GenerationError::unknown("script exhausted")))
        }
    }

    struct FixedTranscript(TranscriptResult<VideoTranscript>);

    #[async_trait]
    impl TranscriptSource for FixedTranscript {
        async fn acquire(&self, _video_url: &str) -> TranscriptResult<VideoTranscript> {
            self.0.clone()
        }
    }

    fn transcript() -> VideoTranscript {
        VideoTranscript {
            transcript: "One idea. Two ideas. Three ideas. Four ideas.".to_string(),
            video_id: "abcdefghijk".to_string(),
            title: "Demo".to_string(),
            language_code: "en".to_string(),
            normalized_url: "https://www.youtube.com/watch?v=abcdefghijk".to_string(),
            provider: TranscriptProvider::Captions,
        }
    }

    #[test]
    fn test_strip_markdown() {
        let raw = "```markdown\n## **TL;DR:**\n* first\n1. second\n2) ***third***\n\n# Full Summary:\nSome *body* text.\n```";
        let normalized = normalize_summary(raw);
        assert_eq!(
            normalized,
            "TL;DR\n- first\n- second\n- third\n\nFull Summary\nSome body text."
        );
        assert!(validate_format(&normalized));
    }

    #[test]
    fn test_normalize_trims_lines() {
        assert_eq!(normalize_summary("  \r\nTL;DR   \r\n- a  \r\n\r\n"), "TL;DR\n- a");
    }

    #[test]
    fn test_validate_format_requires_all_parts() {
        assert!(validate_format(VALID));
        assert!(validate_format("tl;dr\n• a\n• b\n• c\nfull summary\nx"));
        assert!(!validate_format("TL;DR\n- a\n- b\n\nFull Summary\nbody"));
        assert!(!validate_format("TL;DR\n- a\n- b\n- c\nbody"));
        assert!(!validate_format("TL;DR: x\n- a\n- b\n- c\nFull Summary"));
    }

    #[tokio::test]
    async fn test_text_success_is_normalized() {
        let generator = ScriptedGenerator::new(vec![Ok(format!("**TL;DR**\n{}", &VALID[6..]))]);
        let summarizer = Summarizer::new(generator.clone(), Arc::new(FixedTranscript(Ok(transcript()))));

        let summary = summarizer.summarize(SourceType::Text, "Some text.", "req-1").await.unwrap();
        assert_eq!(summary, VALID);
        assert_eq!(generator.requests()[0].request_id, "req-1");
    }

    #[tokio::test]
    async fn test_text_failure_falls_back_with_reason() {
        let generator = ScriptedGenerator::new(vec![Err(GenerationError::missing_key("no key"))]);
        let summarizer = Summarizer::new(generator, Arc::new(FixedTranscript(Ok(transcript()))));

        let summary = summarizer
            .summarize(SourceType::Text, "Alpha. Beta. Gamma.", "req-2")
            .await
            .unwrap();
        assert!(summary.contains("- Alpha."));
        assert!(summary.contains("MISSING_GEMINI_KEY"));
    }

    #[tokio::test]
    async fn test_invalid_output_falls_back() {
        let generator = ScriptedGenerator::new(vec![Ok("just a paragraph".to_string())]);
        let summarizer = Summarizer::new(generator, Arc::new(FixedTranscript(Ok(transcript()))));

        let summary = summarizer.summarize(SourceType::Text, "Alpha.", "req-3").await.unwrap();
        assert!(summary.contains("GEMINI_OUTPUT_INVALID"));
    }

    #[tokio::test]
    async fn test_video_chain_tries_direct_video_then_transcript_fallback() {
        let generator = ScriptedGenerator::new(vec![
            Err(GenerationError::request_failed("503")),
            Err(GenerationError::timeout("slow")),
        ]);
        let summarizer = Summarizer::new(generator.clone(), Arc::new(FixedTranscript(Ok(transcript()))));

        let summary = summarizer
            .summarize(SourceType::Video, "https://youtu.be/abcdefghijk", "req-4")
            .await
            .unwrap();

        let requests = generator.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].file_uri.is_none());
        assert!(requests[0].prompt.contains("One idea."));
        assert_eq!(
            requests[1].file_uri.as_deref(),
            Some("https://www.youtube.com/watch?v=abcdefghijk")
        );
        assert_eq!(requests[1].file_mime_type.as_deref(), Some(VIDEO_MIME_TYPE));
        assert!(summary.contains("GEMINI_TIMEOUT"));
        assert!(summary.contains("Caption language: en"));
    }

    #[tokio::test]
    async fn test_acquisition_failure_skips_generation() {
        let generator = ScriptedGenerator::new(vec![]);
        let summarizer = Summarizer::new(
            generator.clone(),
            Arc::new(FixedTranscript(Err(TranscriptError::blocked("consent")))),
        );

        let summary = summarizer
            .summarize(SourceType::Video, "https://youtu.be/abcdefghijk", "req-5")
            .await
            .unwrap();

        assert!(generator.requests().is_empty());
        assert!(summary.contains("YOUTUBE_TRANSCRIPT_BLOCKED"));
        assert!(summary.contains("abcdefghijk"));
    }
}
