//! Out-of-process subtitle extraction with `yt-dlp`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use docsum_models::NormalizedVideoUrl;
use regex::Regex;
use tokio::process::Command;
use tracing::{info, warn};

use super::error::{TranscriptError, TranscriptResult};
use super::parse::{clip_text, parse_vtt};
use super::{ExtractedSubtitles, SubtitleExtractor};

pub const DEFAULT_SUB_LANGS: &str = "ko.*,ko,en.*,en";
pub const DEFAULT_AUTO_COOKIE_BROWSERS: [&str; 4] = ["chrome", "brave", "safari", "firefox"];
pub const YTDLP_LANGUAGE_FALLBACK: &str = "(yt-dlp)";

const OUTPUT_TAIL_CHARS: usize = 4000;

const COOKIE_RETRY_MARKERS: [&str; 6] = [
    "too many requests",
    "http error 429",
    "sign in to confirm",
    "use --cookies-from-browser",
    "captcha",
    "unable to download video subtitles",
];

const BLOCKED_STDERR_MARKERS: [&str; 5] = [
    "too many requests",
    "http error 429",
    "sign in to confirm",
    "captcha",
    "use --cookies-from-browser",
];

static VTT_LANGUAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.([a-z]{2,3}(?:-[a-z0-9]+)?)\.vtt$").expect("valid subtitle language regex")
});

#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    pub disabled: bool,
    pub path: String,
    pub sub_langs: String,
    /// When set, only this browser's cookie jar is tried
    pub cookies_from_browser: Option<String>,
    pub auto_cookie_browsers: Vec<String>,
    pub timeout: Duration,
    pub max_chars: usize,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            path: "yt-dlp".to_string(),
            sub_langs: DEFAULT_SUB_LANGS.to_string(),
            cookies_from_browser: None,
            auto_cookie_browsers: DEFAULT_AUTO_COOKIE_BROWSERS
                .iter()
                .map(|b| b.to_string())
                .collect(),
            timeout: Duration::from_secs(45),
            max_chars: 14_000,
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl YtDlpConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            disabled: env_flag("YTDLP_DISABLED"),
            path: env_non_empty("YTDLP_PATH").unwrap_or(defaults.path),
            sub_langs: env_non_empty("YTDLP_SUB_LANGS").unwrap_or(defaults.sub_langs),
            cookies_from_browser: env_non_empty("YTDLP_COOKIES_FROM_BROWSER"),
            auto_cookie_browsers: env_non_empty("YTDLP_AUTO_COOKIES_BROWSERS")
                .map(|list| {
                    list.split(',')
                        .map(|b| b.trim().to_lowercase())
                        .filter(|b| !b.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.auto_cookie_browsers),
            timeout: std::env::var("YTDLP_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            max_chars: std::env::var("TRANSCRIPT_MAX_CHARS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_chars),
        }
    }

    /// Cookie sources in the order they are tried. `None` means no cookies.
    pub fn cookie_sources(&self) -> Vec<Option<String>> {
        if let Some(browser) = &self.cookies_from_browser {
            return vec![Some(browser.clone())];
        }
        std::iter::once(None)
            .chain(self.auto_cookie_browsers.iter().cloned().map(Some))
            .collect()
    }
}

/// Subtitle file picked out of the scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSubtitleFile {
    pub file_name: String,
    pub transcript: String,
    pub language_code: String,
}

/// Outcome of one `yt-dlp` invocation.
#[derive(Debug, Clone, Default)]
pub struct YtDlpRun {
    pub exit_code: Option<i32>,
    pub stdout_tail: String,
    pub stderr_tail: String,
    pub timed_out: bool,
    pub subtitles: Option<ParsedSubtitleFile>,
    pub vtt_count: usize,
}

impl YtDlpRun {
    /// Whether another cookie source is worth trying.
    pub fn should_retry_with_cookies(&self) -> bool {
        let stderr = self.stderr_tail.to_lowercase();
        COOKIE_RETRY_MARKERS.iter().any(|m| stderr.contains(m))
    }

    pub fn is_blocked(&self) -> bool {
        is_blocked_stderr(&self.stderr_tail)
    }

    /// Classify a run that produced no transcript.
    pub fn failure(&self) -> TranscriptError {
        if self.timed_out {
            TranscriptError::worker_timeout("yt-dlp timed out while fetching subtitles")
        } else if self.is_blocked() {
            TranscriptError::blocked("YouTube blocked yt-dlp subtitle download")
        } else if self.vtt_count == 0 {
            TranscriptError::unavailable("yt-dlp found no subtitles for this video")
        } else {
            TranscriptError::fetch_failed(format!(
                "yt-dlp subtitles could not be parsed (exit {})",
                self.exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string())
            ))
        }
    }
}

pub fn is_blocked_stderr(stderr: &str) -> bool {
    let lowered = stderr.to_lowercase();
    BLOCKED_STDERR_MARKERS.iter().any(|m| lowered.contains(m))
}

/// `--sub-langs` value for a preference list: `ko.*,ko,en.*,en`.
pub fn sub_langs_for(languages: &[String]) -> String {
    if languages.is_empty() {
        return DEFAULT_SUB_LANGS.to_string();
    }
    languages
        .iter()
        .map(|lang| format!("{lang}.*,{lang}"))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn subtitle_file_score(file_name: &str) -> i32 {
    let lowered = file_name.to_lowercase();
    if lowered.contains(".ko.") {
        100
    } else if lowered.contains(".en.") {
        90
    } else if lowered.contains(".ja.") {
        70
    } else {
        10
    }
}

pub fn detect_language_code(file_name: &str) -> String {
    let lowered = file_name.to_lowercase();
    for code in ["ko", "en", "ja"] {
        if lowered.contains(&format!(".{code}.")) {
            return code.to_string();
        }
    }
    VTT_LANGUAGE
        .captures(&lowered)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| YTDLP_LANGUAGE_FALLBACK.to_string())
}

fn tail(value: &str, max_chars: usize) -> String {
    let count = value.chars().count();
    if count <= max_chars {
        return value.to_string();
    }
    value.chars().skip(count - max_chars).collect()
}

/// Parse the highest-ranked `.vtt` file in `dir`.
///
/// Returns the number of `.vtt` files seen alongside the parse result.
pub async fn parse_best_subtitle_file(
    dir: &Path,
    max_chars: usize,
) -> std::io::Result<(Option<ParsedSubtitleFile>, usize)> {
    let mut files: Vec<PathBuf> = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("vtt") {
            files.push(path);
        }
    }

    let vtt_count = files.len();
    files.sort_by_key(|path| {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        std::cmp::Reverse(subtitle_file_score(name))
    });

    for path in files {
        let raw = tokio::fs::read_to_string(&path).await?;
        let transcript = parse_vtt(&raw);
        if transcript.is_empty() {
            continue;
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        return Ok((
            Some(ParsedSubtitleFile {
                language_code: detect_language_code(&file_name),
                transcript: clip_text(&transcript, max_chars),
                file_name,
            }),
            vtt_count,
        ));
    }

    Ok((None, vtt_count))
}

fn build_args(
    video: &NormalizedVideoUrl,
    sub_langs: &str,
    browser: Option<&str>,
    workdir: &Path,
) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(browser) = browser {
        args.push("--cookies-from-browser".to_string());
        args.push(browser.to_string());
    }
    args.extend(
        [
            "--skip-download",
            "--write-auto-subs",
            "--write-subs",
            "--sub-format",
            "vtt",
            "--sub-langs",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args.push(sub_langs.to_string());
    args.push("--output".to_string());
    args.push(format!(
        "{}/{}.%(ext)s",
        workdir.display(),
        video.video_id
    ));
    args.extend(
        ["--no-warnings", "--no-progress", "--restrict-filenames"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.push(video.url.clone());
    args
}

/// Run `yt-dlp` once and inspect what it wrote into `workdir`.
///
/// The child is killed when the timeout expires.
pub async fn run_attempt(
    config: &YtDlpConfig,
    video: &NormalizedVideoUrl,
    sub_langs: &str,
    browser: Option<&str>,
    workdir: &Path,
) -> std::io::Result<YtDlpRun> {
    let args = build_args(video, sub_langs, browser, workdir);

    let child = Command::new(&config.path)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let mut run = match tokio::time::timeout(config.timeout, child.wait_with_output()).await {
        Ok(output) => {
            let output = output?;
            YtDlpRun {
                exit_code: output.status.code(),
                stdout_tail: tail(&String::from_utf8_lossy(&output.stdout), OUTPUT_TAIL_CHARS),
                stderr_tail: tail(&String::from_utf8_lossy(&output.stderr), OUTPUT_TAIL_CHARS),
                ..Default::default()
            }
        }
        Err(_) => YtDlpRun {
            timed_out: true,
            ..Default::default()
        },
    };

    let (subtitles, vtt_count) = parse_best_subtitle_file(workdir, config.max_chars).await?;
    run.subtitles = subtitles;
    run.vtt_count = vtt_count;
    Ok(run)
}

/// Local `yt-dlp` subtitle extractor.
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    config: YtDlpConfig,
}

impl YtDlpExtractor {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(YtDlpConfig::from_env())
    }

    pub fn config(&self) -> &YtDlpConfig {
        &self.config
    }

    /// Whether the binary can be found on `PATH` (or at the configured path).
    pub fn is_available(&self) -> bool {
        which::which(&self.config.path).is_ok()
    }

    /// Try each cookie source until subtitles are parsed.
    ///
    /// Returns the last run when nothing was parsed.
    pub async fn run(&self, video: &NormalizedVideoUrl, sub_langs: &str) -> std::io::Result<YtDlpRun> {
        let mut last_run = YtDlpRun::default();

        for source in self.config.cookie_sources() {
            let workdir = tempfile::Builder::new().prefix("docsum-ytdlp-").tempdir()?;
            let run = run_attempt(
                &self.config,
                video,
                sub_langs,
                source.as_deref(),
                workdir.path(),
            )
            .await?;

            if run.subtitles.is_some() {
                return Ok(run);
            }

            info!(
                video_id = %video.video_id,
                cookies = source.as_deref().unwrap_or("none"),
                exit_code = ?run.exit_code,
                timed_out = run.timed_out,
                "yt-dlp attempt produced no subtitles"
            );

            let retry = run.should_retry_with_cookies();
            let explicit = self.config.cookies_from_browser.is_some();
            last_run = run;
            if explicit {
                continue;
            }
            if !retry && source.is_none() {
                break;
            }
        }

        Ok(last_run)
    }
}

#[async_trait]
impl SubtitleExtractor for YtDlpExtractor {
    async fn extract(&self, video: &NormalizedVideoUrl) -> TranscriptResult<ExtractedSubtitles> {
        if self.config.disabled {
            return Err(TranscriptError::worker_unavailable("yt-dlp is disabled"));
        }
        if !self.is_available() {
            return Err(TranscriptError::worker_unavailable(format!(
                "yt-dlp binary not found: {}",
                self.config.path
            )));
        }

        let run = self.run(video, &self.config.sub_langs).await.map_err(|e| {
            warn!(video_id = %video.video_id, error = %e, "yt-dlp could not run");
            TranscriptError::worker_unavailable(format!("yt-dlp could not run: {e}"))
        })?;

        match run.subtitles {
            Some(parsed) => Ok(ExtractedSubtitles {
                transcript: parsed.transcript,
                language_code: Some(parsed.language_code),
                title: None,
            }),
            None => Err(run.failure()),
        }
    }
}
