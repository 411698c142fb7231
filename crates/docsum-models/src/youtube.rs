//! YouTube URL normalization.
//!
//! User input is untrusted and may be a bare URL, a URL without a scheme, or
//! a URL pasted inside surrounding text. The first candidate that resolves to
//! a supported host with a well-formed video id wins.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

static URL_CANDIDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(https?://[^\s<>"')\]}]+|(?:www\.)?(?:m\.)?(?:music\.)?youtube\.com/[^\s<>"')\]}]+|(?:www\.)?youtu\.be/[^\s<>"')\]}]+)"#,
    )
    .expect("valid url candidate regex")
});

static VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{6,}$").expect("valid video id regex"));

const YOUTUBE_HOSTS: [&str; 4] = ["youtube.com", "m.youtube.com", "music.youtube.com", "youtu.be"];

const ID_PATH_PREFIXES: [&str; 4] = ["shorts", "embed", "live", "v"];

/// Errors that can occur during YouTube URL normalization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum YoutubeUrlError {
    #[error("input is empty")]
    Empty,

    #[error("no supported YouTube URL with a valid video id found")]
    NotYoutube,
}

pub type YoutubeUrlResult<T> = Result<T, YoutubeUrlError>;

/// A validated video reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedVideoUrl {
    /// Canonical `https://www.youtube.com/watch?v=<id>` form
    pub url: String,
    pub video_id: String,
}

impl NormalizedVideoUrl {
    fn from_id(video_id: &str) -> Self {
        Self {
            url: format!("https://www.youtube.com/watch?v={video_id}"),
            video_id: video_id.to_string(),
        }
    }
}

fn sanitize_candidate(text: &str) -> &str {
    text.trim()
        .trim_start_matches(|c: char| c.is_whitespace() || "<([{'\"`".contains(c))
        .trim_end_matches(|c: char| c.is_whitespace() || ">)]}'\"`.,!?;:".contains(c))
}

fn extract_candidates(raw: &str) -> Vec<&str> {
    let normalized = sanitize_candidate(raw);
    if normalized.is_empty() {
        return Vec::new();
    }

    let matches: Vec<&str> = URL_CANDIDATE
        .find_iter(normalized)
        .map(|m| sanitize_candidate(m.as_str()))
        .filter(|c| !c.is_empty())
        .collect();

    if matches.is_empty() {
        vec![normalized]
    } else {
        matches
    }
}

fn normalize_host(host: &str) -> String {
    let lowered = host.to_ascii_lowercase();
    lowered.strip_prefix("www.").unwrap_or(&lowered).to_string()
}

fn extract_video_id(url: &Url, host: &str) -> Option<String> {
    if host == "youtu.be" {
        return url
            .path_segments()
            .and_then(|mut segments| segments.find(|s| !s.is_empty()))
            .map(str::to_string);
    }

    let path = url.path().trim_end_matches('/');
    if path == "/watch" {
        return url
            .query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned());
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [prefix, id, ..] if ID_PATH_PREFIXES.contains(prefix) => Some((*id).to_string()),
        _ => None,
    }
}

fn parse_candidate(candidate: &str) -> Option<NormalizedVideoUrl> {
    let lowered = candidate.to_ascii_lowercase();
    let with_scheme = if lowered.starts_with("http://") || lowered.starts_with("https://") {
        candidate.to_string()
    } else {
        format!("https://{candidate}")
    };

    let parsed = Url::parse(&with_scheme).ok()?;
    let host = normalize_host(parsed.host_str()?);
    if !YOUTUBE_HOSTS.contains(&host.as_str()) {
        return None;
    }

    let id = extract_video_id(&parsed, &host)?;
    let id = id.trim();
    VIDEO_ID
        .is_match(id)
        .then(|| NormalizedVideoUrl::from_id(id))
}

/// Normalize a user-supplied YouTube reference into its canonical watch URL.
pub fn normalize_youtube_url(raw: &str) -> YoutubeUrlResult<NormalizedVideoUrl> {
    let candidates = extract_candidates(raw);
    if candidates.is_empty() {
        return Err(YoutubeUrlError::Empty);
    }

    candidates
        .into_iter()
        .find_map(parse_candidate)
        .ok_or(YoutubeUrlError::NotYoutube)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_of(raw: &str) -> String {
        normalize_youtube_url(raw).unwrap().video_id
    }

    #[test]
    fn test_supported_url_shapes() {
        assert_eq!(id_of("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), "dQw4w9WgXcQ");
        assert_eq!(id_of("https://m.youtube.com/watch?v=dQw4w9WgXcQ&t=30"), "dQw4w9WgXcQ");
        assert_eq!(id_of("https://music.youtube.com/watch?v=dQw4w9WgXcQ"), "dQw4w9WgXcQ");
        assert_eq!(id_of("https://youtu.be/dQw4w9WgXcQ?si=abc"), "dQw4w9WgXcQ");
        assert_eq!(id_of("https://youtube.com/shorts/abc_DEF-12"), "abc_DEF-12");
        assert_eq!(id_of("https://www.youtube.com/embed/dQw4w9WgXcQ/"), "dQw4w9WgXcQ");
        assert_eq!(id_of("https://www.youtube.com/live/dQw4w9WgXcQ"), "dQw4w9WgXcQ");
        assert_eq!(id_of("youtube.com/v/dQw4w9WgXcQ"), "dQw4w9WgXcQ");
    }

    #[test]
    fn test_canonical_form() {
        let normalized = normalize_youtube_url("youtu.be/dQw4w9WgXcQ").unwrap();
        assert_eq!(normalized.url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    }

    #[test]
    fn test_url_inside_text() {
        assert_eq!(
            id_of("please summarize (https://youtu.be/dQw4w9WgXcQ), thanks!"),
            "dQw4w9WgXcQ"
        );
        assert_eq!(
            id_of("see https://example.com first, then www.youtube.com/watch?v=dQw4w9WgXcQ."),
            "dQw4w9WgXcQ"
        );
    }

    #[test]
    fn test_rejections() {
        assert_eq!(normalize_youtube_url("   "), Err(YoutubeUrlError::Empty));
        assert_eq!(
            normalize_youtube_url("https://vimeo.com/123456"),
            Err(YoutubeUrlError::NotYoutube)
        );
        assert_eq!(
            normalize_youtube_url("https://www.youtube.com/watch?v=abc"),
            Err(YoutubeUrlError::NotYoutube)
        );
        assert_eq!(
            normalize_youtube_url("https://www.youtube.com/channel/UCabcdef"),
            Err(YoutubeUrlError::NotYoutube)
        );
        assert_eq!(
            normalize_youtube_url("just some words"),
            Err(YoutubeUrlError::NotYoutube)
        );
    }
}
