//! Caption track selection and download.

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use super::error::{TranscriptError, TranscriptResult};
use super::parse::{clip_text, parse_caption_body};
use super::player::{browser_headers, has_blocked_marker, looks_like_html, CaptionTrack};
use super::TranscriptConfig;

const UNAVAILABLE_BODY_MARKERS: [&str; 4] = [
    "transcript is unavailable",
    "captions are not available",
    "<transcript/>",
    "<transcript></transcript>",
];

/// Preference by language family; regional variants (`ko-KR`, `en-US`)
/// score like their base language.
pub fn language_score(language_code: &str) -> i32 {
    let code = language_code.to_lowercase();
    if code.starts_with("ko") {
        100
    } else if code.starts_with("en") {
        90
    } else if code.starts_with("ja") {
        70
    } else {
        10
    }
}

/// Score used to order tracks; auto-generated tracks lose a few points.
pub fn track_score(track: &CaptionTrack) -> i32 {
    let base = language_score(track.language_code.as_deref().unwrap_or_default());
    if track.is_auto_generated() {
        base - 5
    } else {
        base
    }
}

/// Tracks with a download URL, best first.
pub fn rank_tracks(tracks: &[CaptionTrack]) -> Vec<CaptionTrack> {
    let mut ranked: Vec<CaptionTrack> = tracks
        .iter()
        .filter(|track| {
            track
                .base_url
                .as_deref()
                .map(|url| !url.trim().is_empty())
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    ranked.sort_by_key(|track| std::cmp::Reverse(track_score(track)));
    ranked
}

fn with_fmt(base_url: &str, fmt: &str) -> Option<String> {
    let mut url = Url::parse(base_url).ok()?;
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "fmt")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("fmt", fmt);
    Some(url.to_string())
}

fn unsigned_url(config: &TranscriptConfig, video_id: &str, track: &CaptionTrack, fmt: Option<&str>) -> Option<String> {
    let mut url = Url::parse(&format!("{}/api/timedtext", config.base_url)).ok()?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("v", video_id);
        query.append_pair("lang", track.language_code.as_deref().unwrap_or("en"));
        if let Some(kind) = track.kind.as_deref().filter(|k| !k.is_empty()) {
            query.append_pair("kind", kind);
        }
        if let Some(fmt) = fmt {
            query.append_pair("fmt", fmt);
        }
    }
    Some(url.to_string())
}

/// URLs to try for one track, signed variants first, deduplicated.
pub fn candidate_urls(config: &TranscriptConfig, video_id: &str, track: &CaptionTrack) -> Vec<String> {
    let mut candidates: Vec<Option<String>> = Vec::new();
    if let Some(base) = track.base_url.as_deref().filter(|b| !b.trim().is_empty()) {
        candidates.push(Some(base.to_string()));
        candidates.push(with_fmt(base, "json3"));
        candidates.push(with_fmt(base, "vtt"));
    }
    candidates.push(unsigned_url(config, video_id, track, Some("json3")));
    candidates.push(unsigned_url(config, video_id, track, Some("vtt")));
    candidates.push(unsigned_url(config, video_id, track, None));

    let mut unique = Vec::new();
    for candidate in candidates.into_iter().flatten() {
        if !unique.contains(&candidate) {
            unique.push(candidate);
        }
    }
    unique
}

pub fn is_unavailable_response(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        return true;
    }
    let lowered = body.to_lowercase();
    UNAVAILABLE_BODY_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// HTML where caption data was expected means an interstitial.
pub fn is_blocked_caption_response(content_type: Option<&str>, body: &str, url: &str) -> bool {
    let lowered = body.to_lowercase();
    if !looks_like_html(content_type, &lowered) {
        return false;
    }
    url.contains("/api/timedtext") || body.trim().is_empty() || has_blocked_marker(&lowered)
}

/// Download one track, trying every candidate URL.
pub async fn fetch_track(
    http: &Client,
    config: &TranscriptConfig,
    video_id: &str,
    track: &CaptionTrack,
) -> TranscriptResult<String> {
    let mut saw_blocked = false;
    let mut saw_unavailable = false;
    let mut last_error: Option<TranscriptError> = None;

    for url in candidate_urls(config, video_id, track) {
        let response = match http
            .get(&url)
            .timeout(config.fetch_timeout)
            .headers(browser_headers())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                last_error = Some(TranscriptError::fetch_failed(format!(
                    "Caption request failed: {e}"
                )));
                continue;
            }
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                last_error = Some(TranscriptError::fetch_failed(format!(
                    "Caption body read failed: {e}"
                )));
                continue;
            }
        };

        if !status.is_success() {
            debug!(video_id = %video_id, status = status.as_u16(), url = %url, "Caption candidate rejected");
            if is_unavailable_response(status, &body) {
                saw_unavailable = true;
            } else if is_blocked_caption_response(content_type.as_deref(), &body, &url) {
                saw_blocked = true;
            } else {
                last_error = Some(TranscriptError::fetch_failed(format!(
                    "Caption request returned {}",
                    status.as_u16()
                )));
            }
            continue;
        }

        let transcript = parse_caption_body(&body, content_type.as_deref());
        if !transcript.is_empty() {
            return Ok(clip_text(&transcript, config.max_chars));
        }

        if is_unavailable_response(status, &body) {
            saw_unavailable = true;
        } else if is_blocked_caption_response(content_type.as_deref(), &body, &url) {
            saw_blocked = true;
        } else {
            last_error = Some(TranscriptError::fetch_failed(
                "Could not parse caption response",
            ));
        }
    }

    if saw_blocked {
        return Err(TranscriptError::blocked(
            "YouTube blocked the server request for captions",
        ));
    }
    if saw_unavailable {
        return Err(TranscriptError::unavailable(
            "No transcript is available for this video",
        ));
    }
    Err(last_error.unwrap_or_else(|| TranscriptError::fetch_failed("Caption download failed")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(lang: &str, kind: Option<&str>, base: Option<&str>) -> CaptionTrack {
        CaptionTrack {
            base_url: base.map(str::to_string),
            kind: kind.map(str::to_string),
            language_code: Some(lang.to_string()),
        }
    }

    #[test]
    fn test_rank_tracks_prefers_language_then_manual() {
        let tracks = vec![
            track("de", None, Some("https://x/de")),
            track("en", Some("asr"), Some("https://x/en-asr")),
            track("ko", None, None),
            track("en", None, Some("https://x/en")),
            track("ja", None, Some("https://x/ja")),
        ];
        let ranked = rank_tracks(&tracks);
        let urls: Vec<_> = ranked.iter().map(|t| t.base_url.clone().unwrap()).collect();
        assert_eq!(
            urls,
            vec!["https://x/en", "https://x/en-asr", "https://x/ja", "https://x/de"]
        );
    }

    #[test]
    fn test_rank_tracks_treats_regional_codes_as_their_language() {
        let tracks = vec![
            track("de", None, Some("https://x/de")),
            track("ko-KR", Some("asr"), Some("https://x/ko-kr")),
            track("en-US", None, Some("https://x/en-us")),
            track("ja-JP", None, Some("https://x/ja-jp")),
        ];
        let urls: Vec<_> = rank_tracks(&tracks)
            .iter()
            .map(|t| t.base_url.clone().unwrap())
            .collect();
        assert_eq!(
            urls,
            vec!["https://x/ko-kr", "https://x/en-us", "https://x/ja-jp", "https://x/de"]
        );
        assert_eq!(language_score("EN-gb"), language_score("en"));
    }

    #[tokio::test]
    async fn test_truncated_caption_body_is_a_fetch_failure() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut request = [0u8; 4096];
                let _ = socket.read(&mut request).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\nContent-Type: text/vtt\r\nContent-Length: 500\r\n\r\nWEBVTT\n",
                    )
                    .await;
            }
        });

        let base = format!("http://{addr}");
        let config = TranscriptConfig::default().with_base_url(base.clone());
        let t = track("en", None, Some(&format!("{base}/api/timedtext?v=abc&lang=en")));

        let err = fetch_track(&Client::new(), &config, "abc", &t).await.unwrap_err();
        match err {
            TranscriptError::FetchFailed(message) => {
                assert!(message.contains("body read failed"), "{message}")
            }
            other => panic!("expected a fetch failure, got {other:?}"),
        }
    }

    #[test]
    fn test_candidate_urls_order_and_dedup() {
        let config = TranscriptConfig::default().with_base_url("https://yt.test");
        let t = track(
            "en",
            Some("asr"),
            Some("https://yt.test/api/timedtext?v=abc&lang=en&fmt=json3"),
        );
        let urls = candidate_urls(&config, "abc", &t);
        assert_eq!(
            urls,
            vec![
                "https://yt.test/api/timedtext?v=abc&lang=en&fmt=json3".to_string(),
                "https://yt.test/api/timedtext?v=abc&lang=en&fmt=vtt".to_string(),
                "https://yt.test/api/timedtext?v=abc&lang=en&kind=asr&fmt=json3".to_string(),
                "https://yt.test/api/timedtext?v=abc&lang=en&kind=asr&fmt=vtt".to_string(),
                "https://yt.test/api/timedtext?v=abc&lang=en&kind=asr".to_string(),
            ]
        );
    }

    #[test]
    fn test_unavailable_and_blocked_classification() {
        assert!(is_unavailable_response(StatusCode::NOT_FOUND, ""));
        assert!(is_unavailable_response(StatusCode::OK, "<transcript/>"));
        assert!(!is_unavailable_response(StatusCode::FORBIDDEN, "denied"));

        assert!(is_blocked_caption_response(
            Some("text/html"),
            "<html>hi</html>",
            "https://yt.test/api/timedtext?v=1"
        ));
        assert!(is_blocked_caption_response(
            None,
            "<!DOCTYPE html><p>unusual traffic</p>",
            "https://cdn.test/caption"
        ));
        assert!(!is_blocked_caption_response(
            Some("text/vtt"),
            "WEBVTT",
            "https://yt.test/api/timedtext?v=1"
        ));
    }
}
