//! Player metadata: innertube API first, watch page scrape second.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, COOKIE, ORIGIN, REFERER, USER_AGENT};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::{TranscriptError, TranscriptResult};
use super::TranscriptConfig;

pub const INNERTUBE_CLIENT_NAME: &str = "WEB";
pub const INNERTUBE_CLIENT_VERSION: &str = "2.20231219.01.00";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";
const BROWSER_ACCEPT_LANGUAGE: &str = "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7";
const CONSENT_COOKIE: &str = "CONSENT=YES+cb.20210328-17-p0.en+FX+667; SOCS=CAI; PREF=hl=ko";

const PLAYER_RESPONSE_MARKERS: [&str; 3] = [
    "var ytInitialPlayerResponse = ",
    "ytInitialPlayerResponse = ",
    "window[\"ytInitialPlayerResponse\"] = ",
];

const BLOCKED_BODY_MARKERS: [&str; 8] = [
    "consent.youtube.com",
    "before you continue to youtube",
    "sign in to confirm you",
    "unusual traffic",
    "detected unusual traffic",
    "www.google.com/sorry",
    "captcha",
    "automated queries",
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResponse {
    #[serde(default)]
    pub video_details: Option<VideoDetails>,
    #[serde(default)]
    pub captions: Option<Captions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoDetails {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Captions {
    #[serde(default)]
    pub player_captions_tracklist_renderer: Option<TracklistRenderer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracklistRenderer {
    #[serde(default)]
    pub caption_tracks: Option<Vec<CaptionTrack>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTrack {
    #[serde(default)]
    pub base_url: Option<String>,
    /// `asr` for auto-generated tracks
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
}

impl CaptionTrack {
    pub fn synthetic(language_code: &str) -> Self {
        Self {
            base_url: None,
            kind: None,
            language_code: Some(language_code.to_string()),
        }
    }

    pub fn is_auto_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }
}

impl PlayerResponse {
    pub fn title(&self) -> Option<String> {
        self.video_details
            .as_ref()
            .and_then(|details| details.title.as_deref())
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map(str::to_string)
    }

    pub fn caption_tracks(&self) -> Vec<CaptionTrack> {
        self.captions
            .as_ref()
            .and_then(|c| c.player_captions_tracklist_renderer.as_ref())
            .and_then(|r| r.caption_tracks.clone())
            .unwrap_or_default()
    }

    fn is_empty(&self) -> bool {
        self.video_details.is_none() && self.captions.is_none()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InnertubeRequest<'a> {
    video_id: &'a str,
    context: InnertubeContext,
}

#[derive(Serialize)]
struct InnertubeContext {
    client: InnertubeClient,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InnertubeClient {
    client_name: &'static str,
    client_version: &'static str,
    hl: &'static str,
    gl: &'static str,
}

/// Browser-like headers sent with watch page and caption requests.
pub fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/plain,text/vtt,application/json,application/xml,text/xml,text/html;q=0.9,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE));
    headers.insert(ORIGIN, HeaderValue::from_static("https://www.youtube.com"));
    headers.insert(REFERER, HeaderValue::from_static("https://www.youtube.com/"));
    headers.insert(COOKIE, HeaderValue::from_static(CONSENT_COOKIE));
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers
}

/// Fetch player metadata, innertube first.
pub async fn fetch_player_response(
    http: &Client,
    config: &TranscriptConfig,
    video_id: &str,
) -> TranscriptResult<PlayerResponse> {
    if let Some(player) = fetch_via_innertube(http, config, video_id).await {
        return Ok(player);
    }
    fetch_via_watch_page(http, config, video_id).await
}

/// `None` on any failure so the caller can fall back to the watch page.
async fn fetch_via_innertube(
    http: &Client,
    config: &TranscriptConfig,
    video_id: &str,
) -> Option<PlayerResponse> {
    let url = format!("{}/youtubei/v1/player", config.base_url);
    let body = InnertubeRequest {
        video_id,
        context: InnertubeContext {
            client: InnertubeClient {
                client_name: INNERTUBE_CLIENT_NAME,
                client_version: INNERTUBE_CLIENT_VERSION,
                hl: "ko",
                gl: "KR",
            },
        },
    };

    let response = http
        .post(&url)
        .timeout(config.watch_timeout)
        .header(CONTENT_TYPE, "application/json")
        .header(USER_AGENT, BROWSER_USER_AGENT)
        .header(ACCEPT, "*/*")
        .header(ACCEPT_LANGUAGE, BROWSER_ACCEPT_LANGUAGE)
        .header(ORIGIN, "https://www.youtube.com")
        .header(REFERER, "https://www.youtube.com/")
        .header("x-youtube-client-name", "1")
        .header("x-youtube-client-version", INNERTUBE_CLIENT_VERSION)
        .json(&body)
        .send()
        .await;

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            info!(video_id = %video_id, error = %e, "Innertube player request failed");
            return None;
        }
    };

    if !response.status().is_success() {
        info!(video_id = %video_id, status = response.status().as_u16(), "Innertube player not ok");
        return None;
    }

    match response.json::<PlayerResponse>().await {
        Ok(player) if !player.is_empty() => Some(player),
        Ok(_) => {
            debug!(video_id = %video_id, "Innertube player response had no details or captions");
            None
        }
        Err(e) => {
            info!(video_id = %video_id, error = %e, "Innertube player response undecodable");
            None
        }
    }
}

async fn fetch_via_watch_page(
    http: &Client,
    config: &TranscriptConfig,
    video_id: &str,
) -> TranscriptResult<PlayerResponse> {
    let url = format!("{}/watch?v={}&hl=ko", config.base_url, video_id);

    let response = http
        .get(&url)
        .timeout(config.watch_timeout)
        .headers(browser_headers())
        .send()
        .await
        .map_err(|e| {
            TranscriptError::metadata_fetch_failed(format!("YouTube metadata request failed: {e}"))
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(TranscriptError::metadata_fetch_failed(format!(
            "YouTube metadata request returned {}",
            status.as_u16()
        )));
    }

    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let html = response.text().await.map_err(|e| {
        TranscriptError::metadata_fetch_failed(format!("YouTube metadata body unreadable: {e}"))
    })?;

    match extract_player_response(&html) {
        Some(player) => Ok(player),
        None if is_blocked_watch_page(content_type.as_deref(), &html, &final_url) => {
            Err(TranscriptError::blocked(
                "YouTube blocked the server request for video metadata",
            ))
        }
        None => Err(TranscriptError::metadata_fetch_failed(
            "Could not parse YouTube player metadata",
        )),
    }
}

/// Find `ytInitialPlayerResponse` in watch page HTML.
pub fn extract_player_response(html: &str) -> Option<PlayerResponse> {
    PLAYER_RESPONSE_MARKERS.iter().find_map(|marker| {
        let index = html.find(marker)?;
        let block = extract_json_block(html, index + marker.len())?;
        serde_json::from_str(block).ok()
    })
}

/// Return the balanced `{...}` object starting at or after `from`.
///
/// Braces inside JSON strings (including escaped quotes) are ignored.
pub fn extract_json_block(source: &str, from: usize) -> Option<&str> {
    let start = from + source.get(from..)?.find('{')?;
    let bytes = source.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return source.get(start..=start + offset);
                }
            }
            _ => {}
        }
    }

    None
}

pub fn looks_like_html(content_type: Option<&str>, lowered_body: &str) -> bool {
    content_type
        .map(|ct| ct.to_lowercase().contains("text/html"))
        .unwrap_or(false)
        || lowered_body.contains("<html")
        || lowered_body.contains("<!doctype html")
}

pub fn has_blocked_marker(lowered_body: &str) -> bool {
    BLOCKED_BODY_MARKERS
        .iter()
        .any(|marker| lowered_body.contains(marker))
}

/// Consent, captcha or "unusual traffic" interstitial instead of a watch page.
pub fn is_blocked_watch_page(content_type: Option<&str>, body: &str, final_url: &str) -> bool {
    let lowered = body.to_lowercase();
    if !looks_like_html(content_type, &lowered) {
        return false;
    }
    if final_url.contains("consent.youtube.com") || final_url.contains("google.com/sorry") {
        return true;
    }
    body.trim().is_empty() || has_blocked_marker(&lowered)
}
