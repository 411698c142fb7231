//! Transcript acquisition cascade against a mocked YouTube.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use docsum_models::NormalizedVideoUrl;
use docsum_worker::transcript::{
    ExtractedSubtitles, SubtitleExtractor, TranscriptAcquirer, TranscriptConfig, TranscriptError,
    TranscriptProvider, TranscriptResult, TranscriptSource,
};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VIDEO_URL: &str = "https://youtu.be/abcdefghijk";

fn acquirer(server: &MockServer) -> TranscriptAcquirer {
    TranscriptAcquirer::new(TranscriptConfig::default().with_base_url(server.uri()))
}

struct StubExtractor {
    calls: AtomicUsize,
}

#[async_trait]
impl SubtitleExtractor for StubExtractor {
    async fn extract(&self, video: &NormalizedVideoUrl) -> TranscriptResult<ExtractedSubtitles> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(video.video_id, "abcdefghijk");
        Ok(ExtractedSubtitles {
            transcript: "extracted words".to_string(),
            language_code: Some("ko".to_string()),
            title: None,
        })
    }
}

async fn mount_innertube_failure(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/youtubei/v1/player"))
        .respond_with(ResponseTemplate::new(500))
        .mount(server)
        .await;
}

#[tokio::test]
async fn selects_english_auto_track_when_it_is_the_only_one() {
    let server = MockServer::start().await;
    let base_url = format!("{}/api/timedtext?v=abcdefghijk&lang=en&kind=asr", server.uri());

    Mock::given(method("POST"))
        .and(path("/youtubei/v1/player"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "videoDetails": { "title": "Rust in Production" },
            "captions": { "playerCaptionsTracklistRenderer": { "captionTracks": [
                { "baseUrl": base_url, "languageCode": "en", "kind": "asr" }
            ]}}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/timedtext"))
        .and(query_param("lang", "en"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [
                { "segs": [{ "utf8": "ownership" }, { "utf8": " and borrowing" }] },
                { "segs": [{ "utf8": "[Music]" }] }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transcript = acquirer(&server).acquire(VIDEO_URL).await.unwrap();

    assert_eq!(transcript.transcript, "ownership and borrowing");
    assert_eq!(transcript.language_code, "en");
    assert_eq!(transcript.title, "Rust in Production");
    assert_eq!(transcript.video_id, "abcdefghijk");
    assert_eq!(transcript.normalized_url, "https://www.youtube.com/watch?v=abcdefghijk");
    assert_eq!(transcript.provider, TranscriptProvider::Captions);
}

#[tokio::test]
async fn watch_page_fallback_probes_synthetic_languages() {
    let server = MockServer::start().await;
    mount_innertube_failure(&server).await;

    let html = r#"<!DOCTYPE html><html><script>var ytInitialPlayerResponse = {"videoDetails":{"title":"Scraped"}};</script></html>"#;
    Mock::given(method("GET"))
        .and(path("/watch"))
        .and(query_param("v", "abcdefghijk"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/timedtext"))
        .and(query_param("lang", "en"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "WEBVTT\n\n00:00:00.000 --> 00:00:01.000\nhello from vtt\n",
            "text/vtt",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/timedtext"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let transcript = acquirer(&server).acquire(VIDEO_URL).await.unwrap();

    assert_eq!(transcript.transcript, "hello from vtt");
    assert_eq!(transcript.language_code, "en");
    assert_eq!(transcript.title, "Scraped");
}

#[tokio::test]
async fn no_captions_anywhere_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/youtubei/v1/player"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "videoDetails": { "title": "Silent film" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/timedtext"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<transcript/>", "text/xml"))
        .mount(&server)
        .await;

    let err = acquirer(&server).acquire(VIDEO_URL).await.unwrap_err();
    assert!(matches!(err, TranscriptError::Unavailable(_)), "{err}");
}

#[tokio::test]
async fn blocked_captions_invoke_the_extractor() {
    let server = MockServer::start().await;
    let base_url = format!("{}/api/timedtext?v=abcdefghijk&lang=ko", server.uri());
    Mock::given(method("POST"))
        .and(path("/youtubei/v1/player"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "videoDetails": { "title": "Blocked video" },
            "captions": { "playerCaptionsTracklistRenderer": { "captionTracks": [
                { "baseUrl": base_url, "languageCode": "ko" }
            ]}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/timedtext"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html><body>Our systems have detected unusual traffic</body></html>", "text/html"),
        )
        .mount(&server)
        .await;

    let without_extractor = acquirer(&server).acquire(VIDEO_URL).await.unwrap_err();
    assert!(matches!(without_extractor, TranscriptError::Blocked(_)));

    let extractor = Arc::new(StubExtractor {
        calls: AtomicUsize::new(0),
    });
    let transcript = acquirer(&server)
        .with_extractor(extractor.clone())
        .acquire(VIDEO_URL)
        .await
        .unwrap();

    assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(transcript.transcript, "extracted words");
    assert_eq!(transcript.title, "Blocked video");
    assert_eq!(transcript.language_code, "ko");
    assert_eq!(transcript.provider, TranscriptProvider::Extractor);
}

#[tokio::test]
async fn blocked_watch_page_invokes_the_extractor() {
    let server = MockServer::start().await;
    mount_innertube_failure(&server).await;
    Mock::given(method("GET"))
        .and(path("/watch"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html><body>Before you continue to YouTube</body></html>",
            "text/html",
        ))
        .mount(&server)
        .await;

    let err = acquirer(&server).acquire(VIDEO_URL).await.unwrap_err();
    assert!(matches!(err, TranscriptError::Blocked(_)));

    let extractor = Arc::new(StubExtractor {
        calls: AtomicUsize::new(0),
    });
    let transcript = acquirer(&server)
        .with_extractor(extractor.clone())
        .acquire(VIDEO_URL)
        .await
        .unwrap();
    assert_eq!(transcript.title, "(unknown)");
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unparseable_watch_page_is_metadata_failure() {
    let server = MockServer::start().await;
    mount_innertube_failure(&server).await;
    Mock::given(method("GET"))
        .and(path("/watch"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html><body>plain page</body></html>", "text/html"))
        .mount(&server)
        .await;

    let err = acquirer(&server).acquire(VIDEO_URL).await.unwrap_err();
    assert!(matches!(err, TranscriptError::MetadataFetchFailed(_)));
}
