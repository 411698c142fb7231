//! Remote transcript worker client against a mocked worker.

use std::time::Duration;

use docsum_worker::transcript::{RemoteTranscriptClient, RemoteTranscriptConfig, TranscriptError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VIDEO: &str = "https://www.youtube.com/watch?v=abcdefghijk";

fn client(server: &MockServer) -> RemoteTranscriptClient {
    RemoteTranscriptClient::new(RemoteTranscriptConfig {
        url: Some(format!("{}/", server.uri())),
        key: Some("secret".to_string()),
        timeout: Duration::from_millis(500),
    })
    .with_max_chars(2_000)
}

#[tokio::test]
async fn sends_key_and_parses_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/youtube-transcript"))
        .and(header("x-transcript-worker-key", "secret"))
        .and(body_partial_json(json!({
            "youtubeUrl": VIDEO,
            "requestId": "req-1",
            "maxChars": 2000
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "transcript": "remote words",
            "videoId": "abcdefghijk",
            "title": "Remote",
            "languageCode": "ja",
            "provider": "yt-dlp",
            "durationMs": 812,
            "requestId": "req-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let payload = client(&server).fetch(VIDEO, Some("req-1")).await.unwrap();
    assert_eq!(payload.transcript, "remote words");
    assert_eq!(payload.language_code, "ja");
    assert_eq!(payload.title.as_deref(), Some("Remote"));
    assert_eq!(payload.duration_ms, 812);
}

#[tokio::test]
async fn maps_worker_error_codes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_json(json!({
            "code": "YOUTUBE_TRANSCRIPT_BLOCKED",
            "message": "sign in to confirm",
            "retryable": false
        })))
        .mount(&server)
        .await;

    let err = client(&server).fetch(VIDEO, None).await.unwrap_err();
    assert_eq!(err, TranscriptError::Blocked("sign in to confirm".to_string()));
}

#[tokio::test]
async fn unknown_errors_and_bad_payloads_are_worker_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "transcript": " ",
            "videoId": "abcdefghijk",
            "languageCode": "en",
            "provider": "yt-dlp",
            "durationMs": 1
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let err = client.fetch(VIDEO, None).await.unwrap_err();
    assert!(matches!(err, TranscriptError::WorkerUnavailable(ref m) if m.contains("500")));

    let err = client.fetch(VIDEO, None).await.unwrap_err();
    assert!(matches!(err, TranscriptError::WorkerUnavailable(ref m) if m.contains("incomplete")));
}

#[tokio::test]
async fn slow_worker_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let err = client(&server).fetch(VIDEO, None).await.unwrap_err();
    assert!(matches!(err, TranscriptError::WorkerTimeout(_)));
}

#[tokio::test]
async fn unconfigured_client_fails_fast() {
    let client = RemoteTranscriptClient::new(RemoteTranscriptConfig::default());
    let err = client.fetch(VIDEO, None).await.unwrap_err();
    assert!(matches!(err, TranscriptError::WorkerUnavailable(_)));
}
