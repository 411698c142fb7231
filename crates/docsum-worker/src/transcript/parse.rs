//! Caption body parsers.
//!
//! All parsers collapse whitespace, drop bracket-only cues such as `[Music]`
//! and skip a cue that repeats the previous one.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Deserialize;

static BRACKET_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[[^\]]+\]$").expect("valid bracket regex"));
static XML_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<text\b[^>]*>(.*?)</text>").expect("valid xml cue regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));
static DEC_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(\d+);").expect("valid decimal entity regex"));
static HEX_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)&#x([0-9a-f]+);").expect("valid hex entity regex"));
static VTT_SKIP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:webvtt|kind:\s+.*|language:\s+.*|note(?:\s.*)?|style(?:\s.*)?|region(?:\s.*)?|\d+)$",
    )
    .expect("valid vtt header regex")
});
static VTT_TIMING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d{2}:)?\d{2}:\d{2}\.\d{3}\s+-->\s+(?:\d{2}:)?\d{2}:\d{2}\.\d{3}(?:\s+.+)?$")
        .expect("valid vtt timing regex")
});

#[derive(Debug, Deserialize)]
struct Json3Payload {
    #[serde(default)]
    events: Option<Vec<Json3Event>>,
}

#[derive(Debug, Deserialize)]
struct Json3Event {
    #[serde(default)]
    segs: Option<Vec<Json3Segment>>,
}

#[derive(Debug, Deserialize)]
struct Json3Segment {
    #[serde(default)]
    utf8: Option<String>,
}

/// Collapse whitespace; bracket-only cues become empty.
pub fn normalize_chunk(value: &str) -> String {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if BRACKET_ONLY.is_match(&normalized) {
        return String::new();
    }
    normalized
}

pub fn decode_html_entities(value: &str) -> String {
    let basic = value
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    let decimal = DEC_ENTITY.replace_all(&basic, |caps: &Captures| {
        caps[1]
            .parse::<u32>()
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });

    HEX_ENTITY
        .replace_all(&decimal, |caps: &Captures| {
            u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_default()
        })
        .into_owned()
}

fn join_unique<I: IntoIterator<Item = String>>(chunks: I) -> String {
    let mut unique: Vec<String> = Vec::new();
    for chunk in chunks {
        if chunk.is_empty() || unique.last() == Some(&chunk) {
            continue;
        }
        unique.push(chunk);
    }
    unique.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a json3 caption payload (`events[].segs[].utf8`).
pub fn parse_json3(raw: &str) -> String {
    let Ok(payload) = serde_json::from_str::<Json3Payload>(raw) else {
        return String::new();
    };

    let chunks = payload
        .events
        .unwrap_or_default()
        .into_iter()
        .flat_map(|event| event.segs.unwrap_or_default())
        .map(|segment| normalize_chunk(segment.utf8.as_deref().unwrap_or_default()));
    join_unique(chunks)
}

/// Parse a timedtext XML payload (`<text>` cues).
pub fn parse_xml(raw: &str) -> String {
    let chunks = XML_TEXT
        .captures_iter(raw)
        .map(|caps| normalize_chunk(&decode_html_entities(&caps[1])));
    join_unique(chunks)
}

/// Parse a WebVTT payload.
pub fn parse_vtt(raw: &str) -> String {
    let chunks = raw
        .replace("\r\n", "\n")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !VTT_SKIP.is_match(line))
        .filter(|line| !VTT_TIMING.is_match(line))
        .map(|line| normalize_chunk(&decode_html_entities(&TAG.replace_all(line, ""))))
        .collect::<Vec<_>>();
    join_unique(chunks)
}

/// Parse a caption body, picking the parser from content type and shape.
pub fn parse_caption_body(raw: &str, content_type: Option<&str>) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let content_type = content_type.unwrap_or_default().to_lowercase();
    if content_type.contains("application/json") || trimmed.starts_with('{') {
        return parse_json3(trimmed);
    }
    if content_type.contains("text/xml")
        || content_type.contains("application/xml")
        || trimmed.starts_with('<')
    {
        return parse_xml(trimmed);
    }
    parse_vtt(trimmed)
}

/// Clip to `max_chars` characters, preferring a word boundary past 70% of
/// the budget, and append `...` when clipped.
pub fn clip_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }

    let clipped: String = value.chars().take(max_chars).collect();
    if let Some(byte_index) = clipped.rfind(' ') {
        let char_index = clipped[..byte_index].chars().count();
        if char_index as f64 > max_chars as f64 * 0.7 {
            return format!("{}...", clipped[..byte_index].trim());
        }
    }
    format!("{}...", clipped.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json3() {
        let raw = r#"{"events":[{"segs":[{"utf8":"hello"},{"utf8":"\n"}]},{"segs":[{"utf8":"hello"}]},{"segs":[{"utf8":"[Music]"}]},{"tStartMs":10},{"segs":[{"utf8":" world  again "}]}]}"#;
        assert_eq!(parse_json3(raw), "hello world again");
    }

    #[test]
    fn test_parse_xml_decodes_entities() {
        let raw = r#"<?xml version="1.0"?><transcript><text start="0" dur="1">Tom &amp;amp; Jerry</text><text start="1">it&#39;s &#x41;</text><text start="2">[Applause]</text></transcript>"#;
        assert_eq!(parse_xml(raw), "Tom &amp; Jerry it's A");
    }

    #[test]
    fn test_parse_vtt() {
        let raw = "WEBVTT\nKind: captions\nLanguage: en\n\nNOTE generated\n\n1\n00:00:00.000 --> 00:00:02.000 align:start\n<c>Hello</c> there\n\n00:01.000 --> 00:02.500\nHello there\n\n00:00:02.500 --> 00:00:04.000\nGeneral Kenobi\n";
        assert_eq!(parse_vtt(raw), "Hello there General Kenobi");
    }

    #[test]
    fn test_parse_caption_body_dispatch() {
        assert_eq!(parse_caption_body("  ", None), "");
        assert_eq!(
            parse_caption_body(r#"{"events":[{"segs":[{"utf8":"a"}]}]}"#, Some("text/plain")),
            "a"
        );
        assert_eq!(parse_caption_body("<transcript><text>b</text></transcript>", None), "b");
        assert_eq!(parse_caption_body("WEBVTT\n\n00:00.000 --> 00:01.000\nc", None), "c");
    }

    #[test]
    fn test_clip_text_word_boundary() {
        assert_eq!(clip_text("short", 10), "short");

        let text = "alpha beta gamma delta epsilon";
        // Budget 20 cuts inside "delta"; last space (index 16) is past 70%.
        assert_eq!(clip_text(text, 20), "alpha beta gamma...");

        // No space past 70% of the budget: hard cut.
        assert_eq!(clip_text("a bcdefghijklmnop", 10), "a bcdefghi...");
    }

    #[test]
    fn test_clip_text_multibyte() {
        let text = "안녕하세요 ".repeat(10);
        let clipped = clip_text(&text, 14);
        assert!(clipped.ends_with("..."));
        assert!(clipped.chars().count() <= 17);
    }
}
