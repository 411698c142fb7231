//! Deterministic extractive summaries for when generation is unavailable.
//!
//! Output always has the `TL;DR` / three bullets / `Full Summary` layout so it
//! passes the same format check as generated text. Nothing here touches the
//! network.

use docsum_models::ErrorCode;

use crate::transcript::{clip_text, VideoTranscript};

const TLDR_BULLETS: usize = 3;
const TEXT_BODY_SENTENCES: usize = 6;
const TRANSCRIPT_BODY_SENTENCES: usize = 8;
const BULLET_MAX_CHARS: usize = 240;
const WORDS_PER_CHUNK: usize = 25;

const PLACEHOLDER_BULLETS: [&str; TLDR_BULLETS] = [
    "The source contained too little content to extract a key point.",
    "No further key points could be extracted from the source.",
    "Review the full text for additional details.",
];

/// What the fallback is built from.
#[derive(Debug, Clone, Copy)]
pub enum FallbackSource<'a> {
    Text(&'a str),
    /// Video without a usable transcript
    Video {
        url: &'a str,
        video_id: Option<&'a str>,
    },
    Transcript(&'a VideoTranscript),
}

/// Split text into sentences on `.`, `!`, `?` and their full-width forms.
///
/// A terminator only ends a sentence when followed by whitespace or the end
/// of the text, so decimals and URLs stay intact.
pub fn split_sentences(text: &str) -> Vec<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = collapsed.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let terminator = matches!(c, '.' | '!' | '?' | '。' | '！' | '？');
        let at_boundary = chars.peek().map(|next| next.is_whitespace()).unwrap_or(true);
        if terminator && at_boundary {
            let sentence = current.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            current.clear();
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

/// Markup-only fragments (`* *`, `--`) vanish under normalization.
fn has_content(text: &str) -> bool {
    text.chars().any(char::is_alphanumeric)
}

fn word_chunks(text: &str) -> Vec<String> {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .chunks(WORDS_PER_CHUNK)
        .map(|chunk| chunk.join(" "))
        .collect()
}

/// Pick up to `count` items spread evenly across `items`.
pub fn pick_evenly<T: Clone>(items: &[T], count: usize) -> Vec<T> {
    let n = items.len();
    if n <= count {
        return items.to_vec();
    }
    (0..count).map(|i| items[i * n / count].clone()).collect()
}

fn render(bullets: &[String], body: &str) -> String {
    let mut lines = vec!["TL;DR".to_string()];
    for index in 0..TLDR_BULLETS {
        let bullet = bullets
            .get(index)
            .map(|b| clip_text(b, BULLET_MAX_CHARS))
            .filter(|b| has_content(b))
            .unwrap_or_else(|| PLACEHOLDER_BULLETS[index].to_string());
        lines.push(format!("- {bullet}"));
    }
    lines.push(String::new());
    lines.push("Full Summary".to_string());
    lines.push(body.trim().to_string());
    lines.join("\n")
}

fn text_fallback(content: &str, reason: ErrorCode) -> String {
    let mut sentences = split_sentences(content);
    sentences.retain(|s| has_content(s));
    let bullets: Vec<String> = sentences.iter().take(TLDR_BULLETS).cloned().collect();

    let excerpt = sentences
        .iter()
        .take(TEXT_BODY_SENTENCES)
        .cloned()
        .collect::<Vec<_>>()
        .join(" ");
    let excerpt = if excerpt.is_empty() {
        "The source text contained no content that could be summarized.".to_string()
    } else {
        excerpt
    };

    let body = format!(
        "{excerpt}\n\n(An automatic summary could not be generated [{reason}]. \
         This summary was extracted from the opening of the original text.)"
    );
    render(&bullets, &body)
}

fn video_fallback(url: &str, video_id: Option<&str>, reason: ErrorCode) -> String {
    let reference = video_id.unwrap_or(url);
    let bullets = vec![
        format!("The video {reference} could not be summarized automatically."),
        format!("Its transcript or content could not be retrieved [{reason}]."),
        "Open the video directly or request the summary again later.".to_string(),
    ];
    let body = format!(
        "Video: {url}\n\nAn automatic summary could not be produced because the video's \
         transcript could not be retrieved [{reason}]. No content from the video is included."
    );
    render(&bullets, &body)
}

fn transcript_fallback(transcript: &VideoTranscript, reason: ErrorCode) -> String {
    let mut units = split_sentences(&transcript.transcript);
    if units.len() <= 1 {
        units = word_chunks(&transcript.transcript);
    }
    units.retain(|u| has_content(u));

    let bullets = pick_evenly(&units, TLDR_BULLETS);
    let excerpt = pick_evenly(&units, TRANSCRIPT_BODY_SENTENCES).join(" ");
    let excerpt = if excerpt.is_empty() {
        "The transcript contained no content that could be summarized.".to_string()
    } else {
        excerpt
    };

    let body = format!(
        "Video: {} ({})\nCaption language: {}\n\n{excerpt}\n\n(An automatic summary could not \
         be generated [{reason}]. These passages were selected from across the transcript.)",
        transcript.title, transcript.normalized_url, transcript.language_code
    );
    render(&bullets, &body)
}

/// Build a summary without calling a model.
pub fn build_fallback(source: FallbackSource<'_>, reason: ErrorCode) -> String {
    match source {
        FallbackSource::Text(content) => text_fallback(content, reason),
        FallbackSource::Video { url, video_id } => video_fallback(url, video_id, reason),
        FallbackSource::Transcript(transcript) => transcript_fallback(transcript, reason),
    }
}
