//! Prompt templates.

use crate::transcript::VideoTranscript;

const COMMON_RULES: &str = "\
Write plain text only. Do not use code blocks, JSON or markdown tables.
Do not guess, exaggerate or invent facts (no hallucination).
Never state anything that is not supported by the input.
Follow this output layout exactly:
TL;DR
- key point 1
- key point 2
- key point 3

Full Summary
A structured summary of the input
The TL;DR section must contain exactly three bullets.";

pub fn text_prompt(content: &str) -> String {
    [
        "You are an assistant that summarizes long-form text.",
        COMMON_RULES,
        "Focus on the main claims, the supporting evidence and the conclusion.",
        "",
        "Input text:",
        content,
    ]
    .join("\n")
}

pub fn transcript_prompt(transcript: &VideoTranscript) -> String {
    let input = [
        format!("YouTube URL: {}", transcript.normalized_url),
        format!("Video ID: {}", transcript.video_id),
        format!("Video title: {}", transcript.title),
        format!("Caption language: {}", transcript.language_code),
        String::new(),
        "Video transcript:".to_string(),
        transcript.transcript.clone(),
    ]
    .join("\n");

    [
        "You are an assistant that summarizes YouTube videos.",
        COMMON_RULES,
        "The input contains the video URL, title and transcript.",
        "Base the summary strictly on the transcript provided.",
        "Do not infer facts that the transcript does not contain.",
        "Where possible, cover the topic, main claims, evidence and conclusion.",
        "",
        "Input data:",
        input.as_str(),
    ]
    .join("\n")
}

/// Prompt for direct multimodal generation; the video itself is attached.
pub fn video_prompt(video_url: &str) -> String {
    [
        "You are an assistant that summarizes YouTube videos.",
        COMMON_RULES,
        "The video is attached. Summarize what is actually said and shown in it.",
        "If parts of the video cannot be understood, leave them out rather than guessing.",
        "",
        "YouTube URL:",
        video_url,
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::TranscriptProvider;

    #[test]
    fn test_transcript_prompt_embeds_context() {
        let transcript = VideoTranscript {
            transcript: "hello world".to_string(),
            video_id: "abcdefghijk".to_string(),
            title: "Demo".to_string(),
            language_code: "en".to_string(),
            normalized_url: "https://www.youtube.com/watch?v=abcdefghijk".to_string(),
            provider: TranscriptProvider::Captions,
        };
        let prompt = transcript_prompt(&transcript);
        assert!(prompt.contains("Video ID: abcdefghijk"));
        assert!(prompt.contains("Caption language: en"));
        assert!(prompt.ends_with("hello world"));
        assert!(prompt.contains("TL;DR\n- key point 1"));
    }
}
