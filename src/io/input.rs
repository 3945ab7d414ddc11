use std::path::Path;

use anyhow::{Context, Result};

use crate::error::Error;
use crate::models::{Speaker, TranscriptChunk, validate_chunks};

/// Read a transcript file: JSON when the extension is `.json` or the content
/// starts with `[`, plain text otherwise
pub fn read_transcript_file(path: &Path) -> Result<Vec<TranscriptChunk>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {:?}", path))?;

    let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        || content.trim_start().starts_with('[');

    if is_json {
        parse_transcript_json(&content).with_context(|| format!("Failed to parse transcript JSON: {:?}", path))
    } else {
        Ok(parse_plain_text(&content))
    }
}

/// Parse a JSON array of `{id, speaker, text, ts?}` chunks
pub fn parse_transcript_json(json: &str) -> crate::error::Result<Vec<TranscriptChunk>> {
    let chunks: Vec<TranscriptChunk> =
        serde_json::from_str(json).map_err(|e| Error::input(format!("malformed transcript JSON: {}", e)))?;
    validate_chunks(&chunks)?;
    Ok(chunks)
}

/// One chunk per non-blank line, ids `t1..tn`.
///
/// A leading `coach:` or `teacher:` sets the speaker; anything else is
/// attributed to the teacher.
pub fn parse_plain_text(text: &str) -> Vec<TranscriptChunk> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(split_speaker)
        .enumerate()
        .map(|(i, (speaker, line))| TranscriptChunk {
            id: format!("t{}", i + 1),
            speaker,
            text: line.to_string(),
            timestamp: None,
        })
        .collect()
}

fn split_speaker(line: &str) -> Option<(Speaker, &str)> {
    let (speaker, rest) = match line.split_once(':') {
        Some((prefix, rest)) if prefix.trim().eq_ignore_ascii_case("coach") => (Speaker::Coach, rest),
        Some((prefix, rest)) if prefix.trim().eq_ignore_ascii_case("teacher") => (Speaker::Teacher, rest),
        _ => (Speaker::Teacher, line),
    };
    let rest = rest.trim();
    // "coach:" alone carries no text
    (!rest.is_empty()).then_some((speaker, rest))
}
