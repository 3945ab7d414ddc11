use std::path::PathBuf;

use tracing::info;

use crate::error::{Error, Result};
use crate::io::{Transcriber, parse_plain_text};
use crate::models::{TranscriptChunk, validate_chunks};

/// Where a run's transcript comes from
#[derive(Debug, Clone)]
pub enum TranscriptSource {
    Chunks(Vec<TranscriptChunk>),
    /// Plain text, one chunk per non-blank line
    Text(String),
    /// Audio handed to the configured transcriber
    Audio(PathBuf),
}

/// Turn a source into validated chunks.
///
/// An empty result is not an error here; the caller decides whether a sample
/// transcript may stand in.
pub async fn acquire_transcript(
    source: TranscriptSource,
    transcriber: Option<&dyn Transcriber>,
) -> Result<Vec<TranscriptChunk>> {
    let chunks = match source {
        TranscriptSource::Chunks(chunks) => chunks,
        TranscriptSource::Text(text) => parse_plain_text(&text),
        TranscriptSource::Audio(path) => {
            let transcriber = transcriber
                .ok_or_else(|| Error::config(format!("no transcriber configured for audio input {:?}", path)))?;
            let transcription = transcriber.transcribe(&path).await?;
            transcription.into_chunks()
        }
    };

    validate_chunks(&chunks)?;
    info!("Acquired {} transcript chunks", chunks.len());
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use async_trait::async_trait;

    use super::*;
    use crate::models::{Speaker, TranscriptSegment, Transcription};

    struct FixedTranscriber(Transcription);

    #[async_trait]
    impl Transcriber for FixedTranscriber {
        async fn transcribe(&self, _audio: &Path) -> Result<Transcription> {
            Ok(self.0.clone())
        }
    }

    struct BrokenTranscriber;

    #[async_trait]
    impl Transcriber for BrokenTranscriber {
        async fn transcribe(&self, _audio: &Path) -> Result<Transcription> {
            Err(Error::Transcription("model not loaded".to_string()))
        }
    }

    fn segment(text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start: 0.0,
            end: 1.0,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_chunks_are_validated() {
        let duplicate = vec![
            TranscriptChunk::new("a", Speaker::Coach, "x").unwrap(),
            TranscriptChunk::new("a", Speaker::Teacher, "y").unwrap(),
        ];

        let result = acquire_transcript(TranscriptSource::Chunks(duplicate), None).await;

        assert!(matches!(result, Err(Error::Input(_))));
    }

    #[tokio::test]
    async fn test_text_source() {
        let chunks = acquire_transcript(TranscriptSource::Text("coach: hi\n\nteacher: hello".to_string()), None)
            .await
            .unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].speaker, Speaker::Coach);
    }

    #[tokio::test]
    async fn test_audio_segments_become_chunks() {
        let transcriber = FixedTranscriber(Transcription {
            full_text: "first third".to_string(),
            segments: vec![segment("first"), segment("  "), segment("third")],
        });

        let chunks = acquire_transcript(TranscriptSource::Audio("a.wav".into()), Some(&transcriber))
            .await
            .unwrap();

        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["seg1", "seg3"]);
        assert!(chunks.iter().all(|c| c.speaker == Speaker::Teacher));
    }

    #[tokio::test]
    async fn test_audio_without_segments_uses_full_text() {
        let transcriber = FixedTranscriber(Transcription {
            full_text: "only text".to_string(),
            segments: vec![],
        });

        let chunks = acquire_transcript(TranscriptSource::Audio("a.wav".into()), Some(&transcriber))
            .await
            .unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "t1");
        assert_eq!(chunks[0].text, "only text");
    }

    #[tokio::test]
    async fn test_silent_audio_yields_no_chunks() {
        let transcriber = FixedTranscriber(Transcription::default());

        let chunks = acquire_transcript(TranscriptSource::Audio("a.wav".into()), Some(&transcriber))
            .await
            .unwrap();

        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_audio_errors() {
        let missing = acquire_transcript(TranscriptSource::Audio("a.wav".into()), None).await;
        assert!(matches!(missing, Err(Error::Config(_))));

        let broken = acquire_transcript(TranscriptSource::Audio("a.wav".into()), Some(&BrokenTranscriber)).await;
        assert!(matches!(broken, Err(Error::Transcription(_))));
    }
}
