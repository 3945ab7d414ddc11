use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Who spoke a chunk of transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Coach,
    #[default]
    Teacher,
    Other,
}

/// One attributed span of transcript text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptChunk {
    /// Unique within a transcript
    pub id: String,
    pub speaker: Speaker,
    pub text: String,
    /// ISO-8601 timestamp
    #[serde(rename = "ts", alias = "timestamp", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl TranscriptChunk {
    pub fn new(id: impl Into<String>, speaker: Speaker, text: impl Into<String>) -> Result<Self> {
        let chunk = Self {
            id: id.into(),
            speaker,
            text: text.into(),
            timestamp: None,
        };
        chunk.validate()?;
        Ok(chunk)
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::input("transcript chunk has an empty id"));
        }
        if self.text.trim().is_empty() {
            return Err(Error::input(format!("transcript chunk {} has empty text", self.id)));
        }
        Ok(())
    }
}

/// Validate a whole transcript: every chunk valid, ids unique
pub fn validate_chunks(chunks: &[TranscriptChunk]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for chunk in chunks {
        chunk.validate()?;
        if !seen.insert(chunk.id.as_str()) {
            return Err(Error::input(format!("duplicate transcript chunk id {}", chunk.id)));
        }
    }
    Ok(())
}

/// A timed segment returned by a transcription service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Output of the transcription capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    #[serde(rename = "text", alias = "full_text", default)]
    pub full_text: String,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
}

impl Transcription {
    /// Convert segments into teacher-attributed chunks `seg1..segN`.
    ///
    /// Blank segments are skipped. When no segment yields a chunk, the full
    /// text becomes a single chunk `t1`.
    pub fn into_chunks(self) -> Vec<TranscriptChunk> {
        let mut chunks: Vec<TranscriptChunk> = self
            .segments
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.text.trim().is_empty())
            .map(|(i, s)| TranscriptChunk {
                id: format!("seg{}", i + 1),
                speaker: Speaker::Teacher,
                text: s.text.trim().to_string(),
                timestamp: None,
            })
            .collect();

        if chunks.is_empty() && !self.full_text.trim().is_empty() {
            chunks.push(TranscriptChunk {
                id: "t1".to_string(),
                speaker: Speaker::Teacher,
                text: self.full_text.trim().to_string(),
                timestamp: None,
            });
        }

        chunks
    }
}

/// Built-in demo transcript for runs that permit a sample fallback
pub fn sample_transcript() -> Vec<TranscriptChunk> {
    [
        ("t1", Speaker::Teacher, "지난 시간에 질문 뒤 2초를 기다리니 더 많은 학생이 손을 들었어요."),
        ("t2", Speaker::Coach, "좋아요. 다음에도 일관되게 적용해볼까요?"),
        ("t3", Speaker::Teacher, "네. 도입 질문마다 체크리스트로 표시해 보겠습니다."),
    ]
    .into_iter()
    .map(|(id, speaker, text)| TranscriptChunk {
        id: id.to_string(),
        speaker,
        text: text.to_string(),
        timestamp: None,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chunk_json() {
        let json = r#"{"id": "t1", "speaker": "coach", "text": "hello", "ts": "2024-03-01T09:00:00Z"}"#;
        let chunk: TranscriptChunk = serde_json::from_str(json).unwrap();

        assert_eq!(chunk.speaker, Speaker::Coach);
        assert_eq!(chunk.timestamp.as_deref(), Some("2024-03-01T09:00:00Z"));
    }

    #[test]
    fn test_chunk_rejects_blank_text() {
        assert!(TranscriptChunk::new("t1", Speaker::Teacher, "   ").is_err());
        assert!(TranscriptChunk::new("t1", Speaker::Teacher, "ok").is_ok());
    }

    #[test]
    fn test_validate_chunks_rejects_duplicate_ids() {
        let chunks = vec![
            TranscriptChunk::new("a", Speaker::Teacher, "one").unwrap(),
            TranscriptChunk::new("a", Speaker::Coach, "two").unwrap(),
        ];
        assert!(matches!(validate_chunks(&chunks), Err(Error::Input(_))));
    }

    #[test]
    fn test_transcription_into_chunks() {
        let transcription = Transcription {
            full_text: "hello there".to_string(),
            segments: vec![
                TranscriptSegment { start: 0.0, end: 1.0, text: " hello ".to_string() },
                TranscriptSegment { start: 1.0, end: 1.5, text: "  ".to_string() },
                TranscriptSegment { start: 1.5, end: 2.0, text: "there".to_string() },
            ],
        };

        let chunks = transcription.into_chunks();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id, "seg1");
        assert_eq!(chunks[0].text, "hello");
        assert_eq!(chunks[1].id, "seg3");
        assert!(chunks.iter().all(|c| c.speaker == Speaker::Teacher));
    }

    #[test]
    fn test_transcription_falls_back_to_full_text() {
        let transcription = Transcription {
            full_text: "only text".to_string(),
            segments: vec![],
        };

        let chunks = transcription.into_chunks();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "t1");
    }

    #[test]
    fn test_empty_transcription_yields_no_chunks() {
        assert!(Transcription::default().into_chunks().is_empty());
    }
}
