use serde::{Deserialize, Serialize};

use super::{RubricStep, TranscriptChunk, validate_chunks};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ko,
    En,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Self::Ko => "ko",
            Self::En => "en",
        }
    }
}

impl std::str::FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ko" => Ok(Self::Ko),
            "en" => Ok(Self::En),
            other => Err(Error::input(format!("unsupported language {:?} (expected ko or en)", other))),
        }
    }
}

/// Execution mode of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Local,
    Cloud,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cloud => "cloud",
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "cloud" => Ok(Self::Cloud),
            other => Err(Error::input(format!("unsupported mode {:?} (expected local or cloud)", other))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<Language>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassroomObservation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskArtifact {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Everything feedback generation needs for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationInput {
    pub transcript_chunks: Vec<TranscriptChunk>,
    pub step_focus: RubricStep,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_steps: Option<Vec<RubricStep>>,
    #[serde(default)]
    pub language: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SessionMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<ClassroomObservation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<TaskArtifact>>,
}

impl GenerationInput {
    /// Create an input; fails with a validation error when there are no chunks
    pub fn new(transcript_chunks: Vec<TranscriptChunk>, step_focus: RubricStep) -> Result<Self> {
        let input = Self {
            transcript_chunks,
            step_focus,
            secondary_steps: None,
            language: Language::default(),
            metadata: None,
            observation: None,
            artifacts: None,
        };
        input.validate()?;
        Ok(input)
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_secondary_steps(mut self, steps: Vec<RubricStep>) -> Self {
        self.secondary_steps = Some(steps);
        self
    }

    pub fn with_metadata(mut self, metadata: SessionMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.transcript_chunks.is_empty() {
            return Err(Error::validation("generation input needs at least one transcript chunk"));
        }
        validate_chunks(&self.transcript_chunks).map_err(|e| Error::validation(e.to_string()))
    }
}

pub const MAX_PRAISE_CHARS: usize = 600;
pub const MAX_IMPROVEMENT_CHARS: usize = 700;
pub const MAX_WHY_CHARS: usize = 900;
pub const MAX_LINK_CHARS: usize = 400;
pub const MAX_NEXT_STEP_CHARS: usize = 600;
pub const MAX_EVIDENCE_QUOTES: usize = 2;

/// Text fields of a feedback object, before bounds checking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackDraft {
    pub praise: String,
    pub improvement: String,
    pub why_it_matters: String,
    #[serde(deserialize_with = "one_or_many")]
    pub evidence_quote: Vec<String>,
    pub student_learning_link: String,
    pub next_step: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(quote) => vec![quote],
        OneOrMany::Many(quotes) => quotes,
    })
}

/// The bounded feedback object handed to callers and collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FeedbackWire")]
pub struct FeedbackOutput {
    pub step_focus: RubricStep,
    pub praise: String,
    pub improvement: String,
    pub why_it_matters: String,
    pub evidence_quote: Vec<String>,
    pub student_learning_link: String,
    pub next_step: String,
    pub confidence: f64,
}

#[derive(Deserialize)]
struct FeedbackWire {
    step_focus: RubricStep,
    praise: String,
    improvement: String,
    why_it_matters: String,
    evidence_quote: Vec<String>,
    student_learning_link: String,
    next_step: String,
    confidence: f64,
}

impl TryFrom<FeedbackWire> for FeedbackOutput {
    type Error = Error;

    fn try_from(wire: FeedbackWire) -> Result<Self> {
        let draft = FeedbackDraft {
            praise: wire.praise,
            improvement: wire.improvement,
            why_it_matters: wire.why_it_matters,
            evidence_quote: wire.evidence_quote,
            student_learning_link: wire.student_learning_link,
            next_step: wire.next_step,
            confidence: None,
        };
        FeedbackOutput::from_draft(wire.step_focus, draft, wire.confidence)
    }
}

impl FeedbackOutput {
    /// Trim every text field and check the field bounds.
    ///
    /// The draft's own confidence is ignored; `confidence` is used instead.
    pub fn from_draft(step_focus: RubricStep, draft: FeedbackDraft, confidence: f64) -> Result<Self> {
        let output = Self {
            step_focus,
            praise: draft.praise.trim().to_string(),
            improvement: draft.improvement.trim().to_string(),
            why_it_matters: draft.why_it_matters.trim().to_string(),
            evidence_quote: draft.evidence_quote.iter().map(|q| q.trim().to_string()).collect(),
            student_learning_link: draft.student_learning_link.trim().to_string(),
            next_step: draft.next_step.trim().to_string(),
            confidence,
        };
        output.validate()?;
        Ok(output)
    }

    pub fn validate(&self) -> Result<()> {
        check_text("praise", &self.praise, MAX_PRAISE_CHARS)?;
        check_text("improvement", &self.improvement, MAX_IMPROVEMENT_CHARS)?;
        check_text("why_it_matters", &self.why_it_matters, MAX_WHY_CHARS)?;
        check_text("student_learning_link", &self.student_learning_link, MAX_LINK_CHARS)?;
        check_text("next_step", &self.next_step, MAX_NEXT_STEP_CHARS)?;

        if self.evidence_quote.is_empty() || self.evidence_quote.len() > MAX_EVIDENCE_QUOTES {
            return Err(Error::validation(format!(
                "evidence_quote must hold 1-{} quotes, got {}",
                MAX_EVIDENCE_QUOTES,
                self.evidence_quote.len()
            )));
        }
        if self.evidence_quote.iter().any(|q| q.is_empty()) {
            return Err(Error::validation("evidence_quote contains an empty quote"));
        }

        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::validation(format!(
                "confidence {} is outside [0, 1]",
                self.confidence
            )));
        }

        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::json("serializing feedback", e))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::validation(format!("invalid feedback JSON: {}", e)))
    }
}

fn check_text(field: &str, value: &str, max_chars: usize) -> Result<()> {
    let len = value.chars().count();
    if len == 0 {
        return Err(Error::validation(format!("{} is empty", field)));
    }
    if len > max_chars {
        return Err(Error::validation(format!(
            "{} has {} characters (max {})",
            field, len, max_chars
        )));
    }
    Ok(())
}
