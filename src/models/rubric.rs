use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// One of the 12 fixed stages of an instructional-coaching conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RubricStep {
    ReviewPriorProgress = 1,
    FormHypothesis = 2,
    SelectActionStep = 3,
    AgreeClarify = 4,
    ModelDemonstrate = 5,
    ExplainRationale = 6,
    PlanImplementation = 7,
    RehearsePractice = 8,
    FeedbackAdjust = 9,
    ImplementObserve = 10,
    LinkPraiseToStudentLearning = 11,
    NextStepHabit = 12,
}

impl RubricStep {
    pub const ALL: [RubricStep; 12] = [
        Self::ReviewPriorProgress,
        Self::FormHypothesis,
        Self::SelectActionStep,
        Self::AgreeClarify,
        Self::ModelDemonstrate,
        Self::ExplainRationale,
        Self::PlanImplementation,
        Self::RehearsePractice,
        Self::FeedbackAdjust,
        Self::ImplementObserve,
        Self::LinkPraiseToStudentLearning,
        Self::NextStepHabit,
    ];

    /// The system-wide default whenever no step signal exists
    pub const FALLBACK: RubricStep = Self::LinkPraiseToStudentLearning;

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(usize::from(id).checked_sub(1)?).copied()
    }

    /// Human-readable name used in prompts and reports
    pub fn name(self) -> &'static str {
        match self {
            Self::ReviewPriorProgress => "Review prior progress",
            Self::FormHypothesis => "Form hypothesis / observation insight",
            Self::SelectActionStep => "Select action step",
            Self::AgreeClarify => "Agree & clarify step",
            Self::ModelDemonstrate => "Model / Demonstrate step",
            Self::ExplainRationale => "Explain rationale / insight",
            Self::PlanImplementation => "Plan implementation",
            Self::RehearsePractice => "Rehearse / practice",
            Self::FeedbackAdjust => "Feedback & adjust",
            Self::ImplementObserve => "Implementation / observation",
            Self::LinkPraiseToStudentLearning => "Link praise to student learning",
            Self::NextStepHabit => "Next step & habit building",
        }
    }

    fn default_cues(self) -> &'static [&'static str] {
        match self {
            Self::ReviewPriorProgress => &["지난 시간", "지난번", "last time", "last week", "since our last"],
            Self::FormHypothesis => &["관찰", "가설", "i noticed", "i wonder", "hypothesis"],
            Self::SelectActionStep => &["action step", "실행 단계", "focus on", "one thing to try"],
            Self::AgreeClarify => &["동의", "명확", "does that make sense", "agree", "clarify"],
            Self::ModelDemonstrate => &["시범", "보여", "let me show", "model", "demonstrate"],
            Self::ExplainRationale => &["왜냐하면", "이유", "because", "the reason", "rationale"],
            Self::PlanImplementation => &["계획", "plan", "schedule", "when will you"],
            Self::RehearsePractice => &["연습", "리허설", "practice", "rehearse", "role play"],
            Self::FeedbackAdjust => &["피드백", "조정", "adjust", "try again", "tweak"],
            Self::ImplementObserve => &["적용", "수업에서", "implement", "observe", "in class"],
            Self::LinkPraiseToStudentLearning => {
                &["손을 들", "참여", "student learning", "engagement", "participation"]
            }
            Self::NextStepHabit => &["다음 단계", "습관", "next step", "habit", "routine"],
        }
    }
}

impl From<RubricStep> for u8 {
    fn from(step: RubricStep) -> Self {
        step.id()
    }
}

impl TryFrom<u8> for RubricStep {
    type Error = String;

    fn try_from(id: u8) -> std::result::Result<Self, Self::Error> {
        Self::from_id(id).ok_or_else(|| format!("rubric step id {} is outside 1-12", id))
    }
}

impl std::fmt::Display for RubricStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02} {}", self.id(), self.name())
    }
}

/// Rubric definition used for heuristic matching (step -> name and cue phrases)
#[derive(Debug, Clone)]
pub struct Rubric {
    steps: BTreeMap<RubricStep, StepDefinition>,
}

#[derive(Debug, Clone)]
pub struct StepDefinition {
    pub name: String,
    /// Cue phrases, stored lower-cased
    pub cues: Vec<String>,
    patterns: Vec<Regex>,
}

/// Whole-word pattern for one lower-cased cue phrase
pub fn cue_pattern(cue: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(&format!(r"\b{}\b", regex::escape(cue)))
}

impl StepDefinition {
    /// Lower-cases every cue and compiles its whole-word pattern
    pub fn new(name: impl Into<String>, cues: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Self> {
        let name = name.into();
        let cues: Vec<String> = cues.into_iter().map(|c| c.as_ref().trim().to_lowercase()).collect();
        let patterns = cues
            .iter()
            .map(|cue| {
                cue_pattern(cue).map_err(|e| Error::config(format!("invalid cue {:?} for {:?}: {}", cue, name, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { name, cues, patterns })
    }

    /// True when any cue occurs as a whole word in already lower-cased text
    pub fn matches(&self, lowered: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(lowered))
    }
}

impl PartialEq for StepDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.cues == other.cues
    }
}

impl Default for Rubric {
    fn default() -> Self {
        let mut steps = BTreeMap::new();
        for step in RubricStep::ALL {
            match StepDefinition::new(step.name(), step.default_cues()) {
                Ok(def) => {
                    steps.insert(step, def);
                }
                Err(e) => warn!("Skipping built-in cues for step {}: {}", step.id(), e),
            }
        }
        Self { steps }
    }
}

#[derive(Debug, Deserialize)]
struct RubricFile {
    #[serde(default)]
    steps: BTreeMap<String, RubricFileStep>,
}

#[derive(Debug, Deserialize)]
struct RubricFileStep {
    name: Option<String>,
    #[serde(default)]
    cues: Vec<String>,
}

impl Rubric {
    /// Parse a rubric override:
    ///
    /// ```toml
    /// [steps.3]
    /// name = "Select action step"
    /// cues = ["action step", "focus on"]
    /// ```
    ///
    /// Steps absent from the file have no cues.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: RubricFile =
            toml::from_str(content).map_err(|e| Error::config(format!("invalid rubric TOML: {}", e)))?;

        let mut steps = BTreeMap::new();
        for (key, entry) in file.steps {
            let step = key
                .trim()
                .parse::<u8>()
                .ok()
                .and_then(RubricStep::from_id)
                .ok_or_else(|| Error::config(format!("rubric step key {:?} is not an id in 1-12", key)))?;

            let name = entry.name.unwrap_or_else(|| step.name().to_string());
            if name.trim().is_empty() {
                return Err(Error::config(format!("rubric step {} has an empty name", step.id())));
            }

            if entry.cues.iter().any(|cue| cue.trim().is_empty()) {
                return Err(Error::config(format!("rubric step {} has an empty cue", step.id())));
            }

            if steps.insert(step, StepDefinition::new(name, &entry.cues)?).is_some() {
                return Err(Error::config(format!("rubric step {} is defined twice", step.id())));
            }
        }

        Ok(Self { steps })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("reading rubric {:?}", path), e))?;
        Self::from_toml_str(&content)
    }

    /// Steps with their definitions, in rubric-id order
    pub fn steps(&self) -> impl Iterator<Item = (RubricStep, &StepDefinition)> {
        self.steps.iter().map(|(step, def)| (*step, def))
    }

    pub fn get(&self, step: RubricStep) -> Option<&StepDefinition> {
        self.steps.get(&step)
    }

    pub fn cues(&self, step: RubricStep) -> &[String] {
        self.steps.get(&step).map(|d| d.cues.as_slice()).unwrap_or(&[])
    }
}
