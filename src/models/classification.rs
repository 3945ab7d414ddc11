use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::RubricStep;

/// Per-chunk mapping of rubric step -> relevance score in [0, 1].
///
/// Iteration is always in ascending step id, which makes max-selection
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreTable {
    scores: BTreeMap<RubricStep, f64>,
}

impl ScoreTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a score, clamped to [0, 1]. NaN is stored as 0.0.
    pub fn insert(&mut self, step: RubricStep, score: f64) {
        self.scores.insert(step, clamp_unit(score));
    }

    pub fn get(&self, step: RubricStep) -> Option<f64> {
        self.scores.get(&step).copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RubricStep, f64)> + '_ {
        self.scores.iter().map(|(step, score)| (*step, *score))
    }

    /// Step with the highest score; ties go to the lowest step id
    pub fn best(&self) -> Option<(RubricStep, f64)> {
        self.iter().fold(None, |best, (step, score)| match best {
            Some((_, best_score)) if score <= best_score => best,
            _ => Some((step, score)),
        })
    }
}

impl FromIterator<(RubricStep, f64)> for ScoreTable {
    fn from_iter<I: IntoIterator<Item = (RubricStep, f64)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (step, score) in iter {
            table.insert(step, score);
        }
        table
    }
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Heuristic classification of a single chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLabel {
    /// ID of the chunk this label belongs to
    #[serde(rename = "id")]
    pub chunk_id: String,
    /// Matched steps in rubric-id order
    #[serde(default)]
    pub step_ids: Vec<RubricStep>,
    pub confidence: f64,
}

pub const MAX_NOTES_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationOutput {
    pub labels: Vec<StepLabel>,
    #[serde(default)]
    pub notes: String,
}

impl ClassificationOutput {
    /// Build an output, cutting notes to 300 characters
    pub fn new(labels: Vec<StepLabel>, notes: &str) -> Self {
        Self {
            labels,
            notes: notes.chars().take(MAX_NOTES_CHARS).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_table_clamps() {
        let mut table = ScoreTable::new();
        table.insert(RubricStep::ReviewPriorProgress, 1.7);
        table.insert(RubricStep::FormHypothesis, -0.2);
        table.insert(RubricStep::SelectActionStep, f64::NAN);

        assert_eq!(table.get(RubricStep::ReviewPriorProgress), Some(1.0));
        assert_eq!(table.get(RubricStep::FormHypothesis), Some(0.0));
        assert_eq!(table.get(RubricStep::SelectActionStep), Some(0.0));
    }

    #[test]
    fn test_best_breaks_ties_by_lowest_id() {
        let table: ScoreTable = [
            (RubricStep::LinkPraiseToStudentLearning, 0.9),
            (RubricStep::SelectActionStep, 0.9),
            (RubricStep::ReviewPriorProgress, 0.1),
        ]
        .into_iter()
        .collect();

        assert_eq!(table.best(), Some((RubricStep::SelectActionStep, 0.9)));
    }

    #[test]
    fn test_best_of_empty_table() {
        assert_eq!(ScoreTable::new().best(), None);
    }

    #[test]
    fn test_notes_are_bounded() {
        let output = ClassificationOutput::new(vec![], &"x".repeat(500));
        assert_eq!(output.notes.chars().count(), MAX_NOTES_CHARS);
    }
}
