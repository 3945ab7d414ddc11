use crate::models::{ClassificationOutput, Rubric, RubricStep, StepLabel, TranscriptChunk};

/// Confidence reported for a chunk that matched at least one step
pub const MATCHED_CONFIDENCE: f64 = 0.6;
/// Confidence reported for a chunk that matched nothing
pub const UNMATCHED_CONFIDENCE: f64 = 0.2;

const CLASSIFIER_NOTES: &str = "heuristic cue-word classifier";

/// Classify every chunk against the rubric's cue phrases
///
/// For each chunk, every step with at least one whole-word cue match is
/// collected in rubric-id order. A chunk with no match that still talks about
/// students is attributed to "link praise to student learning".
/// Confidence is coarse: 0.6 when anything matched, 0.2 otherwise.
pub fn classify_transcript(chunks: &[TranscriptChunk], rubric: &Rubric) -> ClassificationOutput {
    let labels = chunks
        .iter()
        .map(|chunk| {
            let step_ids = match_steps(&chunk.text, rubric);
            let confidence = if step_ids.is_empty() {
                UNMATCHED_CONFIDENCE
            } else {
                MATCHED_CONFIDENCE
            };
            StepLabel {
                chunk_id: chunk.id.clone(),
                step_ids,
                confidence,
            }
        })
        .collect();

    ClassificationOutput::new(labels, CLASSIFIER_NOTES)
}

/// Steps whose cues occur in `text`, in rubric-id order
pub fn match_steps(text: &str, rubric: &Rubric) -> Vec<RubricStep> {
    let lowered = text.to_lowercase();

    let mut matched: Vec<RubricStep> = rubric
        .steps()
        .filter(|(_, def)| def.matches(&lowered))
        .map(|(step, _)| step)
        .collect();

    if matched.is_empty() && mentions_students(text, &lowered) {
        matched.push(RubricStep::LinkPraiseToStudentLearning);
    }

    matched
}

// The Korean marker is checked on the raw text, the English one on the lower-cased text.
fn mentions_students(raw: &str, lowered: &str) -> bool {
    raw.contains("학생") || lowered.contains("students")
}
