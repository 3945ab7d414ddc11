use crate::models::{GenerationInput, RubricStep, TranscriptChunk};

/// System prompt for per-step relevance scoring
pub const STEP_CLASSIFIER_SYSTEM: &str = "Classify coaching step";

/// System prompt for feedback generation
pub const FEEDBACK_SYSTEM: &str = "Generate instructional coaching feedback";

/// Build the scoring prompt for one (chunk, step) pair.
///
/// The model is asked to answer with a JSON object holding a single numeric
/// `score` in [0, 1].
pub fn build_step_classifier_prompt(chunk_text: &str, step: RubricStep) -> String {
    let mut prompt = String::new();

    prompt.push_str("You are scoring one excerpt of an instructional-coaching conversation.\n\n");
    prompt.push_str(&format!("# Coaching step ID {}: {}\n\n", step.id(), step.name()));
    prompt.push_str("## Excerpt\n");
    prompt.push_str(chunk_text);
    prompt.push_str("\n\n");
    prompt.push_str("## Instructions\n");
    prompt.push_str("Rate how strongly the excerpt reflects this coaching step, from 0.0 (not at all) to 1.0 (clearly).\n");
    prompt.push_str("Respond with JSON only, exactly in this shape: {\"score\": <number between 0 and 1>}\n");

    prompt
}

/// Build the feedback-generation prompt for a whole session
pub fn build_feedback_prompt(input: &GenerationInput) -> String {
    let mut prompt = String::new();
    let step = input.step_focus;

    prompt.push_str(&format!(
        "# Step focus: {} ({})\n",
        step.id(),
        step.name()
    ));
    prompt.push_str(&format!("Language: {}\n", input.language.code()));

    if let Some(secondary) = input.secondary_steps.as_ref().filter(|s| !s.is_empty()) {
        let names: Vec<String> = secondary.iter().map(|s| s.to_string()).collect();
        prompt.push_str(&format!("Secondary steps: {}\n", names.join(", ")));
    }

    if let Some(metadata) = &input.metadata {
        let mut parts = Vec::new();
        if let Some(subject) = &metadata.subject {
            parts.push(format!("subject={}", subject));
        }
        if let Some(grade) = &metadata.grade {
            parts.push(format!("grade={}", grade));
        }
        if let Some(session_type) = &metadata.session_type {
            parts.push(format!("session_type={}", session_type));
        }
        if !parts.is_empty() {
            prompt.push_str(&format!("Session: {}\n", parts.join(", ")));
        }
    }
    prompt.push('\n');

    prompt.push_str("## Transcript\n");
    prompt.push_str("```json\n");
    prompt.push_str(&format_transcript(&input.transcript_chunks));
    prompt.push_str("\n```\n\n");

    if let Some(notes) = input.observation.as_ref().and_then(|o| o.notes.as_deref()) {
        prompt.push_str("## Classroom Observation\n");
        prompt.push_str(notes);
        prompt.push_str("\n\n");
    }

    if let Some(artifacts) = input.artifacts.as_ref().filter(|a| !a.is_empty()) {
        prompt.push_str("## Task Artifacts\n");
        for artifact in artifacts {
            match &artifact.description {
                Some(description) => prompt.push_str(&format!("- {}: {}\n", artifact.name, description)),
                None => prompt.push_str(&format!("- {}\n", artifact.name)),
            }
        }
        prompt.push('\n');
    }

    prompt.push_str("## Instructions\n");
    prompt.push_str("Write coaching feedback for the teacher focused on the step above.\n");
    prompt.push_str("Respond with a single JSON object with these keys:\n");
    prompt.push_str("- praise (max 600 characters)\n");
    prompt.push_str("- improvement (max 700 characters)\n");
    prompt.push_str("- why_it_matters (max 900 characters)\n");
    prompt.push_str("- evidence_quote (array of 1-2 direct quotes from the transcript)\n");
    prompt.push_str("- student_learning_link (max 400 characters)\n");
    prompt.push_str("- next_step (max 600 characters)\n");
    prompt.push_str("- confidence (number between 0 and 1)\n");

    prompt
}

/// Format the transcript as JSON for the prompt, keeping non-ASCII text intact
fn format_transcript(chunks: &[TranscriptChunk]) -> String {
    serde_json::to_string(chunks).unwrap_or_else(|_| "[]".to_string())
}
