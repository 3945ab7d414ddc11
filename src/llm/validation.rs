use serde_json::Value;

use crate::models::{FeedbackDraft, MAX_EVIDENCE_QUOTES, classification::clamp_unit};

/// Locate a JSON object in free-form model output.
///
/// Tries the whole text first, then the span from the first `{` to the last `}`
/// (models often wrap JSON in prose or code fences).
pub fn extract_json_object(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Read the `score` field of a scoring reply.
///
/// Returns `None` when there is no JSON object; a missing or non-numeric score
/// counts as 0.0. The result is clamped to [0, 1].
pub fn parse_score(raw: &str) -> Option<f64> {
    let value = extract_json_object(raw)?;
    let score = match value.get("score") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    Some(clamp_unit(score))
}

/// Parse a generation reply into a feedback draft.
///
/// Blank quotes are dropped and at most two are kept. Returns `None` when the
/// reply does not decode to the feedback field set.
pub fn parse_feedback_draft(raw: &str) -> Option<FeedbackDraft> {
    let value = extract_json_object(raw)?;
    let mut draft: FeedbackDraft = serde_json::from_value(value).ok()?;

    draft.evidence_quote.retain(|q| !q.trim().is_empty());
    draft.evidence_quote.truncate(MAX_EVIDENCE_QUOTES);
    draft.confidence = draft.confidence.map(clamp_unit);

    Some(draft)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_score() {
        assert_eq!(parse_score(r#"{"score": 0.9}"#), Some(0.9));
    }

    #[test]
    fn test_parse_score_wrapped_in_prose() {
        let raw = "Here is my answer:\n```json\n{\"score\": 0.35}\n```";
        assert_eq!(parse_score(raw), Some(0.35));
    }

    #[test]
    fn test_parse_score_missing_or_bad_field_is_zero() {
        assert_eq!(parse_score(r#"{"relevance": 0.9}"#), Some(0.0));
        assert_eq!(parse_score(r#"{"score": "high"}"#), Some(0.0));
        assert_eq!(parse_score(r#"{"score": "0.5"}"#), Some(0.5));
    }

    #[test]
    fn test_parse_score_clamps() {
        assert_eq!(parse_score(r#"{"score": 7}"#), Some(1.0));
    }

    #[test]
    fn test_unparsable_score() {
        assert_eq!(parse_score("I cannot answer that"), None);
        assert_eq!(parse_score("[0.5]"), None);
    }

    #[test]
    fn test_parse_feedback_draft_normalizes_quotes() {
        let raw = r#"Sure! {
            "praise": "Great wait time.",
            "improvement": "Cold-call after the pause.",
            "why_it_matters": "More students think.",
            "evidence_quote": ["", "first", "second", "third"],
            "student_learning_link": "Participation rose.",
            "next_step": "Add a pause checkbox.",
            "confidence": 1.4
        }"#;

        let draft = parse_feedback_draft(raw).unwrap();

        assert_eq!(draft.evidence_quote, vec!["first".to_string(), "second".to_string()]);
        assert_eq!(draft.confidence, Some(1.0));
    }

    #[test]
    fn test_parse_feedback_draft_missing_keys() {
        assert!(parse_feedback_draft(r#"{"praise": "only praise"}"#).is_none());
        assert!(parse_feedback_draft("not json").is_none());
    }
}
