use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::models::FeedbackOutput;

const REPORT_WIDTH: usize = 80;

/// Write feedback as pretty JSON
pub fn write_feedback_json(feedback: &FeedbackOutput, path: &Path) -> Result<()> {
    let file =
        std::fs::File::create(path).with_context(|| format!("Failed to create file: {:?}", path))?;
    serde_json::to_writer_pretty(file, feedback).context("Failed to write JSON")?;
    Ok(())
}

/// Human-readable feedback report
pub struct FeedbackReport<'a> {
    feedback: &'a FeedbackOutput,
}

impl<'a> FeedbackReport<'a> {
    pub fn new(feedback: &'a FeedbackOutput) -> Self {
        Self { feedback }
    }

    pub fn format(&self) -> String {
        let f = self.feedback;
        let mut output = String::new();

        let title = format!("Step {}", f.step_focus);
        output.push_str(&title);
        output.push('\n');
        output.push_str(&"=".repeat(title.chars().count()));
        output.push_str("\n\n");

        push_section(&mut output, "Praise", &f.praise);
        push_section(&mut output, "Improvement", &f.improvement);
        push_section(&mut output, "Why it matters", &f.why_it_matters);

        output.push_str("Evidence:\n");
        for quote in &f.evidence_quote {
            output.push_str(&format!("  > {}\n", quote));
        }
        output.push('\n');

        push_section(&mut output, "Student learning", &f.student_learning_link);
        push_section(&mut output, "Next step", &f.next_step);
        output.push_str(&format!("Confidence: {:.2}\n", f.confidence));

        output
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        let mut file =
            std::fs::File::create(path).with_context(|| format!("Failed to create file: {:?}", path))?;
        write!(file, "{}", self.format())?;
        Ok(())
    }
}

fn push_section(output: &mut String, heading: &str, body: &str) {
    output.push_str(heading);
    output.push_str(":\n");
    output.push_str(&wrap_text(body, REPORT_WIDTH));
    output.push_str("\n\n");
}

/// Wrap text at approximately the given width, counted in characters
fn wrap_text(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut line_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if line_len + word_len + 1 > width && line_len > 0 {
            result.push('\n');
            line_len = 0;
        }
        if line_len > 0 {
            result.push(' ');
            line_len += 1;
        }
        result.push_str(word);
        line_len += word_len;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeedbackDraft, RubricStep};

    fn feedback() -> FeedbackOutput {
        let draft = FeedbackDraft {
            praise: "Good wait time.".to_string(),
            improvement: "Keep the pause consistent.".to_string(),
            why_it_matters: "More students think before answering.".to_string(),
            evidence_quote: vec!["students improved".to_string(), "let's plan".to_string()],
            student_learning_link: "Participation rose.".to_string(),
            next_step: "Add a pause checkbox.".to_string(),
            confidence: None,
        };
        FeedbackOutput::from_draft(RubricStep::LinkPraiseToStudentLearning, draft, 0.75).unwrap()
    }

    #[test]
    fn test_report_contains_every_field() {
        let report = FeedbackReport::new(&feedback()).format();

        assert!(report.starts_with("Step 11 "));
        assert!(report.contains("Praise:\nGood wait time."));
        assert!(report.contains("  > students improved\n  > let's plan\n"));
        assert!(report.contains("Next step:\nAdd a pause checkbox."));
        assert!(report.ends_with("Confidence: 0.75\n"));
    }

    #[test]
    fn test_write_feedback_json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.json");
        let original = feedback();

        write_feedback_json(&original, &path).unwrap();
        let parsed = FeedbackOutput::from_json(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(parsed, original);
    }

    #[test]
    fn test_wrap_text_counts_characters() {
        let text = "가나다 라마바 사아자 차카타 파하";
        for line in wrap_text(text, 8).lines() {
            assert!(line.chars().count() <= 8);
        }
    }
}
