use async_trait::async_trait;
use tracing::debug;

use crate::error::BackendError;
use crate::heuristics::match_steps;
use crate::llm::{CompletionClient, CompletionRequest, STEP_CLASSIFIER_SYSTEM, build_step_classifier_prompt, parse_score};
use crate::models::{Rubric, RubricStep};

/// Relevance of one transcript chunk to one rubric step, in [0, 1]
#[async_trait]
pub trait ScoringBackend: Send + Sync {
    async fn score(&self, text: &str, step: RubricStep) -> Result<f64, BackendError>;
}

/// Scores by asking a hosted model; unparsable replies score 0.0
pub struct LlmScoringBackend<C> {
    client: C,
    max_tokens: u32,
}

impl<C: CompletionClient> LlmScoringBackend<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            max_tokens: 200,
        }
    }
}

#[async_trait]
impl<C: CompletionClient> ScoringBackend for LlmScoringBackend<C> {
    async fn score(&self, text: &str, step: RubricStep) -> Result<f64, BackendError> {
        let request = CompletionRequest {
            system: STEP_CLASSIFIER_SYSTEM.to_string(),
            prompt: build_step_classifier_prompt(text, step),
            max_tokens: self.max_tokens,
            temperature: 0.0,
        };

        let raw = self.client.complete(&request).await?;

        Ok(parse_score(&raw).unwrap_or_else(|| {
            debug!(step = step.id(), "unparsable score reply, counting as 0.0");
            0.0
        }))
    }
}

/// Offline scorer: 1.0 when the rubric's cues (or the students fallback) select the step
pub struct HeuristicScoringBackend {
    rubric: Rubric,
}

impl HeuristicScoringBackend {
    pub fn new(rubric: Rubric) -> Self {
        Self { rubric }
    }
}

#[async_trait]
impl ScoringBackend for HeuristicScoringBackend {
    async fn score(&self, text: &str, step: RubricStep) -> Result<f64, BackendError> {
        let matched = match_steps(text, &self.rubric);
        Ok(if matched.contains(&step) { 1.0 } else { 0.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedReply(&'static str);

    #[async_trait]
    impl CompletionClient for FixedReply {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
            assert_eq!(request.system, STEP_CLASSIFIER_SYSTEM);
            assert_eq!(request.temperature, 0.0);
            Ok(self.0.to_string())
        }
    }

    struct Unreachable;

    #[async_trait]
    impl CompletionClient for Unreachable {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, BackendError> {
            Err(BackendError::Transport("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_llm_backend_parses_score() {
        let backend = LlmScoringBackend::new(FixedReply(r#"{"score": 0.8}"#));
        let score = backend.score("text", RubricStep::PlanImplementation).await.unwrap();
        assert_eq!(score, 0.8);
    }

    #[tokio::test]
    async fn test_llm_backend_unparsable_reply_is_zero() {
        let backend = LlmScoringBackend::new(FixedReply("no idea"));
        let score = backend.score("text", RubricStep::PlanImplementation).await.unwrap();
        assert_eq!(score, 0.0);
    }

    #[tokio::test]
    async fn test_llm_backend_propagates_transport_errors() {
        let backend = LlmScoringBackend::new(Unreachable);
        let result = backend.score("text", RubricStep::PlanImplementation).await;
        assert!(matches!(result, Err(BackendError::Transport(_))));
    }

    #[tokio::test]
    async fn test_heuristic_backend() {
        let backend = HeuristicScoringBackend::new(Rubric::default());

        assert_eq!(backend.score("let's plan", RubricStep::PlanImplementation).await.unwrap(), 1.0);
        assert_eq!(backend.score("let's plan", RubricStep::RehearsePractice).await.unwrap(), 0.0);
        assert_eq!(
            backend
                .score("students improved", RubricStep::LinkPraiseToStudentLearning)
                .await
                .unwrap(),
            1.0
        );
    }
}
