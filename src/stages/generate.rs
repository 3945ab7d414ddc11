use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::{BackendError, BackendStage, Error, Result};
use crate::llm::{CompletionClient, CompletionRequest, FEEDBACK_SYSTEM, RetryPolicy, build_feedback_prompt, parse_feedback_draft};
use crate::models::{FeedbackDraft, FeedbackOutput, GenerationInput, RubricStep, RunMode, TranscriptChunk};

/// Confidence of template feedback
pub const LOCAL_CONFIDENCE: f64 = 0.75;
/// Longest evidence quote, ellipsis included
pub const MAX_QUOTE_CHARS: usize = 160;
const ELLIPSIS: &str = "...";
const NO_QUOTE_PLACEHOLDER: &str = "(no direct quote available)";

/// Raw feedback text from a hosted model
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, input: &GenerationInput) -> std::result::Result<String, BackendError>;
}

pub struct LlmGenerationBackend<C> {
    client: C,
    max_tokens: u32,
    temperature: f64,
}

impl<C: CompletionClient> LlmGenerationBackend<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            max_tokens: 600,
            temperature: 0.2,
        }
    }
}

#[async_trait]
impl<C: CompletionClient> GenerationBackend for LlmGenerationBackend<C> {
    async fn generate(&self, input: &GenerationInput) -> std::result::Result<String, BackendError> {
        let request = CompletionRequest {
            system: FEEDBACK_SYSTEM.to_string(),
            prompt: build_feedback_prompt(input),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        self.client.complete(&request).await
    }
}

/// Configuration for cloud feedback generation
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
    /// Used when the model reply carries no confidence
    pub default_confidence: f64,
    /// Confidence attached to the fixed fallback feedback
    pub fallback_confidence: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            default_confidence: 0.7,
            fallback_confidence: 0.3,
        }
    }
}

/// Produces the feedback object for the selected step
pub enum FeedbackGenerator {
    /// Fixed templates, no I/O
    Local,
    /// Remote generation, degrading to a fixed fallback on any failure
    Cloud {
        backend: Arc<dyn GenerationBackend>,
        config: GeneratorConfig,
    },
}

impl FeedbackGenerator {
    pub async fn generate(&self, input: &GenerationInput) -> Result<FeedbackOutput> {
        input.validate()?;
        match self {
            Self::Local => generate_local(input),
            Self::Cloud { backend, config } => generate_cloud(backend.as_ref(), input, config).await,
        }
    }
}

/// Up to `max` evidence quotes from the first non-blank chunk texts.
///
/// Quotes longer than 160 characters are cut to 157 plus `...`. With no
/// usable text a fixed placeholder is returned.
pub fn pick_quotes(chunks: &[TranscriptChunk], max: usize) -> Vec<String> {
    let quotes: Vec<String> = chunks
        .iter()
        .map(|c| c.text.trim())
        .filter(|t| !t.is_empty())
        .take(max)
        .map(truncate_quote)
        .collect();

    if quotes.is_empty() {
        vec![NO_QUOTE_PLACEHOLDER.to_string()]
    } else {
        quotes
    }
}

fn truncate_quote(text: &str) -> String {
    if text.chars().count() <= MAX_QUOTE_CHARS {
        return text.to_string();
    }
    let keep = MAX_QUOTE_CHARS - ELLIPSIS.len();
    let mut quote: String = text.chars().take(keep).collect();
    quote.push_str(ELLIPSIS);
    quote
}

/// Template feedback; deterministic for a given input
pub fn generate_local(input: &GenerationInput) -> Result<FeedbackOutput> {
    let quotes = pick_quotes(&input.transcript_chunks, 2);
    let draft = match input.step_focus {
        RubricStep::LinkPraiseToStudentLearning => FeedbackDraft {
            praise: "질문 후 잠시 기다린 점이 좋았습니다. 그 덕분에 더 많은 학생이 손을 들고 근거를 설명했습니다.".to_string(),
            improvement: "다음 시간에도 질문 뒤 2초 멈춤을 일관되게 적용하고, 이름 부르기 전 전체에게 생각 시간을 주세요.".to_string(),
            why_it_matters: "대기 시간(wait time)은 인지부하를 낮추고 더 많은 학생이 말할 기회를 확보하게 해 참여와 정교화를 촉진합니다.".to_string(),
            evidence_quote: quotes,
            student_learning_link: "잠깐의 대기 시간이 참여와 정교화를 높여 학습 품질을 끌어올립니다.".to_string(),
            next_step: "도입과 정리 단계의 핵심 질문마다 2초 멈춤 체크박스를 수업 스크립트에 추가하세요.".to_string(),
            confidence: None,
        },
        _ => FeedbackDraft {
            praise: "구체적 실행 계획을 짧고 명확하게 정리한 점이 좋았습니다.".to_string(),
            improvement: "계획에 관찰 지표 1개(예: 손들기 수, 근거 발화 수)를 추가해 다음 수업에서 비교하세요.".to_string(),
            why_it_matters: "명시적 계획은 교사의 주의 전환 비용을 낮추고 학생 행동 지표의 변화를 추적 가능하게 합니다.".to_string(),
            evidence_quote: quotes,
            student_learning_link: "구체적 계획은 학생 활동 흐름을 매끈하게 만들어 참여를 높입니다.".to_string(),
            next_step: "다음 수업 개시 5분 내 체크리스트(질문, 자료, 자리배치)를 미리 점검하세요.".to_string(),
            confidence: None,
        },
    };

    FeedbackOutput::from_draft(input.step_focus, draft, LOCAL_CONFIDENCE)
}

/// Fixed generic feedback used whenever remote generation fails
pub fn fallback_draft() -> FeedbackDraft {
    FeedbackDraft {
        praise: "수업에서 잘한 점을 구체적으로 칭찬합니다.".to_string(),
        improvement: "다음 수업에서 시도할 1가지 개선 행동을 제안합니다.".to_string(),
        why_it_matters: "교육적 근거를 간단히 설명합니다.".to_string(),
        evidence_quote: vec!["(인용 불가)".to_string()],
        student_learning_link: "칭찬을 학생 학습과 명시적으로 연결합니다.".to_string(),
        next_step: "다음 액션 스텝을 한 가지 지시합니다.".to_string(),
        confidence: None,
    }
}

async fn generate_cloud(
    backend: &dyn GenerationBackend,
    input: &GenerationInput,
    config: &GeneratorConfig,
) -> Result<FeedbackOutput> {
    let step = input.step_focus;
    let call_timeout = config.call_timeout;

    let reply = config
        .retry
        .run("feedback generation", || async move {
            match timeout(call_timeout, backend.generate(input)).await {
                Ok(result) => result,
                Err(_) => Err(BackendError::Timeout(call_timeout)),
            }
        })
        .await;

    let generated = match reply {
        Ok(raw) => match parse_feedback_draft(&raw) {
            Some(draft) => {
                let confidence = draft.confidence.unwrap_or(config.default_confidence);
                match FeedbackOutput::from_draft(step, draft, confidence) {
                    Ok(feedback) => Some(feedback),
                    Err(e) => {
                        warn!("Generated feedback rejected ({}), using fallback", e);
                        None
                    }
                }
            }
            None => {
                warn!("Generated feedback was not valid JSON, using fallback");
                None
            }
        },
        Err(source) => {
            let err = Error::Backend {
                mode: RunMode::Cloud,
                stage: BackendStage::Generation,
                step: Some(step),
                source,
            };
            warn!("{}, using fallback", err);
            None
        }
    };

    match generated {
        Some(feedback) => {
            info!("Generated feedback for step {}", step.id());
            Ok(feedback)
        }
        None => FeedbackOutput::from_draft(step, fallback_draft(), config.fallback_confidence),
    }
}
