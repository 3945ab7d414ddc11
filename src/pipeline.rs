use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::heuristics::classify_transcript;
use crate::io::{EventPublisher, FEEDBACK_CREATED, FeedbackCreated, FeedbackStore, SessionRecord, StoreRef, Transcriber};
use crate::llm::CompletionClient;
use crate::models::{
    FeedbackOutput, GenerationInput, Language, Rubric, RubricStep, RunMode, SessionMetadata, TranscriptChunk,
    sample_transcript,
};
use crate::scoring::{LlmScoringBackend, ParallelScorer, ScorerConfig};
use crate::stages::{
    FeedbackGenerator, GeneratorConfig, LlmGenerationBackend, TranscriptSource, acquire_transcript, select_by_vote,
    select_from_labels,
};

/// Step selection and generation strategy, fixed when the orchestrator is built
pub enum Engine {
    /// Cue-word classification and template feedback; never touches the network
    Local { rubric: Rubric },
    /// Model scoring with a majority vote, then model-written feedback
    Cloud {
        scorer: ParallelScorer,
        generator: FeedbackGenerator,
    },
}

/// Tunables for a cloud engine
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub scorer: ScorerConfig,
    pub generator: GeneratorConfig,
}

impl Engine {
    pub fn local(rubric: Rubric) -> Self {
        Self::Local { rubric }
    }

    /// Cloud engine whose scoring and generation share one completion client
    pub fn cloud<C>(client: C, config: PipelineConfig) -> Self
    where
        C: CompletionClient + Clone + 'static,
    {
        let scorer = ParallelScorer::new(Arc::new(LlmScoringBackend::new(client.clone())), config.scorer);
        let generator = FeedbackGenerator::Cloud {
            backend: Arc::new(LlmGenerationBackend::new(client)),
            config: config.generator,
        };
        Self::Cloud { scorer, generator }
    }

    pub fn mode(&self) -> RunMode {
        match self {
            Self::Local { .. } => RunMode::Local,
            Self::Cloud { .. } => RunMode::Cloud,
        }
    }
}

/// Per-run options
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Skips step selection entirely
    pub forced_step: Option<RubricStep>,
    pub language: Language,
    /// Substitute the built-in sample when no chunks result (local mode only)
    pub allow_sample: bool,
    pub metadata: Option<SessionMetadata>,
}

/// Progress of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    TranscriptAcquired,
    StepSelected,
    FeedbackGenerated,
    Persisted,
    Done,
    Error,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Start => "START",
            Self::TranscriptAcquired => "TRANSCRIPT_ACQUIRED",
            Self::StepSelected => "STEP_SELECTED",
            Self::FeedbackGenerated => "FEEDBACK_GENERATED",
            Self::Persisted => "PERSISTED",
            Self::Done => "DONE",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub session_id: String,
    pub mode: RunMode,
    pub transcript: Vec<TranscriptChunk>,
    pub feedback: FeedbackOutput,
    pub used_sample: bool,
    /// Present when a store accepted the session record
    pub stored: Option<StoreRef>,
    pub published: bool,
}

/// Composes acquisition, selection, generation and the best-effort side calls
pub struct PipelineOrchestrator {
    engine: Engine,
    transcriber: Option<Arc<dyn Transcriber>>,
    store: Option<Arc<dyn FeedbackStore>>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl PipelineOrchestrator {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            transcriber: None,
            store: None,
            publisher: None,
        }
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn FeedbackStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn mode(&self) -> RunMode {
        self.engine.mode()
    }

    /// Run the pipeline once.
    ///
    /// Errors before feedback is generated abort the run. Storage and publish
    /// failures are logged and never change the returned feedback.
    pub async fn run(&self, source: TranscriptSource, options: &RunOptions) -> Result<RunReport> {
        let mut state = PipelineState::Start;
        match self.run_from(&mut state, source, options).await {
            Ok(report) => {
                advance(&mut state, PipelineState::Done);
                Ok(report)
            }
            Err(err) => {
                warn!("Pipeline failed after {}: {}", state, err);
                advance(&mut state, PipelineState::Error);
                Err(err)
            }
        }
    }

    async fn run_from(
        &self,
        state: &mut PipelineState,
        source: TranscriptSource,
        options: &RunOptions,
    ) -> Result<RunReport> {
        let mode = self.mode();
        info!("Starting {} pipeline run", mode);

        let mut transcript = acquire_transcript(source, self.transcriber.as_deref()).await?;
        let mut used_sample = false;
        if transcript.is_empty() {
            if !(options.allow_sample && mode == RunMode::Local) {
                return Err(Error::input("transcript produced no chunks"));
            }
            info!("No transcript chunks, using the built-in sample");
            transcript = sample_transcript();
            used_sample = true;
        }
        advance(state, PipelineState::TranscriptAcquired);

        let step = match options.forced_step {
            Some(step) => {
                info!("Using forced step {}", step);
                step
            }
            None => self.select_step(&transcript).await?,
        };
        advance(state, PipelineState::StepSelected);

        let mut input = GenerationInput::new(transcript.clone(), step)?.with_language(options.language);
        if let Some(metadata) = &options.metadata {
            input = input.with_metadata(metadata.clone());
        }
        let feedback = match &self.engine {
            Engine::Local { .. } => FeedbackGenerator::Local.generate(&input).await?,
            Engine::Cloud { generator, .. } => generator.generate(&input).await?,
        };
        advance(state, PipelineState::FeedbackGenerated);

        let session_id = session_id_for(mode, &transcript);
        let record = SessionRecord {
            session_id: session_id.clone(),
            ts: Utc::now(),
            mode,
            step_focus: step,
            transcript,
            feedback,
        };
        let stored = self.store_record(&record).await;
        let published = self.publish_record(&record).await;
        if self.store.is_some() || self.publisher.is_some() {
            advance(state, PipelineState::Persisted);
        }

        Ok(RunReport {
            session_id,
            mode,
            transcript: record.transcript,
            feedback: record.feedback,
            used_sample,
            stored,
            published,
        })
    }

    async fn select_step(&self, transcript: &[TranscriptChunk]) -> Result<RubricStep> {
        let step = match &self.engine {
            Engine::Local { rubric } => {
                let classification = classify_transcript(transcript, rubric);
                select_from_labels(&classification.labels)
            }
            Engine::Cloud { scorer, .. } => {
                let texts: Vec<String> = transcript.iter().map(|c| c.text.clone()).collect();
                let tables = scorer
                    .score_all_steps(&texts)
                    .await
                    .map_err(|e| Error::scoring(RunMode::Cloud, e))?;
                select_by_vote(&tables)
            }
        };
        info!("Selected step {}", step);
        Ok(step)
    }

    async fn store_record(&self, record: &SessionRecord) -> Option<StoreRef> {
        let store = self.store.as_ref()?;
        match store.store(&record.session_id, record).await {
            Ok(stored) => {
                info!("Stored session {} at {}", record.session_id, stored.location);
                Some(stored)
            }
            Err(e) => {
                warn!("Failed to store session {}: {}", record.session_id, e);
                None
            }
        }
    }

    async fn publish_record(&self, record: &SessionRecord) -> bool {
        let Some(publisher) = &self.publisher else {
            return false;
        };

        let event = FeedbackCreated {
            session_id: &record.session_id,
            step_focus: record.step_focus,
            feedback: &record.feedback,
        };
        let payload = match event.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to build {} event: {}", FEEDBACK_CREATED, e);
                return false;
            }
        };

        match publisher.publish(&record.session_id, FEEDBACK_CREATED, &payload).await {
            Ok(true) => true,
            Ok(false) => {
                warn!("Event bus rejected {} for session {}", FEEDBACK_CREATED, record.session_id);
                false
            }
            Err(e) => {
                warn!("Failed to publish {} for session {}: {}", FEEDBACK_CREATED, record.session_id, e);
                false
            }
        }
    }
}

fn advance(state: &mut PipelineState, next: PipelineState) {
    info!("Pipeline state {} -> {}", state, next);
    *state = next;
}

/// `local-<first chunk id>` in local mode, 8 hex characters of a fresh UUID in cloud mode
fn session_id_for(mode: RunMode, transcript: &[TranscriptChunk]) -> String {
    match (mode, transcript.first()) {
        (RunMode::Local, Some(first)) => format!("local-{}", first.id),
        _ => Uuid::new_v4().simple().to_string().chars().take(8).collect(),
    }
}
