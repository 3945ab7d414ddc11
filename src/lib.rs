pub mod error;
pub mod heuristics;
pub mod io;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod scoring;
pub mod stages;

pub use error::{BackendError, Error, Result};
pub use heuristics::classify_transcript;
pub use io::{
    CommandTranscriber, FeedbackReport, HttpPublisher, JsonFileStore, PublishConfig, read_transcript_file,
    write_feedback_json,
};
pub use llm::{AnthropicClient, AnthropicConfig, RateLimiter, RetryPolicy};
pub use models::{
    ClassificationOutput, FeedbackOutput, GenerationInput, Language, Rubric, RubricStep, RunMode, ScoreTable,
    StepLabel, TranscriptChunk,
};
pub use pipeline::{Engine, PipelineConfig, PipelineOrchestrator, RunOptions, RunReport};
pub use scoring::{HeuristicScoringBackend, LlmScoringBackend, ParallelScorer, ScorerConfig, ScoringBackend};
pub use stages::{
    FeedbackGenerator, GenerationBackend, GeneratorConfig, TranscriptSource, generate_local, select_by_vote,
    select_from_labels, select_from_table,
};
