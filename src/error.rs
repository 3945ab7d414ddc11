use std::time::Duration;

use thiserror::Error;

use crate::models::{RubricStep, RunMode};

/// Failure of a single scoring or generation backend call
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("task aborted: {0}")]
    Aborted(String),
}

impl BackendError {
    /// Classify a failed HTTP request sent with `timeout` as its client timeout
    pub fn from_request(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Which part of a run a backend failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStage {
    Scoring,
    Generation,
}

impl std::fmt::Display for BackendStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scoring => f.write_str("scoring"),
            Self::Generation => f.write_str("generation"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("input error: {0}")]
    Input(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("backend error during {stage} ({mode} mode{}): {source}", step_suffix(.step))]
    Backend {
        mode: RunMode,
        stage: BackendStage,
        step: Option<RubricStep>,
        #[source]
        source: BackendError,
    },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("transcription failed: {0}")]
    Transcription(String),
    #[error("persistence failed: {0}")]
    Persistence(String),
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error while {context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub(crate) fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn json(context: &'static str, source: serde_json::Error) -> Self {
        Self::Json { context, source }
    }

    pub(crate) fn scoring(mode: RunMode, source: BackendError) -> Self {
        Self::Backend {
            mode,
            stage: BackendStage::Scoring,
            step: None,
            source,
        }
    }
}

fn step_suffix(step: &Option<RubricStep>) -> String {
    step.map(|s| format!(", step {}", s.id())).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_message_names_mode_and_stage() {
        let err = Error::scoring(RunMode::Cloud, BackendError::Timeout(Duration::from_secs(20)));
        let message = err.to_string();

        assert!(message.contains("scoring"));
        assert!(message.contains("cloud mode"));
        assert!(message.contains("timed out after 20s"));
    }

    #[test]
    fn test_backend_error_message_includes_step() {
        let err = Error::Backend {
            mode: RunMode::Cloud,
            stage: BackendStage::Generation,
            step: Some(RubricStep::LinkPraiseToStudentLearning),
            source: BackendError::Status {
                status: 529,
                body: "overloaded".to_string(),
            },
        };

        assert!(err.to_string().contains("step 11"));
    }
}
