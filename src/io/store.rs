use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{FeedbackOutput, RubricStep, RunMode, TranscriptChunk};

/// Everything kept about one finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub ts: DateTime<Utc>,
    pub mode: RunMode,
    pub step_focus: RubricStep,
    pub transcript: Vec<TranscriptChunk>,
    pub feedback: FeedbackOutput,
}

/// Where a record ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRef {
    pub location: String,
}

/// Persistence capability for finished runs
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn store(&self, session_id: &str, record: &SessionRecord) -> Result<StoreRef>;
}

/// Writes `<root>/sessions/<id>/output/feedback.json`
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn record_path(&self, session_id: &str) -> PathBuf {
        self.root
            .join("sessions")
            .join(session_id)
            .join("output")
            .join("feedback.json")
    }

    pub async fn load(&self, session_id: &str) -> Result<SessionRecord> {
        let path = self.record_path(session_id);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::io(format!("reading {:?}", path), e))?;
        serde_json::from_str(&content).map_err(|e| Error::json("reading a session record", e))
    }
}

#[async_trait]
impl FeedbackStore for JsonFileStore {
    async fn store(&self, session_id: &str, record: &SessionRecord) -> Result<StoreRef> {
        if !is_safe_session_id(session_id) {
            return Err(Error::Persistence(format!("refusing session id {:?}", session_id)));
        }

        let path = self.record_path(session_id);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::Persistence(format!("creating {:?}: {}", dir, e)))?;
        }

        let body = serde_json::to_vec_pretty(record).map_err(|e| Error::json("serializing a session record", e))?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| Error::Persistence(format!("writing {:?}: {}", path, e)))?;

        debug!("Stored session {} at {:?}", session_id, path);
        Ok(StoreRef {
            location: path.display().to_string(),
        })
    }
}

// Session ids become a path component
fn is_safe_session_id(session_id: &str) -> bool {
    !session_id.is_empty()
        && session_id != "."
        && session_id != ".."
        && Path::new(session_id).components().count() == 1
        && !session_id.contains(['/', '\\'])
}
