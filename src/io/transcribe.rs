use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::Transcription;

/// Audio-to-text capability
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<Transcription>;
}

/// Runs an external speech-to-text command.
///
/// The audio path is appended as the last argument and stdout must be a
/// `{"text": ..., "segments": [{"start", "end", "text"}]}` document.
#[derive(Debug, Clone)]
pub struct CommandTranscriber {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandTranscriber {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Parse a shell-style command line (whitespace separated, no quoting)
    pub fn from_command_line(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| Error::config("transcriber command is empty"))?;
        Ok(Self {
            program: PathBuf::from(program),
            args: parts.map(str::to_string).collect(),
        })
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl Transcriber for CommandTranscriber {
    async fn transcribe(&self, audio: &Path) -> Result<Transcription> {
        if !audio.exists() {
            return Err(Error::input(format!("audio file not found: {:?}", audio)));
        }

        info!("Transcribing {:?} with {:?}", audio, self.program);
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(audio)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Transcription(format!("failed to start {:?}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Transcription(format!(
                "{:?} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let transcription: Transcription = serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::Transcription(format!("unreadable transcriber output: {}", e)))?;
        debug!(segments = transcription.segments.len(), "transcription finished");
        Ok(transcription)
    }
}
