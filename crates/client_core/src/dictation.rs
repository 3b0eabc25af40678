use std::{io::ErrorKind, process::Stdio};

use async_trait::async_trait;
use shared::error::{ChatNotice, NoticeCode};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DictationError {
    #[error("no speech detected")]
    NoSpeech,
    #[error("no microphone available")]
    NoMicrophone,
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("speech recognition is not available")]
    Unsupported,
    #[error("speech recognition failed: {0}")]
    Other(String),
}

impl DictationError {
    pub fn notice(&self) -> ChatNotice {
        match self {
            Self::NoSpeech => NoticeCode::NoSpeech.into(),
            Self::NoMicrophone => NoticeCode::NoMicrophone.into(),
            Self::PermissionDenied => NoticeCode::MicrophonePermissionDenied.into(),
            Self::Unsupported => NoticeCode::DictationUnsupported.into(),
            Self::Other(reason) => ChatNotice::new(
                NoticeCode::DictationFailed,
                format!("An error occurred during speech recognition: {reason}"),
            ),
        }
    }
}

/// Speech-to-text capability. Each call records at most one utterance.
#[async_trait]
pub trait Dictation: Send + Sync {
    async fn dictate(&self) -> Result<Option<String>, DictationError>;
}

/// Dictation unavailable on this host.
pub struct NoDictation;

#[async_trait]
impl Dictation for NoDictation {
    async fn dictate(&self) -> Result<Option<String>, DictationError> {
        Err(DictationError::Unsupported)
    }
}

/// Runs an external recognizer; its stdout is the transcript.
#[derive(Debug, Clone)]
pub struct CommandDictation {
    program: String,
    args: Vec<String>,
}

impl CommandDictation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits a configured command line on whitespace.
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

#[async_trait]
impl Dictation for CommandDictation {
    async fn dictate(&self) -> Result<Option<String>, DictationError> {
        debug!(program = self.program.as_str(), "starting recognizer");
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => DictationError::Unsupported,
                ErrorKind::PermissionDenied => DictationError::PermissionDenied,
                _ => DictationError::Other(err.to_string()),
            })?;

        // Killed by a signal: recording was stopped before a result.
        let Some(code) = output.status.code() else {
            return Ok(None);
        };

        if code != 0 {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(code, stderr = %stderr.trim(), "recognizer failed");
            return Err(classify_failure(&stderr, code));
        }

        let transcript = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if transcript.is_empty() {
            return Err(DictationError::NoSpeech);
        }
        Ok(Some(transcript))
    }
}

fn classify_failure(stderr: &str, code: i32) -> DictationError {
    let lowered = stderr.to_lowercase();
    if lowered.contains("no-speech") || lowered.contains("no speech") {
        DictationError::NoSpeech
    } else if lowered.contains("audio-capture")
        || lowered.contains("no microphone")
        || lowered.contains("no such device")
    {
        DictationError::NoMicrophone
    } else if lowered.contains("not-allowed") || lowered.contains("permission denied") {
        DictationError::PermissionDenied
    } else if stderr.trim().is_empty() {
        DictationError::Other(format!("recognizer exited with status {code}"))
    } else {
        DictationError::Other(stderr.trim().to_string())
    }
}
