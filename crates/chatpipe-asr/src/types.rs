//! Core types for the ASR backend abstraction.

use async_trait::async_trait;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use chatpipe_message::StatusReason;

/// Input to a single per-chunk transcription call.
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    /// Absolute path of the chunk wav on disk.
    pub wav_path: Utf8PathBuf,
    pub chunk_index: usize,
    pub start_sec: f64,
    pub end_sec: f64,
    /// BCP-47-like tag, or `auto`.
    pub language_hint: String,
    pub model: String,
    /// Per-call timeout enforced by the backend.
    pub timeout: Duration,
}

impl ChunkRequest {
    #[must_use]
    pub fn duration_sec(&self) -> f64 {
        self.end_sec - self.start_sec
    }
}

/// Per-chunk status as seen by the transcriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkCallStatus {
    Ok,
    Error,
}

/// Normalized per-chunk result returned by every backend.
#[derive(Debug, Clone)]
pub struct ChunkTranscript {
    pub status: ChunkCallStatus,
    pub text: String,
    pub language: Option<String>,
    pub start_sec: f64,
    pub end_sec: f64,
    pub duration_sec: f64,
    pub error: Option<String>,
    pub provider: &'static str,
    pub model: String,
    /// Provider-native response payload, when one exists.
    pub raw: Option<serde_json::Value>,
}

/// Error kinds backends map their native failures onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsrErrorKind {
    Timeout,
    Auth,
    Quota,
    Client,
    Server,
    Unknown,
}

impl AsrErrorKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Auth => "auth",
            Self::Quota => "quota",
            Self::Client => "client",
            Self::Server => "server",
            Self::Unknown => "unknown",
        }
    }

    /// Kinds the client retries. Terminal kinds (`auth`, `quota`,
    /// `client`) fail fast.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Server | Self::Unknown)
    }
}

/// ASR failures, classified for retry and status mapping.
#[derive(Error, Debug)]
pub enum AsrError {
    #[error("ASR call timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Provider authentication error: {0}")]
    Auth(String),

    #[error("Provider quota exceeded: {0}")]
    Quota(String),

    #[error("Client error: {0}")]
    Client(String),

    #[error("Provider server error: {0}")]
    Server(String),

    #[error("ASR error: {0}")]
    Unknown(String),

    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl AsrError {
    /// The error-kind class used for retry decisions and status mapping.
    ///
    /// Configuration errors have no kind; they surface before any chunk
    /// work begins.
    #[must_use]
    pub const fn kind(&self) -> AsrErrorKind {
        match self {
            Self::Timeout { .. } => AsrErrorKind::Timeout,
            Self::Auth(_) => AsrErrorKind::Auth,
            Self::Quota(_) => AsrErrorKind::Quota,
            Self::Client(_) | Self::Misconfiguration(_) | Self::Unsupported(_) => {
                AsrErrorKind::Client
            }
            Self::Server(_) => AsrErrorKind::Server,
            Self::Unknown(_) => AsrErrorKind::Unknown,
        }
    }
}

/// Map an error kind onto the message status reason recorded by the
/// transcriber: timeouts stay distinguishable, everything else folds into
/// `asr_failed`.
#[must_use]
pub const fn status_reason_for(kind: AsrErrorKind) -> StatusReason {
    match kind {
        AsrErrorKind::Timeout => StatusReason::TimeoutAsr,
        _ => StatusReason::AsrFailed,
    }
}

/// Trait implemented by every ASR provider backend.
///
/// Backends perform exactly one attempt per call; retry policy lives in
/// the [`AsrClient`](crate::AsrClient).
#[async_trait]
pub trait AsrBackend: Send + Sync {
    /// Stable provider identifier recorded in derived metadata.
    fn provider(&self) -> &'static str;

    /// Transcribe one chunk.
    ///
    /// # Errors
    ///
    /// Returns a classified [`AsrError`] on failure.
    async fn transcribe_chunk(&self, req: &ChunkRequest) -> Result<ChunkTranscript, AsrError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classes_are_retryable() {
        assert!(AsrErrorKind::Timeout.is_transient());
        assert!(AsrErrorKind::Server.is_transient());
        assert!(AsrErrorKind::Unknown.is_transient());
        assert!(!AsrErrorKind::Auth.is_transient());
        assert!(!AsrErrorKind::Quota.is_transient());
        assert!(!AsrErrorKind::Client.is_transient());
    }

    #[test]
    fn status_reason_mapping() {
        assert_eq!(
            status_reason_for(AsrErrorKind::Timeout),
            StatusReason::TimeoutAsr
        );
        for kind in [
            AsrErrorKind::Auth,
            AsrErrorKind::Quota,
            AsrErrorKind::Client,
            AsrErrorKind::Server,
            AsrErrorKind::Unknown,
        ] {
            assert_eq!(status_reason_for(kind), StatusReason::AsrFailed);
        }
    }

    #[test]
    fn error_kind_classification() {
        assert_eq!(
            AsrError::Timeout {
                duration: Duration::from_secs(1)
            }
            .kind(),
            AsrErrorKind::Timeout
        );
        assert_eq!(AsrError::Auth("401".into()).kind(), AsrErrorKind::Auth);
        assert_eq!(AsrError::Server("502".into()).kind(), AsrErrorKind::Server);
    }
}
