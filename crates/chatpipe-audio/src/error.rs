use thiserror::Error;

use chatpipe_message::StatusReason;

/// Audio stage failures, classified for status mapping.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Normalizer tool not found: {reason}")]
    NormalizerNotFound { reason: String },

    #[error("Audio normalization failed: {reason}")]
    NormalizeFailed {
        reason: String,
        /// Last ≤2 KiB of the tool's stderr.
        log_tail: String,
    },

    #[error("Audio normalization timed out after {timeout_secs}s")]
    NormalizeTimeout { timeout_secs: u64, log_tail: String },

    #[error("Unsupported audio format: {detail}")]
    UnsupportedFormat { detail: String },

    #[error("Audio stream is empty: {path}")]
    EmptyAudio { path: String },

    #[error("Failed to parse wav {path}: {reason}")]
    WavParse { path: String, reason: String },

    #[error("Failed to read source audio {path}: {reason}")]
    SourceUnreadable { path: String, reason: String },

    #[error("Chunk write failed at {path}: {reason}")]
    ChunkWrite { path: String, reason: String },

    #[error("Cache error: {reason}")]
    Cache { reason: String },
}

impl AudioError {
    /// Status reason recorded on the message for this failure.
    ///
    /// The single mapping point from audio error kinds to the closed
    /// status-reason set.
    #[must_use]
    pub const fn status_reason(&self) -> StatusReason {
        match self {
            Self::NormalizeTimeout { .. } => StatusReason::TimeoutFfmpeg,
            Self::NormalizeFailed { .. }
            | Self::NormalizerNotFound { .. }
            | Self::SourceUnreadable { .. } => StatusReason::FfmpegFailed,
            Self::UnsupportedFormat { .. } | Self::EmptyAudio { .. } | Self::WavParse { .. } => {
                StatusReason::AudioUnsupportedFormat
            }
            Self::ChunkWrite { .. } | Self::Cache { .. } => StatusReason::AsrFailed,
        }
    }

    /// Stderr tail carried by normalizer failures.
    #[must_use]
    pub fn log_tail(&self) -> Option<&str> {
        match self {
            Self::NormalizeFailed { log_tail, .. } | Self::NormalizeTimeout { log_tail, .. } => {
                Some(log_tail)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reason_mapping_is_precise() {
        assert_eq!(
            AudioError::NormalizeTimeout {
                timeout_secs: 120,
                log_tail: String::new()
            }
            .status_reason(),
            StatusReason::TimeoutFfmpeg
        );
        assert_eq!(
            AudioError::NormalizeFailed {
                reason: "exit 1".into(),
                log_tail: String::new()
            }
            .status_reason(),
            StatusReason::FfmpegFailed
        );
        assert_eq!(
            AudioError::EmptyAudio { path: "x".into() }.status_reason(),
            StatusReason::AudioUnsupportedFormat
        );
        assert_eq!(
            AudioError::UnsupportedFormat { detail: "x".into() }.status_reason(),
            StatusReason::AudioUnsupportedFormat
        );
    }
}
