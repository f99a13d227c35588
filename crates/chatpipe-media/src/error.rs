use thiserror::Error;

/// Media index and resolution failures.
///
/// Most of these degrade to `unresolved_media` on the affected records;
/// only a missing archive root is surfaced to the orchestrator.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Archive root does not exist: {root}")]
    RootMissing { root: String },

    #[error("IO error under {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to hash {path}: {reason}")]
    Hash { path: String, reason: String },
}
