use thiserror::Error;

/// Process execution failures.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to spawn '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Failed to collect process output: {reason}")]
    OutputFailed { reason: String },
}
