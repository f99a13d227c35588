use thiserror::Error;

/// Run-level failures surfaced to the CLI.
///
/// Item-level trouble (bad audio, ASR errors, unresolved media) never
/// appears here; it lives in the records. These are the genuine
/// infrastructure and configuration failures that stop a run.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Another run holds the lock on {run_dir}")]
    LockHeld { run_dir: String },

    #[error("Step {step} failed: {reason}")]
    Step { step: String, reason: String },

    #[error("Run cancelled during {step}")]
    Cancelled { step: String },
}
