//! Process exit codes for the CLI surface.

/// Run completed; all steps ok.
pub const SUCCESS: i32 = 0;
/// Configuration error (bad config file, unknown provider, missing
/// credential, held lock).
pub const CONFIG_ERROR: i32 = 2;
/// A pipeline step failed (bad chat file, infrastructure error).
pub const STEP_FAILED: i32 = 3;
/// The run was cancelled.
pub const CANCELLED: i32 = 4;
