//! Layered configuration for the chatpipe pipeline.
//!
//! Precedence: CLI overrides (applied by the binary) > `chatpipe.toml`
//! discovered upward from the working directory > built-in defaults. The
//! process environment is read exactly once, by [`Config::freeze_env`],
//! and captured into the config record; no component reads env vars after
//! startup.

mod discovery;
mod model;
mod validation;

pub use discovery::discover;
pub use model::{
    AsrConfig, AudioConfig, Config, LogConfig, ResolverConfig, RunConfig, Weights,
};
pub use validation::ConfigError;
