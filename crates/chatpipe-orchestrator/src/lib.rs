//! The run orchestrator.
//!
//! Sequences the pipeline steps (M1_parse → M2_media → M3_audio →
//! M5_render), owns step-level and item-level resume, fans voice items
//! out over a bounded worker pool, and keeps the manifest and metrics
//! current through atomic rewrites.

mod error;
mod paths;
mod run;

pub use error::OrchestratorError;
pub use paths::RunPaths;
pub use run::{Orchestrator, RunOptions, RunReport};
