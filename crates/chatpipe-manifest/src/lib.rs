//! Versioned run manifest and metrics contracts.
//!
//! Both artifacts are rewritten atomically (temp file + rename) in
//! canonical JSON after every mutation, so readers always observe a
//! complete, byte-stable document.

mod model;
mod writer;

pub use model::{
    MANIFEST_SCHEMA_VERSION, Metrics, RunManifest, StepId, StepState, StepStatus, Summary,
};
pub use writer::{ManifestError, read_manifest, write_manifest, write_metrics};
