//! Atomic manifest/metrics persistence with a schema gate on read.

use camino::Utf8Path;
use thiserror::Error;
use tracing::warn;

use chatpipe_utils::atomic_write::write_text_atomic;
use chatpipe_utils::canonical::to_canonical_json;

use crate::model::{MANIFEST_SCHEMA_VERSION, Metrics, RunManifest};

/// Manifest persistence failures. These are infrastructure errors: the
/// orchestrator fails the run on them.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to write {path}: {reason}")]
    Write { path: String, reason: String },

    #[error("Incompatible manifest schema version {found} (this build reads {expected})")]
    SchemaVersion { found: String, expected: String },
}

/// Atomically rewrite the manifest.
///
/// # Errors
///
/// Returns [`ManifestError::Write`] on serialization or I/O failure.
pub fn write_manifest(path: &Utf8Path, manifest: &RunManifest) -> Result<(), ManifestError> {
    let json = to_canonical_json(manifest).map_err(|e| ManifestError::Write {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    write_text_atomic(path, &json).map_err(|e| ManifestError::Write {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// Read a prior run's manifest for resume.
///
/// A missing or unparseable file is a clean `None` (the run starts
/// fresh); an incompatible schema major is a loud error.
///
/// # Errors
///
/// Returns [`ManifestError::SchemaVersion`] for unknown majors.
pub fn read_manifest(path: &Utf8Path) -> Result<Option<RunManifest>, ManifestError> {
    let Ok(content) = std::fs::read_to_string(path.as_std_path()) else {
        return Ok(None);
    };
    let manifest: RunManifest = match serde_json::from_str(&content) {
        Ok(m) => m,
        Err(e) => {
            warn!(path = %path, error = %e, "Ignoring unparseable manifest");
            return Ok(None);
        }
    };

    let major = |v: &str| v.split('.').next().map(str::to_string);
    if major(&manifest.schema_version) != major(MANIFEST_SCHEMA_VERSION) {
        return Err(ManifestError::SchemaVersion {
            found: manifest.schema_version,
            expected: MANIFEST_SCHEMA_VERSION.to_string(),
        });
    }
    Ok(Some(manifest))
}

/// Atomically write the metrics summary.
///
/// # Errors
///
/// Returns [`ManifestError::Write`] on serialization or I/O failure.
pub fn write_metrics(path: &Utf8Path, metrics: &Metrics) -> Result<(), ManifestError> {
    let json = to_canonical_json(metrics).map_err(|e| ManifestError::Write {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    write_text_atomic(path, &json).map_err(|e| ManifestError::Write {
        path: path.to_string(),
        reason: e.to_string(),
    })
}
