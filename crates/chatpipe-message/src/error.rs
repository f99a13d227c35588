use thiserror::Error;

/// Failures reading or writing stage message files.
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid record on line {line} of {path}: {reason}")]
    InvalidRecord {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("Incompatible schema version {found} (this build reads {expected})")]
    SchemaVersion { found: String, expected: String },

    #[error("Record idx values are not dense: expected {expected} at position {position}, found {found}")]
    NonDenseIdx {
        expected: u64,
        found: u64,
        position: usize,
    },

    #[error("Record idx {idx}: partial flag is {partial} but status is {status}")]
    PartialFlagMismatch {
        idx: u64,
        partial: bool,
        status: String,
    },
}
