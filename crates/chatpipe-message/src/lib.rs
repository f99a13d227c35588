//! The canonical message record shared by every pipeline stage.
//!
//! One record shape flows through all stage outputs. Enums are closed:
//! out-of-set values fail deserialization, which is the fail-fast contract
//! the stages rely on. Stage files are newline-delimited JSON, one record
//! per line, dense `idx` from 0.

mod error;
mod jsonl;
mod model;
mod schema;

pub use error::MessageError;
pub use jsonl::{read_jsonl, validate_records, write_jsonl};
pub use model::{
    AsrChunk, AsrDerived, ChunkStatus, Derived, Disambiguation, DisambiguationCandidate,
    ErrorSummary, Kind, Message, Status, StatusReason, VadStats,
};
pub use schema::{SCHEMA_VERSION, check_schema_compat};
