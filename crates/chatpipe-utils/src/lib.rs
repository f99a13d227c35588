//! Shared infrastructure for the chatpipe workspace.
//!
//! Durable artifacts (stage JSONL, manifest, metrics, cache entries) all go
//! through [`atomic_write`]; JSON artifacts that must be byte-stable across
//! runs and platforms go through [`canonical`].

pub mod atomic_write;
pub mod canonical;
pub mod hash;
pub mod logging;
pub mod paths;
