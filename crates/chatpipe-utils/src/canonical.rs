//! Canonical JSON emission using JCS (RFC 8785).
//!
//! Durable JSON contracts (manifest, metrics, cache entries) are emitted in
//! canonical form so byte-for-byte comparison across runs, worker counts,
//! and platforms is meaningful.

use anyhow::{Context, Result};
use serde::Serialize;

/// Serialize `value` to a canonical JSON string with sorted object keys.
///
/// # Errors
///
/// Returns an error if the value cannot be represented as JSON or the
/// canonicalizer rejects it (e.g. non-finite floats).
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let json_value =
        serde_json::to_value(value).with_context(|| "Failed to serialize value to JSON")?;
    let bytes = serde_json_canonicalizer::to_vec(&json_value)
        .with_context(|| "Failed to canonicalize JSON")?;
    String::from_utf8(bytes).with_context(|| "Canonical JSON was not valid UTF-8")
}

/// Round a float to three decimals.
///
/// Stage contracts require stable float equality for chunk offsets and VAD
/// stats; rounding happens once at the producer, never at readers.
#[must_use]
pub fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Round a float to six decimals (cost amounts).
#[must_use]
pub fn round6(v: f64) -> f64 {
    (v * 1_000_000.0).round() / 1_000_000.0
}
