//! Deterministic chunking of normalized audio.
//!
//! Windows of `W` seconds advance by `W − overlap`; the first window
//! starts at 0, the last is truncated at end-of-file, and non-positive
//! windows are skipped. Chunk artifacts land at
//! `<chunks_dir>/chunk_{i:04}.wav` so a given input always produces the
//! same file set.

use camino::{Utf8Path, Utf8PathBuf};

use chatpipe_utils::canonical::round3;
use chatpipe_utils::paths::ensure_dir_all;

use crate::error::AudioError;
use crate::wav::{PcmAudio, write_wav};

/// One planned (and written) chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPlan {
    pub chunk_index: usize,
    pub start_sec: f64,
    pub end_sec: f64,
    pub duration_sec: f64,
    pub wav_chunk_path: Utf8PathBuf,
}

/// Compute window offsets over `total_secs`.
///
/// Offsets are rounded to 3 decimals for stable equality across runs.
/// Callers guarantee `overlap < window` (config validation).
#[must_use]
pub fn plan_windows(total_secs: f64, window: f64, overlap: f64) -> Vec<(f64, f64)> {
    let mut out = Vec::new();
    if total_secs <= 0.0 || window <= 0.0 {
        return out;
    }
    let step = window - overlap;
    let mut start = 0.0;
    while start < total_secs {
        let end = (start + window).min(total_secs);
        if end - start > 0.0 {
            out.push((round3(start), round3(end)));
        }
        start += step;
    }
    out
}

/// Slice `audio` into chunk wav files under `chunks_dir`.
///
/// # Errors
///
/// Returns [`AudioError::EmptyAudio`] for a zero-length stream (which must
/// surface as a failed record, never as an empty traversal) and
/// [`AudioError::ChunkWrite`] on I/O failures.
pub fn write_chunks(
    audio: &PcmAudio,
    source_path: &Utf8Path,
    chunks_dir: &Utf8Path,
    window: f64,
    overlap: f64,
) -> Result<Vec<ChunkPlan>, AudioError> {
    if audio.is_empty() {
        return Err(AudioError::EmptyAudio {
            path: source_path.to_string(),
        });
    }

    ensure_dir_all(chunks_dir).map_err(|e| AudioError::ChunkWrite {
        path: chunks_dir.to_string(),
        reason: e.to_string(),
    })?;

    let windows = plan_windows(audio.duration_seconds(), window, overlap);
    let samples_per_sec = f64::from(audio.sample_rate) * f64::from(audio.channels);

    let mut plans = Vec::with_capacity(windows.len());
    for (chunk_index, (start_sec, end_sec)) in windows.into_iter().enumerate() {
        let start_sample = (start_sec * samples_per_sec) as usize;
        let end_sample = ((end_sec * samples_per_sec) as usize).min(audio.samples.len());
        let slice = &audio.samples[start_sample..end_sample];

        let wav_chunk_path = chunks_dir.join(format!("chunk_{chunk_index:04}.wav"));
        write_wav(&wav_chunk_path, audio.sample_rate, audio.channels, slice)?;

        plans.push(ChunkPlan {
            chunk_index,
            start_sec,
            end_sec,
            duration_sec: round3(end_sec - start_sec),
            wav_chunk_path,
        });
    }
    Ok(plans)
}
