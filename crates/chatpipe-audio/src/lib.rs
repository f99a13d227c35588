//! Audio transcription subsystem: normalize → VAD → chunk → recognize →
//! assemble, with a content-addressed cache in front of the whole ladder.
//!
//! Nothing in this crate ever fails a run: every per-item failure maps to
//! a defined terminal record state with a precise status reason.

mod cache;
mod chunk;
mod cost;
mod error;
mod normalize;
mod transcriber;
mod vad;
mod wav;

pub use cache::{AudioCache, CacheEntry, CacheKeyInputs};
pub use chunk::{ChunkPlan, plan_windows, write_chunks};
pub use cost::{Rounding, estimate_cost};
pub use error::AudioError;
pub use normalize::Normalizer;
pub use transcriber::{AudioTranscriber, TranscribeOutcome};
pub use vad::analyze_vad;
pub use wav::{PcmAudio, is_canonical_wav, read_wav, write_wav};

/// Version of the audio pipeline schema. Part of the cache key and the
/// per-message `derived.asr.pipeline_version`; bumping it invalidates all
/// cached transcripts and forces re-transcription on resume.
pub const PIPELINE_VERSION: &str = "asr-v1";

/// Source container formats the normalizer accepts.
pub const SUPPORTED_SOURCE_EXTS: &[&str] =
    &["opus", "ogg", "m4a", "mp3", "aac", "amr", "wav", "flac"];
