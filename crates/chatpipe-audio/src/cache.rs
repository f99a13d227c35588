//! Content-addressed transcript cache.
//!
//! The key digests every knob that could alter a transcript: audio content
//! hash, provider, model, chunk window, overlap, VAD thresholds, and the
//! pipeline schema version. Entries are written atomically in canonical
//! JSON; readers tolerate a missing or corrupted entry by recomputing.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::{debug, warn};

use chatpipe_message::{AsrDerived, Status, StatusReason};
use chatpipe_utils::atomic_write::write_text_atomic;
use chatpipe_utils::canonical::to_canonical_json;

use crate::error::AudioError;

/// Everything that participates in the cache key.
#[derive(Debug, Serialize)]
pub struct CacheKeyInputs<'a> {
    pub audio_sha256: &'a str,
    pub provider: &'a str,
    pub model: &'a str,
    pub chunk_seconds: f64,
    pub chunk_overlap_seconds: f64,
    pub vad_min_speech_ratio: f64,
    pub vad_min_speech_seconds: f64,
    pub pipeline_version: &'a str,
}

impl CacheKeyInputs<'_> {
    /// Digest the inputs into the cache key (blake3 over canonical JSON).
    #[must_use]
    pub fn key(&self) -> String {
        let json = to_canonical_json(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

/// The full hydrated terminal state of one voice message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub schema_version: String,
    pub content_text: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<StatusReason>,
    pub partial: bool,
    pub asr: AsrDerived,
}

/// Cache directory handle rooted at `<cache_root>/audio`.
#[derive(Debug, Clone)]
pub struct AudioCache {
    dir: Utf8PathBuf,
}

impl AudioCache {
    #[must_use]
    pub fn new(cache_root: &Utf8Path) -> Self {
        Self {
            dir: cache_root.join("audio"),
        }
    }

    fn entry_path(&self, key: &str) -> Utf8PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Load an entry if a complete, parseable one exists.
    ///
    /// Corrupted entries are removed and treated as a miss.
    #[must_use]
    pub fn load(&self, key: &str) -> Option<CacheEntry> {
        let path = self.entry_path(key);
        let content = fs::read_to_string(path.as_std_path()).ok()?;
        match serde_json::from_str::<CacheEntry>(&content) {
            Ok(entry) => {
                debug!(key, "Audio cache hit");
                Some(entry)
            }
            Err(e) => {
                warn!(key, error = %e, "Corrupted cache entry removed");
                let _ = fs::remove_file(path.as_std_path());
                None
            }
        }
    }

    /// Write an entry atomically (temp file + rename) in canonical JSON.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::Cache`] when serialization or the write
    /// fails.
    pub fn store(&self, key: &str, entry: &CacheEntry) -> Result<(), AudioError> {
        let json = to_canonical_json(entry).map_err(|e| AudioError::Cache {
            reason: e.to_string(),
        })?;
        write_text_atomic(&self.entry_path(key), &json).map_err(|e| AudioError::Cache {
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatpipe_message::ErrorSummary;
    use tempfile::TempDir;

    fn inputs<'a>(hash: &'a str, provider: &'a str) -> CacheKeyInputs<'a> {
        CacheKeyInputs {
            audio_sha256: hash,
            provider,
            model: "whisper-1",
            chunk_seconds: 120.0,
            chunk_overlap_seconds: 0.25,
            vad_min_speech_ratio: 0.05,
            vad_min_speech_seconds: 0.3,
            pipeline_version: crate::PIPELINE_VERSION,
        }
    }

    fn entry() -> CacheEntry {
        CacheEntry {
            schema_version: chatpipe_message::SCHEMA_VERSION.to_string(),
            content_text: "chunk-0\nchunk-1".to_string(),
            status: Status::Ok,
            status_reason: None,
            partial: false,
            asr: AsrDerived {
                pipeline_version: crate::PIPELINE_VERSION.to_string(),
                provider: "stub".to_string(),
                model: "stub".to_string(),
                language_hint: "auto".to_string(),
                total_duration_seconds: 3.5,
                chunks: Vec::new(),
                vad: None,
                error_summary: ErrorSummary::default(),
                cost: 0.0,
                ffmpeg_log_tail: None,
            },
        }
    }

    #[test]
    fn key_changes_with_every_knob() {
        let base = inputs("abc", "openai").key();
        assert_eq!(base, inputs("abc", "openai").key());

        assert_ne!(base, inputs("abd", "openai").key());
        assert_ne!(base, inputs("abc", "stub").key());

        let mut other = inputs("abc", "openai");
        other.chunk_seconds = 60.0;
        assert_ne!(base, other.key());

        let mut other = inputs("abc", "openai");
        other.chunk_overlap_seconds = 0.5;
        assert_ne!(base, other.key());

        let mut other = inputs("abc", "openai");
        other.vad_min_speech_ratio = 0.1;
        assert_ne!(base, other.key());

        let mut other = inputs("abc", "openai");
        other.pipeline_version = "asr-v2";
        assert_ne!(base, other.key());
    }

    #[test]
    fn store_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let cache = AudioCache::new(&root);

        let key = inputs("abc", "stub").key();
        assert!(cache.load(&key).is_none());

        cache.store(&key, &entry()).unwrap();
        assert_eq!(cache.load(&key).unwrap(), entry());
    }

    #[test]
    fn corrupted_entries_are_removed_and_miss() {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let cache = AudioCache::new(&root);

        let key = inputs("abc", "stub").key();
        let path = root.join("audio").join(format!("{key}.json"));
        std::fs::create_dir_all(path.parent().unwrap().as_std_path()).unwrap();
        std::fs::write(path.as_std_path(), b"{ half a json").unwrap();

        assert!(cache.load(&key).is_none());
        assert!(!path.exists());
    }

    #[test]
    fn entries_are_canonical_json() {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let cache = AudioCache::new(&root);

        let key = inputs("abc", "stub").key();
        cache.store(&key, &entry()).unwrap();

        let raw =
            std::fs::read_to_string(root.join("audio").join(format!("{key}.json")).as_std_path())
                .unwrap();
        // Canonical form: keys sorted, no insignificant whitespace.
        assert!(raw.starts_with(r#"{"asr":"#));
        assert!(!raw.contains('\n'));
    }
}
