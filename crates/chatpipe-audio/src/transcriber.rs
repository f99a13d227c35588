//! The audio transcriber: cache check → normalize → VAD → chunk →
//! recognize → assemble → cache write.
//!
//! Every failure maps to a defined terminal record state; the transcriber
//! never propagates an error up to the step. Non-voice records and voice
//! records without a resolved media file pass through untouched.

use camino::{Utf8Path, Utf8PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use chatpipe_asr::{AsrClient, ChunkRequest};
use chatpipe_config::Config;
use chatpipe_message::{
    AsrChunk, AsrDerived, ChunkStatus, ErrorSummary, Kind, Message, Status, StatusReason, VadStats,
};
use chatpipe_utils::canonical::round3;
use chatpipe_utils::hash::blake3_hex_file;
use chatpipe_utils::paths::{ensure_dir_all, relative_to};

use crate::PIPELINE_VERSION;
use crate::SUPPORTED_SOURCE_EXTS;
use crate::cache::{AudioCache, CacheEntry, CacheKeyInputs};
use crate::chunk::{ChunkPlan, write_chunks};
use crate::cost::estimate_cost;
use crate::error::AudioError;
use crate::normalize::Normalizer;
use crate::vad::analyze_vad;
use crate::wav::read_wav;

/// Placeholder for records whose audio never reached recognition.
pub const CONVERSION_FAILED_TEXT: &str = "[AUDIO CONVERSION FAILED]";
/// Placeholder for records whose recognition failed on every chunk.
pub const TRANSCRIPTION_FAILED_TEXT: &str = "[AUDIO TRANSCRIPTION FAILED]";

/// How a transcription attempt ended from the scheduler's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscribeOutcome {
    /// The record reached a terminal state (ok, partial, or failed).
    Completed,
    /// Cancellation was observed before a terminal state; the record must
    /// not be treated as processed.
    Cancelled,
}

/// Per-run audio transcription engine. Shared read-only across workers.
pub struct AudioTranscriber {
    config: Config,
    client: AsrClient,
    normalizer: Normalizer,
    cache: AudioCache,
    run_dir: Utf8PathBuf,
    tmp_root: Utf8PathBuf,
}

impl AudioTranscriber {
    #[must_use]
    pub fn new(
        config: &Config,
        client: AsrClient,
        normalizer: Normalizer,
        run_dir: &Utf8Path,
    ) -> Self {
        let cache = AudioCache::new(&config.audio.effective_cache_dir());
        Self {
            config: config.clone(),
            client,
            normalizer,
            cache,
            run_dir: run_dir.to_owned(),
            tmp_root: run_dir.join("tmp").join("audio"),
        }
    }

    /// Transcribe one message in place.
    ///
    /// Idempotent across runs through the content-addressed cache: a
    /// second invocation with unchanged knobs hydrates without invoking
    /// the normalizer or any backend.
    pub async fn transcribe_message(
        &self,
        msg: &mut Message,
        cancel: &CancellationToken,
    ) -> TranscribeOutcome {
        if msg.kind != Kind::Voice {
            return TranscribeOutcome::Completed;
        }
        let Some(source) = msg.media_filename.clone() else {
            // Unresolved voice media was already marked by the resolver.
            return TranscribeOutcome::Completed;
        };

        // Pre-normalize format gate.
        let ext = source.extension().unwrap_or("").to_ascii_lowercase();
        if !SUPPORTED_SOURCE_EXTS.contains(&ext.as_str()) {
            let err = AudioError::UnsupportedFormat {
                detail: format!("extension '.{ext}'"),
            };
            self.apply_failure(msg, &err, None);
            return TranscribeOutcome::Completed;
        }

        let audio_sha = match blake3_hex_file(&source) {
            Ok(hash) => hash,
            Err(e) => {
                let err = AudioError::SourceUnreadable {
                    path: source.to_string(),
                    reason: e.to_string(),
                };
                self.apply_failure(msg, &err, None);
                return TranscribeOutcome::Completed;
            }
        };

        let key = self.cache_key(&audio_sha);
        if let Some(entry) = self.cache.load(&key) {
            debug!(idx = msg.idx, "Hydrating voice message from cache");
            hydrate(msg, &entry);
            return TranscribeOutcome::Completed;
        }

        if cancel.is_cancelled() {
            return TranscribeOutcome::Cancelled;
        }

        match self.run_ladder(msg, &source, cancel).await {
            Ok(TranscribeOutcome::Cancelled) => TranscribeOutcome::Cancelled,
            Ok(TranscribeOutcome::Completed) => {
                self.store_cache(msg, &key);
                TranscribeOutcome::Completed
            }
            Err(err) => {
                self.apply_failure(msg, &err, None);
                self.store_cache(msg, &key);
                TranscribeOutcome::Completed
            }
        }
    }

    /// normalize → vad → chunk → recognize → assemble. Mutates `msg` into
    /// its terminal state on success; returns the error for terminal
    /// failure states.
    async fn run_ladder(
        &self,
        msg: &mut Message,
        source: &Utf8Path,
        cancel: &CancellationToken,
    ) -> Result<TranscribeOutcome, AudioError> {
        let work_dir = self.tmp_root.join(format!("{:06}", msg.idx));
        ensure_dir_all(&work_dir).map_err(|e| AudioError::ChunkWrite {
            path: work_dir.to_string(),
            reason: e.to_string(),
        })?;
        let normalized_path = work_dir.join("norm.wav");

        self.normalizer.normalize(source, &normalized_path).await?;

        let audio = read_wav(&normalized_path)?;

        // Observational only: stats are attached, nothing is gated.
        let vad = analyze_vad(
            &audio,
            self.config.audio.vad_min_speech_ratio,
            self.config.audio.vad_min_speech_seconds,
        );

        let plans = write_chunks(
            &audio,
            source,
            &work_dir.join("chunks"),
            self.config.audio.chunk_seconds,
            self.config.audio.chunk_overlap_seconds,
        )?;

        let total_duration = round3(audio.duration_seconds());
        let mut chunks: Vec<AsrChunk> = Vec::with_capacity(plans.len());
        let mut last_error_kind: Option<String> = None;
        let mut last_error_message: Option<String> = None;

        for plan in &plans {
            if cancel.is_cancelled() {
                return Ok(TranscribeOutcome::Cancelled);
            }
            let row = self.transcribe_one_chunk(plan, msg).await;
            if row.status == ChunkStatus::Error {
                if let Some(err) = &row.error {
                    let (kind, detail) = err
                        .split_once(": ")
                        .map_or((err.as_str(), err.as_str()), |(k, d)| (k, d));
                    last_error_kind = Some(kind.to_string());
                    last_error_message = Some(detail.to_string());
                }
            }
            chunks.push(row);
        }

        let chunks_ok = chunks.iter().filter(|c| c.status == ChunkStatus::Ok).count();
        let chunks_error = chunks.len() - chunks_ok;

        // Assemble successful chunk texts in chunk order.
        let assembly = chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Ok)
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if !assembly.is_empty() {
            if msg.content_text.is_empty() {
                msg.content_text = assembly;
            } else {
                msg.content_text.push('\n');
                msg.content_text.push_str(&assembly);
            }
        }

        // Status resolution.
        if chunks_error == 0 {
            msg.status = Status::Ok;
            msg.status_reason = None;
            msg.partial = false;
        } else if chunks_ok > 0 {
            msg.status = Status::Partial;
            msg.status_reason = Some(StatusReason::AsrPartial);
            msg.partial = true;
        } else {
            msg.status = Status::Failed;
            msg.status_reason = Some(
                if last_error_kind.as_deref() == Some("timeout") {
                    StatusReason::TimeoutAsr
                } else {
                    StatusReason::AsrFailed
                },
            );
            msg.partial = false;
            if msg.content_text.is_empty() {
                msg.content_text = TRANSCRIPTION_FAILED_TEXT.to_string();
            }
        }

        let billable_seconds: f64 = plans.iter().map(|p| p.duration_sec).sum();
        let cost = estimate_cost(
            self.client.provider(),
            &self.config.asr.model,
            &self.config.asr.billing_plan,
            billable_seconds,
        );

        msg.derived.asr = Some(AsrDerived {
            pipeline_version: PIPELINE_VERSION.to_string(),
            provider: self.client.provider().to_string(),
            model: self.config.asr.model.clone(),
            language_hint: self.config.asr.language_hint.clone(),
            total_duration_seconds: total_duration,
            chunks,
            vad: Some(vad),
            error_summary: ErrorSummary {
                chunks_ok,
                chunks_error,
                last_error_kind,
                last_error_message,
            },
            cost,
            ffmpeg_log_tail: None,
        });

        Ok(TranscribeOutcome::Completed)
    }

    async fn transcribe_one_chunk(&self, plan: &ChunkPlan, msg: &mut Message) -> AsrChunk {
        let request = ChunkRequest {
            wav_path: plan.wav_chunk_path.clone(),
            chunk_index: plan.chunk_index,
            start_sec: plan.start_sec,
            end_sec: plan.end_sec,
            language_hint: self.config.asr.language_hint.clone(),
            model: self.config.asr.model.clone(),
            timeout: std::time::Duration::from_secs(self.config.asr.timeout_secs),
        };
        let rel_path = relative_to(&plan.wav_chunk_path, &self.run_dir);

        match self.client.transcribe_chunk(&request).await {
            Ok(result) => AsrChunk {
                chunk_index: plan.chunk_index,
                start_sec: plan.start_sec,
                end_sec: plan.end_sec,
                duration_sec: plan.duration_sec,
                status: ChunkStatus::Ok,
                text: result.text,
                error: None,
                language: result.language,
                wav_chunk_path: rel_path,
            },
            Err(err) => {
                let kind = err.kind();
                msg.push_error(format!("chunk {} {}: {err}", plan.chunk_index, kind.as_str()));
                // Recorded as "<kind>: <detail>" so status resolution can
                // recover the last error class.
                AsrChunk {
                    chunk_index: plan.chunk_index,
                    start_sec: plan.start_sec,
                    end_sec: plan.end_sec,
                    duration_sec: plan.duration_sec,
                    status: ChunkStatus::Error,
                    text: String::new(),
                    error: Some(format!("{}: {err}", kind.as_str())),
                    language: None,
                    wav_chunk_path: rel_path,
                }
            }
        }
    }

    /// Apply a pre-recognition failure as the record's terminal state.
    fn apply_failure(&self, msg: &mut Message, err: &AudioError, vad: Option<VadStats>) {
        let reason = err.status_reason();
        msg.status = Status::Failed;
        msg.status_reason = Some(reason);
        msg.partial = false;
        msg.push_error(err.to_string());

        if msg.content_text.is_empty() {
            msg.content_text = match reason {
                StatusReason::AsrFailed | StatusReason::TimeoutAsr => {
                    TRANSCRIPTION_FAILED_TEXT.to_string()
                }
                _ => CONVERSION_FAILED_TEXT.to_string(),
            };
        }

        msg.derived.asr = Some(AsrDerived {
            pipeline_version: PIPELINE_VERSION.to_string(),
            provider: self.client.provider().to_string(),
            model: self.config.asr.model.clone(),
            language_hint: self.config.asr.language_hint.clone(),
            total_duration_seconds: 0.0,
            chunks: Vec::new(),
            vad,
            error_summary: ErrorSummary {
                chunks_ok: 0,
                chunks_error: 0,
                last_error_kind: Some(reason.as_str().to_string()),
                last_error_message: Some(err.to_string()),
            },
            cost: 0.0,
            ffmpeg_log_tail: err.log_tail().map(str::to_string),
        });
    }

    fn cache_key(&self, audio_sha: &str) -> String {
        CacheKeyInputs {
            audio_sha256: audio_sha,
            provider: self.client.provider(),
            model: &self.config.asr.model,
            chunk_seconds: self.config.audio.chunk_seconds,
            chunk_overlap_seconds: self.config.audio.chunk_overlap_seconds,
            vad_min_speech_ratio: self.config.audio.vad_min_speech_ratio,
            vad_min_speech_seconds: self.config.audio.vad_min_speech_seconds,
            pipeline_version: PIPELINE_VERSION,
        }
        .key()
    }

    /// Persist the terminal state. Cache failures degrade to a warning;
    /// the transcript itself is already in the record.
    fn store_cache(&self, msg: &Message, key: &str) {
        let Some(asr) = msg.derived.asr.clone() else {
            return;
        };
        let entry = CacheEntry {
            schema_version: chatpipe_message::SCHEMA_VERSION.to_string(),
            content_text: msg.content_text.clone(),
            status: msg.status,
            status_reason: msg.status_reason,
            partial: msg.partial,
            asr,
        };
        if let Err(e) = self.cache.store(key, &entry) {
            warn!(idx = msg.idx, error = %e, "Failed to write audio cache entry");
        }
    }
}

fn hydrate(msg: &mut Message, entry: &CacheEntry) {
    msg.content_text = entry.content_text.clone();
    msg.status = entry.status;
    msg.status_reason = entry.status_reason;
    msg.partial = entry.partial;
    msg.derived.asr = Some(entry.asr.clone());
}
