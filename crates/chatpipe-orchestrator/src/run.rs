//! Step sequencing and the M3 worker pool.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use camino::Utf8PathBuf;
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use chatpipe_asr::AsrClient;
use chatpipe_audio::{AudioTranscriber, Normalizer, PIPELINE_VERSION, TranscribeOutcome};
use chatpipe_config::Config;
use chatpipe_manifest::{
    Metrics, MANIFEST_SCHEMA_VERSION, RunManifest, StepId, StepStatus, read_manifest,
    write_manifest, write_metrics,
};
use chatpipe_media::{MediaIndex, Resolver, write_exceptions};
use chatpipe_message::{Kind, Message, Status, StatusReason, read_jsonl, write_jsonl};
use chatpipe_runner::TokioRunner;
use chatpipe_utils::canonical::{round3, round6};
use chatpipe_utils::logging::StepLog;
use chatpipe_utils::paths::ensure_dir_all;

use crate::error::OrchestratorError;
use crate::paths::RunPaths;

/// Inputs for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Archive root containing the transcript and media tree.
    pub root: Utf8PathBuf,
    /// The chat transcript file.
    pub chat_file: Utf8PathBuf,
    pub config: Config,
}

/// Final state handed back to the CLI.
#[derive(Debug)]
pub struct RunReport {
    pub manifest: RunManifest,
    pub metrics: Metrics,
    pub paths: RunPaths,
}

/// Why a step stopped.
enum StepFailure {
    Infra(String),
    Cancelled(String),
}

/// Executes the pipeline steps against one run directory.
#[derive(Debug)]
pub struct Orchestrator {
    options: RunOptions,
    paths: RunPaths,
    run_id: String,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Validate configuration and fix the run directory layout.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Config`] for invalid configuration.
    pub fn new(options: RunOptions) -> Result<Self, OrchestratorError> {
        options
            .config
            .validate()
            .map_err(|e| OrchestratorError::Config(e.to_string()))?;

        let run_dir = options
            .config
            .run
            .run_dir
            .clone()
            .unwrap_or_else(|| options.root.join("run"));
        let run_id = options
            .config
            .run
            .run_id
            .clone()
            .unwrap_or_else(|| derive_run_id(&options.chat_file));

        Ok(Self {
            paths: RunPaths::new(&run_dir),
            run_id,
            cancel: CancellationToken::new(),
            options,
        })
    }

    /// Token observed by workers at suspension points. Cancelling it marks
    /// the in-progress step failed with a distinguishable error.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn paths(&self) -> &RunPaths {
        &self.paths
    }

    /// Execute the full pipeline.
    ///
    /// # Errors
    ///
    /// Returns run-level failures only; per-item trouble is recorded in
    /// the stage outputs.
    pub async fn run(&self) -> Result<RunReport, OrchestratorError> {
        ensure_dir_all(&self.paths.run_dir)
            .map_err(|e| OrchestratorError::Config(e.to_string()))?;
        ensure_dir_all(&self.paths.logs_dir)
            .map_err(|e| OrchestratorError::Config(e.to_string()))?;

        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.paths.lock.as_std_path())
            .map_err(|e| OrchestratorError::Config(format!("cannot open run lock: {e}")))?;
        let mut lock = fd_lock::RwLock::new(lock_file);
        let _guard = lock.try_write().map_err(|_| OrchestratorError::LockHeld {
            run_dir: self.paths.run_dir.to_string(),
        })?;

        let started = Instant::now();
        let mut manifest = self.load_or_new_manifest()?;
        manifest.summary.error = None;
        manifest.end_time = None;

        // M1_parse
        if self.should_skip(&manifest, StepId::M1Parse) {
            info!(step = StepId::M1Parse.as_str(), "Step already complete, skipping");
        } else {
            self.begin(&mut manifest, StepId::M1Parse)?;
            let log = self.step_log(StepId::M1Parse)?;
            if let Err(f) = self.exec_m1(&mut manifest, &log) {
                return Err(self.fail(&mut manifest, StepId::M1Parse, f));
            }
            self.finish(&mut manifest, StepId::M1Parse)?;
        }
        self.check_cancelled(&mut manifest, StepId::M2Media)?;

        // M2_media
        if self.should_skip(&manifest, StepId::M2Media) {
            info!(step = StepId::M2Media.as_str(), "Step already complete, skipping");
        } else {
            self.begin(&mut manifest, StepId::M2Media)?;
            let log = self.step_log(StepId::M2Media)?;
            if let Err(f) = self.exec_m2(&mut manifest, &log) {
                return Err(self.fail(&mut manifest, StepId::M2Media, f));
            }
            self.finish(&mut manifest, StepId::M2Media)?;
        }
        self.check_cancelled(&mut manifest, StepId::M3Audio)?;

        // M3_audio
        if self.should_skip(&manifest, StepId::M3Audio) {
            info!(step = StepId::M3Audio.as_str(), "Step already complete, skipping");
        } else {
            self.begin(&mut manifest, StepId::M3Audio)?;
            let log = self.step_log(StepId::M3Audio)?;
            if let Err(f) = self.exec_m3(&mut manifest, &log).await {
                return Err(self.fail(&mut manifest, StepId::M3Audio, f));
            }
            self.finish(&mut manifest, StepId::M3Audio)?;
        }
        self.check_cancelled(&mut manifest, StepId::M5Render)?;

        // M5_render
        if self.should_skip(&manifest, StepId::M5Render) {
            info!(step = StepId::M5Render.as_str(), "Step already complete, skipping");
        } else {
            self.begin(&mut manifest, StepId::M5Render)?;
            let log = self.step_log(StepId::M5Render)?;
            if let Err(f) = self.exec_m5(&mut manifest, &log) {
                return Err(self.fail(&mut manifest, StepId::M5Render, f));
            }
            self.finish(&mut manifest, StepId::M5Render)?;
        }

        let metrics = self.compute_metrics(started)?;
        write_metrics(&self.paths.metrics, &metrics).map_err(|e| OrchestratorError::Step {
            step: "metrics".to_string(),
            reason: e.to_string(),
        })?;

        manifest.current_step = None;
        manifest.end_time = Some(Utc::now());
        self.persist(&manifest)
            .map_err(|f| self.failure_to_error(StepId::M5Render, f))?;

        Ok(RunReport {
            manifest,
            metrics,
            paths: self.paths.clone(),
        })
    }

    // ------------------------------------------------------------------
    // Step bodies
    // ------------------------------------------------------------------

    fn exec_m1(&self, manifest: &mut RunManifest, log: &StepLog) -> Result<(), StepFailure> {
        let messages = chatpipe_parser::parse_chat_file(&self.options.chat_file)
            .map_err(|e| StepFailure::Infra(e.to_string()))?;
        write_jsonl(&self.paths.m1, &messages).map_err(|e| StepFailure::Infra(e.to_string()))?;

        let voice_total = messages.iter().filter(|m| m.kind == Kind::Voice).count() as u64;
        manifest.summary.messages_total = messages.len() as u64;
        manifest.summary.voice_total = voice_total;
        let state = manifest.step_mut(StepId::M1Parse);
        state.total = messages.len() as u64;
        state.done = messages.len() as u64;

        log.line(&format!(
            "parsed {} records ({} voice) from {}",
            messages.len(),
            voice_total,
            self.options.chat_file
        ));
        Ok(())
    }

    fn exec_m2(&self, manifest: &mut RunManifest, log: &StepLog) -> Result<(), StepFailure> {
        let mut messages =
            read_jsonl(&self.paths.m1).map_err(|e| StepFailure::Infra(e.to_string()))?;

        // A missing or unreadable media tree degrades: every applicable
        // record resolves to unresolved_media, the run continues.
        let index = match MediaIndex::scan(&self.options.root, &self.options.config.resolver) {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "Media scan failed; continuing with an empty index");
                log.line(&format!("media scan failed: {e}"));
                MediaIndex::empty(&self.options.root)
            }
        };

        let resolver = Resolver::new(&index, &self.options.config.resolver);
        let report = resolver.resolve_all(&mut messages);

        write_exceptions(&self.paths.exceptions, &report.exceptions)
            .map_err(|e| StepFailure::Infra(e.to_string()))?;
        write_jsonl(&self.paths.m2, &messages).map_err(|e| StepFailure::Infra(e.to_string()))?;

        let handled = (report.resolved + report.unresolved + report.ambiguous) as u64;
        let state = manifest.step_mut(StepId::M2Media);
        state.total = handled;
        state.done = handled;

        log.line(&format!(
            "resolved {} / unresolved {} / ambiguous {} over {} indexed artifacts",
            report.resolved,
            report.unresolved,
            report.ambiguous,
            index.len()
        ));
        Ok(())
    }

    async fn exec_m3(&self, manifest: &mut RunManifest, log: &StepLog) -> Result<(), StepFailure> {
        let cfg = &self.options.config;
        let mut messages =
            read_jsonl(&self.paths.m2).map_err(|e| StepFailure::Infra(e.to_string()))?;

        // Item-level resume: retain prior results that match the current
        // pipeline version and did not fail.
        let mut retained: BTreeMap<u64, Message> = BTreeMap::new();
        if cfg.run.resume && !cfg.run.overwrite && self.paths.m3.is_file() {
            match read_jsonl(&self.paths.m3) {
                Ok(prior) => {
                    for msg in prior {
                        let current = msg.kind == Kind::Voice
                            && msg.status != Status::Failed
                            && msg
                                .derived
                                .asr
                                .as_ref()
                                .is_some_and(|a| a.pipeline_version == PIPELINE_VERSION);
                        if current {
                            retained.insert(msg.idx, msg);
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Prior M3 output unreadable; re-transcribing everything");
                }
            }
        }

        let voice_total = messages.iter().filter(|m| m.kind == Kind::Voice).count() as u64;
        let scheduled: Vec<Message> = messages
            .iter()
            .filter(|m| {
                m.kind == Kind::Voice
                    && m.media_filename.is_some()
                    && !retained.contains_key(&m.idx)
            })
            .cloned()
            .collect();

        {
            let state = manifest.step_mut(StepId::M3Audio);
            state.total = voice_total;
            state.done = voice_total - scheduled.len() as u64;
            state.errors = 0;
        }
        self.persist(manifest)?;
        log.line(&format!(
            "{} voice records, {} scheduled, {} retained from prior run",
            voice_total,
            scheduled.len(),
            retained.len()
        ));

        if !scheduled.is_empty() {
            // Backend construction errors (unknown provider, missing
            // credential) are run-level configuration failures.
            let client = AsrClient::from_config(cfg)
                .map_err(|e| StepFailure::Infra(format!("ASR configuration: {e}")))?;
            let normalizer = Normalizer::new(&cfg.audio, Arc::new(TokioRunner));
            let transcriber = Arc::new(AudioTranscriber::new(
                cfg,
                client,
                normalizer,
                &self.paths.run_dir,
            ));

            let mut preview = std::fs::File::create(self.paths.preview.as_std_path())
                .map_err(|e| StepFailure::Infra(format!("cannot create preview file: {e}")))?;

            let semaphore = Arc::new(Semaphore::new(cfg.run.max_workers_audio));
            let mut pool: JoinSet<(u64, Message, TranscribeOutcome)> = JoinSet::new();
            for msg in scheduled {
                let transcriber = Arc::clone(&transcriber);
                let semaphore = Arc::clone(&semaphore);
                let cancel = self.cancel.clone();
                pool.spawn(async move {
                    let mut msg = msg;
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return (msg.idx, msg, TranscribeOutcome::Cancelled);
                    };
                    if cancel.is_cancelled() {
                        return (msg.idx, msg, TranscribeOutcome::Cancelled);
                    }
                    let outcome = transcriber.transcribe_message(&mut msg, &cancel).await;
                    (msg.idx, msg, outcome)
                });
            }

            let mut cancelled = false;
            let mut completed: Vec<Message> = Vec::new();
            while let Some(joined) = pool.join_next().await {
                let (idx, msg, outcome) = joined
                    .map_err(|e| StepFailure::Infra(format!("audio worker panicked: {e}")))?;
                match outcome {
                    TranscribeOutcome::Completed => {
                        append_preview(&mut preview, &msg);
                        log.line(&format!(
                            "voice {} -> {}",
                            idx,
                            msg.status_reason.map_or("ok", |r| r.as_str())
                        ));
                        let state = manifest.step_mut(StepId::M3Audio);
                        state.done += 1;
                        if msg.status == Status::Failed {
                            state.errors += 1;
                        }
                        self.persist(manifest)?;
                        completed.push(msg);
                    }
                    TranscribeOutcome::Cancelled => cancelled = true,
                }
            }

            if cancelled || self.cancel.is_cancelled() {
                return Err(StepFailure::Cancelled(
                    "audio transcription interrupted".to_string(),
                ));
            }

            for done in completed {
                if let Some(slot) = messages.iter_mut().find(|m| m.idx == done.idx) {
                    *slot = done;
                }
            }
        }

        for (idx, prior) in retained {
            if let Some(slot) = messages.iter_mut().find(|m| m.idx == idx) {
                *slot = prior;
            }
        }

        write_jsonl(&self.paths.m3, &messages).map_err(|e| StepFailure::Infra(e.to_string()))?;
        Ok(())
    }

    fn exec_m5(&self, manifest: &mut RunManifest, log: &StepLog) -> Result<(), StepFailure> {
        let messages =
            read_jsonl(&self.paths.m3).map_err(|e| StepFailure::Infra(e.to_string()))?;
        chatpipe_render::write_transcript(&self.paths.transcript, &messages)
            .map_err(|e| StepFailure::Infra(e.to_string()))?;

        let state = manifest.step_mut(StepId::M5Render);
        state.total = 1;
        state.done = 1;
        log.line(&format!(
            "rendered {} records to {}",
            messages.len(),
            self.paths.transcript
        ));
        Ok(())
    }

    fn compute_metrics(&self, started: Instant) -> Result<Metrics, OrchestratorError> {
        let messages = read_jsonl(&self.paths.m3).map_err(|e| OrchestratorError::Step {
            step: "metrics".to_string(),
            reason: e.to_string(),
        })?;

        let voice: Vec<&Message> = messages.iter().filter(|m| m.kind == Kind::Voice).collect();
        let media: Vec<&Message> = messages
            .iter()
            .filter(|m| m.kind.expects_media() && m.status != Status::Skipped)
            .collect();

        let audio_seconds_total: f64 = voice
            .iter()
            .filter_map(|m| m.derived.asr.as_ref())
            .map(|a| a.total_duration_seconds)
            .sum();
        let asr_cost_total: f64 = voice
            .iter()
            .filter_map(|m| m.derived.asr.as_ref())
            .map(|a| a.cost)
            .sum();

        let cfg = &self.options.config;
        Ok(Metrics {
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
            messages_total: messages.len() as u64,
            voice_total: voice.len() as u64,
            voice_ok: voice.iter().filter(|m| m.status == Status::Ok).count() as u64,
            voice_partial: voice.iter().filter(|m| m.status == Status::Partial).count() as u64,
            voice_failed: voice.iter().filter(|m| m.status == Status::Failed).count() as u64,
            media_resolved: media.iter().filter(|m| m.media_filename.is_some()).count() as u64,
            media_unresolved: media
                .iter()
                .filter(|m| m.status_reason == Some(StatusReason::UnresolvedMedia))
                .count() as u64,
            media_ambiguous: media
                .iter()
                .filter(|m| m.status_reason == Some(StatusReason::AmbiguousMedia))
                .count() as u64,
            asr_provider: cfg.asr.provider.clone(),
            asr_model: cfg.asr.model.clone(),
            asr_language: cfg.asr.language_hint.clone(),
            audio_seconds_total: round3(audio_seconds_total),
            asr_cost_total: round6(asr_cost_total),
            wall_clock_seconds: round3(started.elapsed().as_secs_f64()),
        })
    }

    // ------------------------------------------------------------------
    // Step lifecycle plumbing
    // ------------------------------------------------------------------

    fn load_or_new_manifest(&self) -> Result<RunManifest, OrchestratorError> {
        let fresh = || {
            RunManifest::new(
                &self.run_id,
                self.options.root.as_str(),
                self.options.chat_file.as_str(),
            )
        };
        if !self.options.config.run.resume || self.options.config.run.overwrite {
            return Ok(fresh());
        }
        match read_manifest(&self.paths.manifest) {
            Ok(Some(prior)) => Ok(prior),
            Ok(None) => Ok(fresh()),
            // Schema drift on an existing manifest is a real failure, not
            // something to silently overwrite.
            Err(e) => Err(OrchestratorError::Config(e.to_string())),
        }
    }

    fn should_skip(&self, manifest: &RunManifest, step: StepId) -> bool {
        !self.options.config.run.overwrite
            && self.paths.step_output(step).is_file()
            && manifest.is_step_ok(step)
    }

    fn step_log(&self, step: StepId) -> Result<StepLog, OrchestratorError> {
        StepLog::open(&self.paths.logs_dir, step.as_str())
            .map_err(|e| OrchestratorError::Config(e.to_string()))
    }

    fn begin(&self, manifest: &mut RunManifest, step: StepId) -> Result<(), OrchestratorError> {
        info!(step = step.as_str(), "Step starting");
        manifest.current_step = Some(step.as_str().to_string());
        let state = manifest.step_mut(step);
        state.status = StepStatus::Running;
        state.total = 0;
        state.done = 0;
        state.errors = 0;
        state.end_time = None;
        self.persist(manifest)
            .map_err(|f| self.failure_to_error(step, f))
    }

    fn finish(&self, manifest: &mut RunManifest, step: StepId) -> Result<(), OrchestratorError> {
        let state = manifest.step_mut(step);
        state.status = StepStatus::Ok;
        state.end_time = Some(Utc::now());
        manifest.current_step = None;
        info!(step = step.as_str(), "Step complete");
        self.persist(manifest)
            .map_err(|f| self.failure_to_error(step, f))
    }

    /// Mark the step failed, record the summary error, and flush the
    /// manifest (best effort) before surfacing the run-level error.
    fn fail(
        &self,
        manifest: &mut RunManifest,
        step: StepId,
        failure: StepFailure,
    ) -> OrchestratorError {
        let (summary, error) = match failure {
            StepFailure::Infra(reason) => (
                format!("{}: {reason}", step.as_str()),
                OrchestratorError::Step {
                    step: step.as_str().to_string(),
                    reason,
                },
            ),
            StepFailure::Cancelled(reason) => (
                format!("cancelled: {reason}"),
                OrchestratorError::Cancelled {
                    step: step.as_str().to_string(),
                },
            ),
        };

        let state = manifest.step_mut(step);
        state.status = StepStatus::Failed;
        state.end_time = Some(Utc::now());
        manifest.summary.error = Some(summary);
        manifest.end_time = Some(Utc::now());
        if let Err(e) = write_manifest(&self.paths.manifest, manifest) {
            warn!(error = %e, "Failed to persist manifest during failure handling");
        }
        error
    }

    fn check_cancelled(
        &self,
        manifest: &mut RunManifest,
        next: StepId,
    ) -> Result<(), OrchestratorError> {
        if self.cancel.is_cancelled() {
            return Err(self.fail(
                manifest,
                next,
                StepFailure::Cancelled("cancelled between steps".to_string()),
            ));
        }
        Ok(())
    }

    fn persist(&self, manifest: &RunManifest) -> Result<(), StepFailure> {
        write_manifest(&self.paths.manifest, manifest)
            .map_err(|e| StepFailure::Infra(e.to_string()))
    }

    fn failure_to_error(&self, step: StepId, failure: StepFailure) -> OrchestratorError {
        match failure {
            StepFailure::Infra(reason) => OrchestratorError::Step {
                step: step.as_str().to_string(),
                reason,
            },
            StepFailure::Cancelled(_) => OrchestratorError::Cancelled {
                step: step.as_str().to_string(),
            },
        }
    }
}

fn derive_run_id(chat_file: &camino::Utf8Path) -> String {
    chat_file
        .file_stem()
        .filter(|s| !s.is_empty())
        .unwrap_or("run")
        .to_string()
}

/// One whole line per completed voice item. Append order across workers
/// is unspecified; each line is written atomically.
fn append_preview(preview: &mut std::fs::File, msg: &Message) {
    let snippet: String = msg
        .content_text
        .chars()
        .take(120)
        .collect::<String>()
        .replace('\n', " ");
    let status = match msg.status {
        Status::Ok => "ok",
        Status::Partial => "partial",
        Status::Failed => "failed",
        Status::Skipped => "skipped",
    };
    if let Err(e) = writeln!(preview, "{}\t{}\t{}", msg.idx, status, snippet) {
        warn!(idx = msg.idx, error = %e, "Failed to append preview line");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_derives_from_chat_file_stem() {
        assert_eq!(derive_run_id(camino::Utf8Path::new("/a/chat.txt")), "chat");
        assert_eq!(
            derive_run_id(camino::Utf8Path::new("/a/WhatsApp Chat with Ada.txt")),
            "WhatsApp Chat with Ada"
        );
    }

    #[test]
    fn orchestrator_rejects_invalid_config() {
        let mut config = Config::default();
        config.run.max_workers_audio = 0;
        let err = Orchestrator::new(RunOptions {
            root: Utf8PathBuf::from("/a"),
            chat_file: Utf8PathBuf::from("/a/chat.txt"),
            config,
        })
        .unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(_)));
    }

    #[test]
    fn run_dir_defaults_under_root() {
        let orch = Orchestrator::new(RunOptions {
            root: Utf8PathBuf::from("/archive"),
            chat_file: Utf8PathBuf::from("/archive/chat.txt"),
            config: Config::default(),
        })
        .unwrap();
        assert_eq!(orch.paths().run_dir.as_str(), "/archive/run");
    }
}
