//! Audio normalization through the external tool.
//!
//! Invokes ffmpeg (or a compatible tool) to produce canonical PCM:
//! 16 kHz, mono, s16le. Sources that already parse as canonical PCM are
//! copied without spawning the tool, and the tool is only resolved on
//! PATH the first time it is actually needed.

use camino::{Utf8Path, Utf8PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

use chatpipe_config::AudioConfig;
use chatpipe_runner::{CommandSpec, ProcessRunner};
use chatpipe_utils::atomic_write::tail_str;

use crate::error::AudioError;
use crate::wav::is_canonical_wav;

/// Stderr bytes preserved into `derived.asr.ffmpeg_log_tail`.
const LOG_TAIL_BYTES: usize = 2048;

/// Converts source audio into canonical PCM with timeout and retry.
pub struct Normalizer {
    tool_spec: String,
    resolved: OnceLock<Option<Utf8PathBuf>>,
    sample_rate: u32,
    channels: u16,
    timeout: Duration,
    max_retries: u32,
    runner: Arc<dyn ProcessRunner>,
}

impl Normalizer {
    /// Build a normalizer over the given process runner.
    #[must_use]
    pub fn new(cfg: &AudioConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            tool_spec: cfg.normalizer_tool_path.clone(),
            resolved: OnceLock::new(),
            sample_rate: cfg.sample_rate,
            channels: cfg.channels,
            timeout: Duration::from_secs(cfg.normalize_timeout_secs),
            max_retries: cfg.normalize_max_retries,
            runner,
        }
    }

    fn resolve_tool(&self) -> Result<&Utf8Path, AudioError> {
        self.resolved
            .get_or_init(|| {
                which::which(&self.tool_spec)
                    .ok()
                    .and_then(|p| Utf8PathBuf::from_path_buf(p).ok())
            })
            .as_deref()
            .ok_or_else(|| AudioError::NormalizerNotFound {
                reason: format!("'{}' not found on PATH", self.tool_spec),
            })
    }

    /// Convert `src` into a canonical PCM wav at `dst`.
    ///
    /// Retries up to the configured count; the terminal error classifies
    /// as a timeout when any attempt timed out, otherwise as a tool
    /// failure, with the last stderr tail attached.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::NormalizeTimeout`],
    /// [`AudioError::NormalizeFailed`], or
    /// [`AudioError::NormalizerNotFound`].
    pub async fn normalize(&self, src: &Utf8Path, dst: &Utf8Path) -> Result<(), AudioError> {
        // Already canonical: a plain copy preserves the contract without
        // the subprocess round-trip.
        if is_canonical_wav(src, self.sample_rate, self.channels) {
            debug!(src = %src, "Source already canonical PCM, copying");
            return std::fs::copy(src.as_std_path(), dst.as_std_path())
                .map(|_| ())
                .map_err(|e| AudioError::NormalizeFailed {
                    reason: format!("copy failed: {e}"),
                    log_tail: String::new(),
                });
        }

        let tool = self.resolve_tool()?;
        let cmd = CommandSpec::new(tool.as_str())
            .args(["-nostdin", "-y", "-i"])
            .arg(src.as_str())
            .args(["-ac", &self.channels.to_string()])
            .args(["-ar", &self.sample_rate.to_string()])
            .args(["-acodec", "pcm_s16le", "-f", "wav"])
            .arg(dst.as_str());

        let mut any_timeout = false;
        let mut last_tail = String::new();
        let attempts = self.max_retries + 1;

        for attempt in 1..=attempts {
            match self.runner.run(&cmd, self.timeout).await {
                Ok(output) if output.success() => return Ok(()),
                Ok(output) => {
                    any_timeout |= output.timed_out;
                    last_tail = tail_str(&output.stderr_string(), LOG_TAIL_BYTES);
                    warn!(
                        src = %src,
                        attempt,
                        timed_out = output.timed_out,
                        exit_code = ?output.exit_code,
                        "Normalization attempt failed"
                    );
                }
                Err(e) => {
                    last_tail = tail_str(&e.to_string(), LOG_TAIL_BYTES);
                    warn!(src = %src, attempt, error = %e, "Normalizer spawn failed");
                }
            }
        }

        if any_timeout {
            Err(AudioError::NormalizeTimeout {
                timeout_secs: self.timeout.as_secs(),
                log_tail: last_tail,
            })
        } else {
            Err(AudioError::NormalizeFailed {
                reason: format!("normalizer failed after {attempts} attempts"),
                log_tail: last_tail,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chatpipe_runner::{ProcessOutput, RunnerError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    struct ScriptedRunner {
        calls: AtomicU32,
        outputs: Vec<ProcessOutput>,
    }

    #[async_trait]
    impl ProcessRunner for ScriptedRunner {
        async fn run(
            &self,
            _cmd: &CommandSpec,
            _timeout: Duration,
        ) -> Result<ProcessOutput, RunnerError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            Ok(self.outputs[i.min(self.outputs.len() - 1)].clone())
        }
    }

    fn failing_output(stderr: &str, timed_out: bool) -> ProcessOutput {
        ProcessOutput {
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
            exit_code: if timed_out { None } else { Some(1) },
            timed_out,
        }
    }

    fn normalizer_with(runner: Arc<dyn ProcessRunner>) -> Normalizer {
        // `sh` stands in for the tool so PATH resolution succeeds without
        // ffmpeg installed; the scripted runner never spawns it.
        let cfg = AudioConfig {
            normalizer_tool_path: "sh".to_string(),
            normalize_timeout_secs: 5,
            normalize_max_retries: 2,
            ..AudioConfig::default()
        };
        Normalizer::new(&cfg, runner)
    }

    #[tokio::test]
    async fn canonical_source_is_copied_without_the_tool() {
        let dir = TempDir::new().unwrap();
        let src = camino::Utf8PathBuf::from_path_buf(dir.path().join("src.wav")).unwrap();
        let dst = camino::Utf8PathBuf::from_path_buf(dir.path().join("dst.wav")).unwrap();
        crate::wav::write_wav(&src, 16_000, 1, &[1, 2, 3, 4]).unwrap();

        let runner = Arc::new(ScriptedRunner {
            calls: AtomicU32::new(0),
            outputs: vec![failing_output("should never run", false)],
        });
        let norm = normalizer_with(Arc::clone(&runner) as Arc<dyn ProcessRunner>);

        norm.normalize(&src, &dst).await.unwrap();
        assert!(dst.is_file());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhausted_retries_classify_as_failure_with_tail() {
        let dir = TempDir::new().unwrap();
        let src = camino::Utf8PathBuf::from_path_buf(dir.path().join("a.opus")).unwrap();
        let dst = camino::Utf8PathBuf::from_path_buf(dir.path().join("a.wav")).unwrap();
        std::fs::write(src.as_std_path(), b"opus-ish").unwrap();

        let runner = Arc::new(ScriptedRunner {
            calls: AtomicU32::new(0),
            outputs: vec![failing_output("codec not found", false)],
        });
        let norm = normalizer_with(runner);

        let err = norm.normalize(&src, &dst).await.unwrap_err();
        assert!(matches!(err, AudioError::NormalizeFailed { .. }));
        assert_eq!(err.log_tail(), Some("codec not found"));
    }

    #[tokio::test]
    async fn any_timeout_attempt_classifies_as_timeout() {
        let dir = TempDir::new().unwrap();
        let src = camino::Utf8PathBuf::from_path_buf(dir.path().join("a.opus")).unwrap();
        let dst = camino::Utf8PathBuf::from_path_buf(dir.path().join("a.wav")).unwrap();
        std::fs::write(src.as_std_path(), b"opus-ish").unwrap();

        let runner = Arc::new(ScriptedRunner {
            calls: AtomicU32::new(0),
            outputs: vec![
                failing_output("slow", true),
                failing_output("exit 1", false),
                failing_output("exit 1", false),
            ],
        });
        let norm = normalizer_with(runner);

        let err = norm.normalize(&src, &dst).await.unwrap_err();
        assert!(matches!(err, AudioError::NormalizeTimeout { .. }));
    }

    #[tokio::test]
    async fn missing_tool_is_reported_when_needed() {
        let dir = TempDir::new().unwrap();
        let src = camino::Utf8PathBuf::from_path_buf(dir.path().join("a.opus")).unwrap();
        let dst = camino::Utf8PathBuf::from_path_buf(dir.path().join("a.wav")).unwrap();
        std::fs::write(src.as_std_path(), b"opus-ish").unwrap();

        let cfg = AudioConfig {
            normalizer_tool_path: "definitely-not-ffmpeg-0x42".to_string(),
            ..AudioConfig::default()
        };
        let runner = Arc::new(ScriptedRunner {
            calls: AtomicU32::new(0),
            outputs: vec![failing_output("unused", false)],
        });
        let norm = Normalizer::new(&cfg, runner);

        let err = norm.normalize(&src, &dst).await.unwrap_err();
        assert!(matches!(err, AudioError::NormalizerNotFound { .. }));
    }
}
