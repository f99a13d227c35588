//! Local whisper-style CLI backend.
//!
//! Drives a whisper.cpp-compatible executable through the process runner:
//! one invocation per chunk, transcript read from stdout. No credential is
//! needed; the executable path comes from `asr.whisper_cli_path` and is
//! resolved on PATH when given as a bare name.

use async_trait::async_trait;
use camino::Utf8PathBuf;
use tracing::debug;

use chatpipe_config::Config;
use chatpipe_runner::{CommandSpec, ProcessRunner, TokioRunner};

use crate::types::{AsrBackend, AsrError, ChunkCallStatus, ChunkRequest, ChunkTranscript};

#[derive(Debug)]
pub(crate) struct WhisperCliBackend {
    executable: Utf8PathBuf,
    runner: TokioRunner,
}

impl WhisperCliBackend {
    /// Build the backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Misconfiguration` when no executable is configured or it
    /// cannot be found.
    pub fn new_from_config(config: &Config) -> Result<Self, AsrError> {
        let configured = config.asr.whisper_cli_path.as_deref().ok_or_else(|| {
            AsrError::Misconfiguration(
                "whisper-cli provider requires [asr] whisper_cli_path to be set".to_string(),
            )
        })?;

        let resolved = which::which(configured).map_err(|e| {
            AsrError::Misconfiguration(format!(
                "whisper-cli executable '{configured}' not found: {e}"
            ))
        })?;
        let executable = Utf8PathBuf::from_path_buf(resolved).map_err(|p| {
            AsrError::Misconfiguration(format!(
                "whisper-cli executable path is not UTF-8: {}",
                p.display()
            ))
        })?;

        Ok(Self {
            executable,
            runner: TokioRunner,
        })
    }
}

#[async_trait]
impl AsrBackend for WhisperCliBackend {
    fn provider(&self) -> &'static str {
        "whisper-cli"
    }

    async fn transcribe_chunk(&self, req: &ChunkRequest) -> Result<ChunkTranscript, AsrError> {
        let mut cmd = CommandSpec::new(self.executable.as_str())
            .arg("-f")
            .arg(req.wav_path.as_str())
            .arg("--no-timestamps");
        if req.language_hint != "auto" {
            cmd = cmd.arg("--language").arg(&req.language_hint);
        }

        debug!(
            provider = "whisper-cli",
            chunk_index = req.chunk_index,
            "Invoking whisper CLI"
        );

        let output = self
            .runner
            .run(&cmd, req.timeout)
            .await
            .map_err(|e| AsrError::Client(e.to_string()))?;

        if output.timed_out {
            return Err(AsrError::Timeout {
                duration: req.timeout,
            });
        }
        if !output.success() {
            let stderr = output.stderr_string();
            let mut start = stderr.len().saturating_sub(512);
            while !stderr.is_char_boundary(start) {
                start += 1;
            }
            return Err(AsrError::Unknown(format!(
                "whisper-cli exited with {:?}: {}",
                output.exit_code,
                &stderr[start..]
            )));
        }

        let text = output.stdout_string().trim().to_string();
        Ok(ChunkTranscript {
            status: ChunkCallStatus::Ok,
            text,
            language: (req.language_hint != "auto").then(|| req.language_hint.clone()),
            start_sec: req.start_sec,
            end_sec: req.end_sec,
            duration_sec: req.duration_sec(),
            error: None,
            provider: "whisper-cli",
            model: req.model.clone(),
            raw: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_configuration_fails_fast() {
        let mut config = Config::default();
        config.asr.provider = "whisper-cli".to_string();
        config.asr.whisper_cli_path = None;
        let err = WhisperCliBackend::new_from_config(&config).unwrap_err();
        assert!(matches!(err, AsrError::Misconfiguration(_)));
    }

    #[test]
    fn unresolvable_executable_fails_fast() {
        let mut config = Config::default();
        config.asr.whisper_cli_path = Some("definitely-not-whisper-0x42".to_string());
        let err = WhisperCliBackend::new_from_config(&config).unwrap_err();
        assert!(err.to_string().contains("definitely-not-whisper-0x42"));
    }
}
