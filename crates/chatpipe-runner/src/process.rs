use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::command_spec::CommandSpec;
use crate::error::RunnerError;

/// Output from a process execution.
///
/// A timed-out process yields `timed_out = true` with whatever stderr was
/// captured before the kill; timeout is an outcome, not an error, so
/// callers can classify it alongside non-zero exits.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit code; `None` when terminated by signal or timeout kill.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ProcessOutput {
    /// Lossy UTF-8 view of stdout.
    #[must_use]
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Lossy UTF-8 view of stderr.
    #[must_use]
    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Exit code 0 and no timeout.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// Trait for process execution with a wall-clock timeout.
///
/// Implementations MUST use argv-style APIs only: no `sh -c`, no
/// concatenated shell strings.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Execute `cmd`, waiting at most `timeout` for completion.
    ///
    /// # Errors
    ///
    /// Returns an error only for spawn/collection failures; timeouts and
    /// non-zero exits are reported through [`ProcessOutput`].
    async fn run(&self, cmd: &CommandSpec, timeout: Duration)
    -> Result<ProcessOutput, RunnerError>;
}

/// Production runner backed by `tokio::process`.
///
/// On timeout the child is killed and reaped before returning.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioRunner;

#[async_trait]
impl ProcessRunner for TokioRunner {
    async fn run(
        &self,
        cmd: &CommandSpec,
        timeout: Duration,
    ) -> Result<ProcessOutput, RunnerError> {
        debug!(command = %cmd.display(), timeout_secs = timeout.as_secs(), "Spawning process");

        let mut child = cmd
            .to_tokio_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RunnerError::SpawnFailed {
                program: cmd.program.to_string_lossy().to_string(),
                reason: e.to_string(),
            })?;

        // Drain pipes concurrently with the wait so a chatty child never
        // deadlocks on a full pipe buffer.
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let drain = tokio::spawn(async move {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut stdout).await;
            }
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut stderr).await;
            }
            (stdout, stderr)
        });

        let (timed_out, exit_code) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => (false, status.code()),
            Ok(Err(e)) => {
                return Err(RunnerError::OutputFailed {
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                let _ = child.kill().await;
                (true, None)
            }
        };

        let (stdout, stderr) = drain.await.map_err(|e| RunnerError::OutputFailed {
            reason: e.to_string(),
        })?;

        Ok(ProcessOutput {
            stdout,
            stderr,
            exit_code,
            timed_out,
        })
    }
}
