//! Logging infrastructure: tracing setup plus per-step log files.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// The filter defaults to `chatpipe=info,warn` and can be overridden via
/// `RUST_LOG`; `verbose` raises the default to debug with targets shown.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("chatpipe=debug,info")
            } else {
                EnvFilter::try_new("chatpipe=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(verbose)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .try_init()?;

    Ok(())
}

/// Append-only log file for a single pipeline step (`logs/<step>.log`).
///
/// Each line is written whole under an internal mutex, so concurrent
/// writers never interleave partial lines.
#[derive(Debug)]
pub struct StepLog {
    file: Mutex<File>,
}

impl StepLog {
    /// Open (creating or appending to) the log file for a step.
    ///
    /// # Errors
    ///
    /// Returns an error if the logs directory or file cannot be created.
    pub fn open(logs_dir: &Utf8Path, step: &str) -> Result<Self> {
        crate::paths::ensure_dir_all(logs_dir)?;
        let path = logs_dir.join(format!("{step}.log"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_std_path())
            .with_context(|| format!("Failed to open step log: {path}"))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Append one line. Trailing newline is added; embedded newlines are
    /// preserved as-is.
    pub fn line(&self, msg: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{msg}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[test]
    fn step_log_appends_lines() {
        let dir = TempDir::new().unwrap();
        let logs = Utf8PathBuf::from_path_buf(dir.path().join("logs")).unwrap();

        let log = StepLog::open(&logs, "M1_parse").unwrap();
        log.line("started");
        log.line("finished");

        let content = std::fs::read_to_string(logs.join("M1_parse.log").as_std_path()).unwrap();
        assert_eq!(content, "started\nfinished\n");
    }
}
