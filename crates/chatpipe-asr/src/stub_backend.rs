//! Deterministic in-process backend for tests and dry runs.
//!
//! Yields `chunk-<index>` per chunk. Failures can be scripted through the
//! `asr.stub_fail_chunks` (terminal client errors) and
//! `asr.stub_timeout_chunks` (timeouts) configuration lists.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use chatpipe_config::Config;

use crate::types::{AsrBackend, AsrError, ChunkCallStatus, ChunkRequest, ChunkTranscript};

/// Scripted deterministic backend.
#[derive(Debug, Default)]
pub struct StubBackend {
    fail_chunks: BTreeSet<usize>,
    timeout_chunks: BTreeSet<usize>,
    calls: AtomicUsize,
}

impl StubBackend {
    #[must_use]
    pub fn new_from_config(config: &Config) -> Self {
        Self {
            fail_chunks: config.asr.stub_fail_chunks.iter().copied().collect(),
            timeout_chunks: config.asr.stub_timeout_chunks.iter().copied().collect(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Script specific chunk indices to fail terminally.
    #[must_use]
    pub fn with_failures(mut self, indices: &[usize]) -> Self {
        self.fail_chunks = indices.iter().copied().collect();
        self
    }

    /// Script specific chunk indices to time out.
    #[must_use]
    pub fn with_timeouts(mut self, indices: &[usize]) -> Self {
        self.timeout_chunks = indices.iter().copied().collect();
        self
    }

    /// Number of transcription calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AsrBackend for StubBackend {
    fn provider(&self) -> &'static str {
        "stub"
    }

    async fn transcribe_chunk(&self, req: &ChunkRequest) -> Result<ChunkTranscript, AsrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.timeout_chunks.contains(&req.chunk_index) {
            return Err(AsrError::Timeout {
                duration: req.timeout,
            });
        }
        if self.fail_chunks.contains(&req.chunk_index) {
            return Err(AsrError::Client(format!(
                "scripted failure for chunk {}",
                req.chunk_index
            )));
        }

        Ok(ChunkTranscript {
            status: ChunkCallStatus::Ok,
            text: format!("chunk-{}", req.chunk_index),
            language: None,
            start_sec: req.start_sec,
            end_sec: req.end_sec,
            duration_sec: req.duration_sec(),
            error: None,
            provider: "stub",
            model: req.model.clone(),
            raw: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::time::Duration;

    fn req(index: usize) -> ChunkRequest {
        ChunkRequest {
            wav_path: Utf8PathBuf::from("/tmp/chunk.wav"),
            chunk_index: index,
            start_sec: 0.0,
            end_sec: 2.0,
            language_hint: "auto".to_string(),
            model: "stub-model".to_string(),
            timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn emits_deterministic_chunk_text() {
        let stub = StubBackend::default();
        let out = stub.transcribe_chunk(&req(3)).await.unwrap();
        assert_eq!(out.text, "chunk-3");
        assert_eq!(out.status, ChunkCallStatus::Ok);
        assert_eq!(stub.call_count(), 1);
    }

    #[tokio::test]
    async fn scripted_failures_and_timeouts() {
        let stub = StubBackend::default()
            .with_failures(&[1])
            .with_timeouts(&[2]);

        assert!(stub.transcribe_chunk(&req(0)).await.is_ok());
        assert!(matches!(
            stub.transcribe_chunk(&req(1)).await,
            Err(AsrError::Client(_))
        ));
        assert!(matches!(
            stub.transcribe_chunk(&req(2)).await,
            Err(AsrError::Timeout { .. })
        ));
    }
}
