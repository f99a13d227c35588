//! Provider-agnostic ASR client.
//!
//! Backends implement [`AsrBackend`]; the [`AsrClient`] wraps one backend
//! with the retry policy: transient error kinds (`timeout`, `server`,
//! `unknown`) are retried with backoff, terminal kinds (`auth`, `quota`,
//! `client`) fail fast. Provider selection is a tagged match at
//! construction; an unknown provider name is a configuration error raised
//! before any audio work.

mod openai_backend;
mod stub_backend;
mod types;
mod whisper_cli;

pub use stub_backend::StubBackend;
pub use types::{
    AsrBackend, AsrError, AsrErrorKind, ChunkCallStatus, ChunkRequest, ChunkTranscript,
    status_reason_for,
};

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use chatpipe_config::Config;

use openai_backend::OpenAiBackend;
use whisper_cli::WhisperCliBackend;

/// Initial backoff between retry attempts; doubles per attempt.
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Per-chunk transcription client with retry policy.
#[derive(Clone)]
pub struct AsrClient {
    backend: Arc<dyn AsrBackend>,
    max_retries: u32,
}

impl std::fmt::Debug for AsrClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsrClient")
            .field("backend", &self.backend.provider())
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl AsrClient {
    /// Wrap an already-constructed backend (used by tests and dry runs).
    #[must_use]
    pub fn with_backend(backend: Arc<dyn AsrBackend>, max_retries: u32) -> Self {
        Self {
            backend,
            max_retries,
        }
    }

    /// Construct the configured provider backend.
    ///
    /// # Errors
    ///
    /// Returns [`AsrError::Unsupported`] for unknown provider names and
    /// [`AsrError::Misconfiguration`] when a provider's requirements (e.g.
    /// an environment credential) are not met. Both surface before any
    /// audio processing begins.
    pub fn from_config(config: &Config) -> Result<Self, AsrError> {
        let backend: Arc<dyn AsrBackend> = match config.asr.provider.as_str() {
            "openai" => Arc::new(OpenAiBackend::new_from_config(config)?),
            "whisper-cli" => Arc::new(WhisperCliBackend::new_from_config(config)?),
            "stub" => Arc::new(StubBackend::new_from_config(config)),
            unknown => {
                return Err(AsrError::Unsupported(format!(
                    "Unknown ASR provider '{unknown}'. Supported providers: openai, whisper-cli, stub."
                )));
            }
        };
        Ok(Self {
            backend,
            max_retries: config.asr.max_retries,
        })
    }

    /// The wrapped provider's identifier.
    #[must_use]
    pub fn provider(&self) -> &'static str {
        self.backend.provider()
    }

    /// Transcribe one chunk, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the last classified error once retries are exhausted, or
    /// immediately for terminal kinds.
    pub async fn transcribe_chunk(
        &self,
        req: &ChunkRequest,
    ) -> Result<ChunkTranscript, AsrError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            debug!(
                provider = self.backend.provider(),
                chunk_index = req.chunk_index,
                attempt,
                "Transcribing chunk"
            );
            match self.backend.transcribe_chunk(req).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    let kind = err.kind();
                    if !kind.is_transient() || attempt > self.max_retries {
                        return Err(err);
                    }
                    let backoff = INITIAL_BACKOFF * attempt;
                    warn!(
                        provider = self.backend.provider(),
                        chunk_index = req.chunk_index,
                        attempt,
                        kind = kind.as_str(),
                        error = %err,
                        "Transient ASR failure, will retry"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use camino::Utf8PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn req() -> ChunkRequest {
        ChunkRequest {
            wav_path: Utf8PathBuf::from("/tmp/chunk_0000.wav"),
            chunk_index: 0,
            start_sec: 0.0,
            end_sec: 5.0,
            language_hint: "auto".to_string(),
            model: "test".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    struct FlakyBackend {
        calls: AtomicU32,
        fail_first: u32,
        error_kind: AsrErrorKind,
    }

    #[async_trait]
    impl AsrBackend for FlakyBackend {
        fn provider(&self) -> &'static str {
            "flaky"
        }

        async fn transcribe_chunk(&self, req: &ChunkRequest) -> Result<ChunkTranscript, AsrError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(match self.error_kind {
                    AsrErrorKind::Server => AsrError::Server("503".to_string()),
                    AsrErrorKind::Auth => AsrError::Auth("401".to_string()),
                    _ => AsrError::Unknown("boom".to_string()),
                });
            }
            Ok(ChunkTranscript {
                status: ChunkCallStatus::Ok,
                text: "hello".to_string(),
                language: None,
                start_sec: req.start_sec,
                end_sec: req.end_sec,
                duration_sec: req.duration_sec(),
                error: None,
                provider: "flaky",
                model: req.model.clone(),
                raw: None,
            })
        }
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let backend = Arc::new(FlakyBackend {
            calls: AtomicU32::new(0),
            fail_first: 2,
            error_kind: AsrErrorKind::Server,
        });
        let client = AsrClient::with_backend(Arc::clone(&backend) as Arc<dyn AsrBackend>, 2);

        let result = client.transcribe_chunk(&req()).await.unwrap();
        assert_eq!(result.text, "hello");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_errors_fail_fast() {
        let backend = Arc::new(FlakyBackend {
            calls: AtomicU32::new(0),
            fail_first: 10,
            error_kind: AsrErrorKind::Auth,
        });
        let client = AsrClient::with_backend(Arc::clone(&backend) as Arc<dyn AsrBackend>, 5);

        let err = client.transcribe_chunk(&req()).await.unwrap_err();
        assert_eq!(err.kind(), AsrErrorKind::Auth);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let backend = Arc::new(FlakyBackend {
            calls: AtomicU32::new(0),
            fail_first: 10,
            error_kind: AsrErrorKind::Server,
        });
        let client = AsrClient::with_backend(Arc::clone(&backend) as Arc<dyn AsrBackend>, 2);

        let err = client.transcribe_chunk(&req()).await.unwrap_err();
        assert_eq!(err.kind(), AsrErrorKind::Server);
        // 1 initial + 2 retries.
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn unknown_provider_is_a_config_error() {
        let mut config = Config::default();
        config.asr.provider = "telepathy".to_string();
        let err = AsrClient::from_config(&config).unwrap_err();
        assert!(matches!(err, AsrError::Unsupported(_)));
        assert!(err.to_string().contains("telepathy"));
    }

    #[test]
    fn openai_without_credential_fails_fast() {
        let mut config = Config::default();
        config.asr.provider = "openai".to_string();
        config.asr.credential = None;
        let err = AsrClient::from_config(&config).unwrap_err();
        assert!(matches!(err, AsrError::Misconfiguration(_)));
    }

    #[test]
    fn stub_provider_constructs_without_credentials() {
        let mut config = Config::default();
        config.asr.provider = "stub".to_string();
        let client = AsrClient::from_config(&config).unwrap();
        assert_eq!(client.provider(), "stub");
    }
}
