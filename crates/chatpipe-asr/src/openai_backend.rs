//! OpenAI-compatible HTTP transcription backend.
//!
//! Posts the chunk wav as multipart form data to an
//! `audio/transcriptions` endpoint. The credential is taken from the
//! frozen configuration record; a missing credential is a construction
//! failure, raised before any audio processing begins.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use chatpipe_config::Config;

use crate::types::{AsrBackend, AsrError, ChunkCallStatus, ChunkRequest, ChunkTranscript};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub(crate) struct OpenAiBackend {
    client: Client,
    base_url: String,
    api_key: String,
    default_model: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

impl OpenAiBackend {
    /// Build the backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Misconfiguration` when the credential is absent or the
    /// HTTP client cannot be constructed.
    pub fn new_from_config(config: &Config) -> Result<Self, AsrError> {
        let api_key = config.asr.credential.clone().ok_or_else(|| {
            AsrError::Misconfiguration(format!(
                "ASR credential not found in environment variable '{}'. \
                 Set this variable or configure a different credential_env_var in [asr].",
                config.credential_env_name()
            ))
        })?;

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .use_rustls_tls()
            .build()
            .map_err(|e| AsrError::Misconfiguration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config
                .asr
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            default_model: config.asr.model.clone(),
        })
    }

    fn map_status(status: StatusCode) -> AsrError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                AsrError::Auth(format!("openai authentication failed: {status}"))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                AsrError::Quota(format!("openai rate limit exceeded: {status}"))
            }
            s if s.is_client_error() => AsrError::Client(format!("openai client error: {s}")),
            s if s.is_server_error() => AsrError::Server(format!("openai server error: {s}")),
            s => AsrError::Unknown(format!("openai unexpected status: {s}")),
        }
    }
}

#[async_trait]
impl AsrBackend for OpenAiBackend {
    fn provider(&self) -> &'static str {
        "openai"
    }

    async fn transcribe_chunk(&self, req: &ChunkRequest) -> Result<ChunkTranscript, AsrError> {
        let model = if req.model.is_empty() {
            self.default_model.clone()
        } else {
            req.model.clone()
        };

        debug!(
            provider = "openai",
            model = %model,
            chunk_index = req.chunk_index,
            timeout_secs = req.timeout.as_secs(),
            "Posting chunk for transcription"
        );

        let bytes = tokio::fs::read(req.wav_path.as_std_path())
            .await
            .map_err(|e| AsrError::Client(format!("Failed to read chunk wav: {e}")))?;

        let file_name = req
            .wav_path
            .file_name()
            .unwrap_or("chunk.wav")
            .to_string();
        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes)
                    .file_name(file_name)
                    .mime_str("audio/wav")
                    .map_err(|e| AsrError::Unknown(e.to_string()))?,
            )
            .text("model", model.clone())
            .text("response_format", "json");
        if req.language_hint != "auto" {
            form = form.text("language", req.language_hint.clone());
        }

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .timeout(req.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AsrError::Timeout {
                        duration: req.timeout,
                    }
                } else {
                    AsrError::Unknown(format!("openai request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::map_status(status));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AsrError::Server(format!("Failed to parse openai response: {e}")))?;
        let parsed: TranscriptionResponse = serde_json::from_value(raw.clone())
            .map_err(|e| AsrError::Server(format!("openai response missing text: {e}")))?;

        Ok(ChunkTranscript {
            status: ChunkCallStatus::Ok,
            text: parsed.text,
            language: parsed.language,
            start_sec: req.start_sec,
            end_sec: req.end_sec,
            duration_sec: req.duration_sec(),
            error: None,
            provider: "openai",
            model,
            raw: Some(raw),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_covers_the_taxonomy() {
        assert!(matches!(
            OpenAiBackend::map_status(StatusCode::UNAUTHORIZED),
            AsrError::Auth(_)
        ));
        assert!(matches!(
            OpenAiBackend::map_status(StatusCode::TOO_MANY_REQUESTS),
            AsrError::Quota(_)
        ));
        assert!(matches!(
            OpenAiBackend::map_status(StatusCode::BAD_REQUEST),
            AsrError::Client(_)
        ));
        assert!(matches!(
            OpenAiBackend::map_status(StatusCode::BAD_GATEWAY),
            AsrError::Server(_)
        ));
    }

    #[test]
    fn missing_credential_error_names_the_env_var() {
        let mut config = Config::default();
        config.asr.credential = None;
        config.asr.credential_env_var = Some("MY_ASR_KEY".to_string());
        let err = OpenAiBackend::new_from_config(&config).unwrap_err();
        assert!(err.to_string().contains("MY_ASR_KEY"));
    }
}
