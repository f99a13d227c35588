use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Feature weights for the media scoring ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub hint: f64,
    pub ext: f64,
    pub seq: f64,
    pub mtime: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            hint: 3.0,
            ext: 2.0,
            seq: 1.0,
            mtime: 1.0,
        }
    }
}

/// Media resolver knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub weights: Weights,
    /// Decisive margin: minimum gap between top and runner-up totals
    /// required to accept the top candidate.
    pub tau: f64,
    /// Window used to group near-equal candidates into an ambiguity.
    /// Defaults to `tau` when unset.
    pub tie_margin: Option<f64>,
    /// Acceptance threshold: totals below this never resolve.
    pub min_score: f64,
    /// Candidates within this many hours of the message time join the
    /// candidate set even when they fall on a neighboring chat day.
    pub clock_drift_hours: i64,
    pub allowed_extensions: Vec<String>,
    /// Artifact-kind priority order, highest first.
    pub ext_priority: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            tau: 0.75,
            tie_margin: None,
            min_score: 1.0,
            clock_drift_hours: 4,
            allowed_extensions: [
                "jpg", "jpeg", "png", "webp", "mp4", "mov", "3gp", "opus", "ogg", "m4a", "mp3",
                "aac", "amr", "wav", "pdf", "doc", "docx", "txt", "vcf",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            ext_priority: ["voice", "image", "video", "document", "other"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl ResolverConfig {
    /// Tie margin with the documented fallback to `tau`.
    #[must_use]
    pub fn effective_tie_margin(&self) -> f64 {
        self.tie_margin.unwrap_or(self.tau)
    }
}

/// Audio normalization, VAD, chunking, and cache knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Normalizer executable; bare names are resolved on PATH.
    pub normalizer_tool_path: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_seconds: f64,
    pub chunk_overlap_seconds: f64,
    pub normalize_timeout_secs: u64,
    pub normalize_max_retries: u32,
    pub vad_min_speech_ratio: f64,
    pub vad_min_speech_seconds: f64,
    /// Cache root; defaults to the platform cache directory.
    pub cache_dir: Option<Utf8PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            normalizer_tool_path: "ffmpeg".to_string(),
            sample_rate: 16_000,
            channels: 1,
            chunk_seconds: 120.0,
            chunk_overlap_seconds: 0.25,
            normalize_timeout_secs: 120,
            normalize_max_retries: 2,
            vad_min_speech_ratio: 0.05,
            vad_min_speech_seconds: 0.3,
            cache_dir: None,
        }
    }
}

impl AudioConfig {
    /// Cache root with the platform fallback applied.
    #[must_use]
    pub fn effective_cache_dir(&self) -> Utf8PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Utf8PathBuf::from_path_buf(base.join("chatpipe"))
            .unwrap_or_else(|_| Utf8PathBuf::from("chatpipe-cache"))
    }
}

/// ASR provider selection and per-chunk call policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsrConfig {
    /// One of `openai`, `whisper-cli`, `stub`.
    pub provider: String,
    pub model: String,
    /// BCP-47-like tag, or `auto` for provider-side detection.
    pub language_hint: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub billing_plan: String,
    /// Environment variable holding the provider credential.
    pub credential_env_var: Option<String>,
    /// Override endpoint for the `openai` provider.
    pub base_url: Option<String>,
    /// Executable for the `whisper-cli` provider.
    pub whisper_cli_path: Option<String>,
    /// Stub provider scripting: chunk indices that fail terminally.
    pub stub_fail_chunks: Vec<usize>,
    /// Stub provider scripting: chunk indices that time out.
    pub stub_timeout_chunks: Vec<usize>,
    /// Credential value frozen from the environment at startup. Never
    /// serialized.
    #[serde(skip)]
    pub credential: Option<String>,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "whisper-1".to_string(),
            language_hint: "auto".to_string(),
            timeout_secs: 60,
            max_retries: 2,
            billing_plan: "standard".to_string(),
            credential_env_var: None,
            base_url: None,
            whisper_cli_path: None,
            stub_fail_chunks: Vec::new(),
            stub_timeout_chunks: Vec::new(),
            credential: None,
        }
    }
}

/// Orchestrator knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Stable run identifier; derived from the chat filename when unset.
    pub run_id: Option<String>,
    pub run_dir: Option<Utf8PathBuf>,
    pub max_workers_audio: usize,
    pub overwrite: bool,
    pub resume: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_id: None,
            run_dir: None,
            max_workers_audio: 4,
            overwrite: false,
            resume: true,
        }
    }
}

/// Logging knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Complete pipeline configuration.
///
/// Passed explicitly from the orchestrator to every component; there are
/// no process-wide singletons.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub resolver: ResolverConfig,
    pub audio: AudioConfig,
    pub asr: AsrConfig,
    pub run: RunConfig,
    pub log: LogConfig,
}

impl Config {
    /// Parse a TOML document over the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns a parse error for malformed TOML or out-of-shape values.
    pub fn from_toml_str(content: &str) -> Result<Self, crate::ConfigError> {
        toml::from_str(content).map_err(|e| crate::ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    /// Read the provider credential (if any is named) from the process
    /// environment, once. Call at startup before components are built.
    pub fn freeze_env(&mut self) {
        if let Some(var) = &self.asr.credential_env_var {
            self.asr.credential = std::env::var(var).ok();
        } else if self.asr.provider == "openai" {
            self.asr.credential = std::env::var("OPENAI_API_KEY").ok();
        }
    }

    /// Name of the env var an `openai` run reads its credential from.
    #[must_use]
    pub fn credential_env_name(&self) -> &str {
        self.asr
            .credential_env_var
            .as_deref()
            .unwrap_or("OPENAI_API_KEY")
    }
}
