use camino::Utf8PathBuf;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::schema;

/// Message kind.
///
/// Parsed once by stage M1 and never rewritten. `Unknown` covers records
/// that visibly reference media without a classifiable filename (e.g. a
/// bare `<Media omitted>` marker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Text,
    Voice,
    Image,
    Video,
    Document,
    Sticker,
    System,
    Unknown,
}

impl Kind {
    /// Canonical lowercase name used in stage files and the exceptions log.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
            Self::Image => "image",
            Self::Video => "video",
            Self::Document => "document",
            Self::Sticker => "sticker",
            Self::System => "system",
            Self::Unknown => "unknown",
        }
    }

    /// Whether records of this kind participate in media resolution.
    #[must_use]
    pub const fn expects_media(&self) -> bool {
        !matches!(self, Self::Text | Self::System)
    }
}

/// Terminal record status after a stage has processed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Partial,
    Failed,
    Skipped,
}

/// Closed set of machine-readable status qualifiers.
///
/// `VadNoSpeech` is reserved: accepted on read, never emitted by the audio
/// stage in this version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusReason {
    MergedIntoPreviousMedia,
    UnresolvedMedia,
    AmbiguousMedia,
    FfmpegFailed,
    TimeoutFfmpeg,
    VadNoSpeech,
    AsrFailed,
    TimeoutAsr,
    AsrPartial,
    AudioUnsupportedFormat,
}

impl StatusReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MergedIntoPreviousMedia => "merged_into_previous_media",
            Self::UnresolvedMedia => "unresolved_media",
            Self::AmbiguousMedia => "ambiguous_media",
            Self::FfmpegFailed => "ffmpeg_failed",
            Self::TimeoutFfmpeg => "timeout_ffmpeg",
            Self::VadNoSpeech => "vad_no_speech",
            Self::AsrFailed => "asr_failed",
            Self::TimeoutAsr => "timeout_asr",
            Self::AsrPartial => "asr_partial",
            Self::AudioUnsupportedFormat => "audio_unsupported_format",
        }
    }
}

/// Per-chunk recognition outcome inside `derived.asr.chunks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Ok,
    Error,
}

/// One recognized (or failed) audio chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsrChunk {
    pub chunk_index: usize,
    pub start_sec: f64,
    pub end_sec: f64,
    pub duration_sec: f64,
    pub status: ChunkStatus,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Run-dir-relative path of the chunk wav artifact.
    pub wav_chunk_path: String,
}

/// Observational voice-activity stats. Never gates recognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VadStats {
    pub speech_ratio: f64,
    pub speech_seconds: f64,
    pub total_seconds: f64,
    pub segments: usize,
    pub is_mostly_silence: bool,
}

/// Aggregated chunk failure bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub chunks_ok: usize,
    pub chunks_error: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_message: Option<String>,
}

/// Full ASR payload attached by the audio stage under `derived.asr`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsrDerived {
    pub pipeline_version: String,
    pub provider: String,
    pub model: String,
    pub language_hint: String,
    pub total_duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunks: Vec<AsrChunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vad: Option<VadStats>,
    pub error_summary: ErrorSummary,
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffmpeg_log_tail: Option<String>,
}

/// One scored candidate recorded when resolution was ambiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisambiguationCandidate {
    pub path: String,
    pub score: f64,
}

/// Resolver ambiguity evidence under `derived.disambiguation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disambiguation {
    pub candidates: Vec<DisambiguationCandidate>,
    pub top_score: f64,
    pub tie_margin: f64,
}

/// Stage-produced metadata with a schema'd shape.
///
/// Unknown keys in input JSON are skipped on read; the serialized shape is
/// stable. Every subfield is optional so stages only pay for what they
/// attach.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Derived {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asr: Option<AsrDerived>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disambiguation: Option<Disambiguation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_sha256: Option<String>,
}

impl Derived {
    /// True when no stage has attached anything yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.asr.is_none() && self.disambiguation.is_none() && self.media_sha256.is_none()
    }
}

pub(crate) mod ts_format {
    //! Canonical `YYYY-MM-DDTHH:MM:SS` timestamp form, no zone suffix.

    use chrono::NaiveDateTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
    }
}

/// The canonical message record.
///
/// Created by the parser stage; later stages mutate only the field sets
/// they own (resolver: `media_filename`, media status; transcriber: voice
/// `content_text`, `derived.asr`, voice status). Stage outputs are
/// immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "schema::current_version")]
    pub schema_version: String,
    pub idx: u64,
    #[serde(with = "ts_format")]
    pub ts: NaiveDateTime,
    pub sender: String,
    pub kind: Kind,
    pub content_text: String,
    pub raw_line: String,
    pub raw_block: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_filename: Option<Utf8PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Derived::is_empty")]
    pub derived: Derived,
    pub status: Status,
    pub partial: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<StatusReason>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl Message {
    /// Construct a fresh `status=ok` record as the parser emits it.
    #[must_use]
    pub fn new(idx: u64, ts: NaiveDateTime, sender: impl Into<String>, kind: Kind) -> Self {
        Self {
            schema_version: schema::current_version(),
            idx,
            ts,
            sender: sender.into(),
            kind,
            content_text: String::new(),
            raw_line: String::new(),
            raw_block: String::new(),
            media_hint: None,
            media_filename: None,
            caption: None,
            derived: Derived::default(),
            status: Status::Ok,
            partial: false,
            status_reason: None,
            errors: Vec::new(),
        }
    }

    /// The `partial` flag must mirror `status == partial` at all times.
    #[must_use]
    pub fn partial_flag_consistent(&self) -> bool {
        self.partial == (self.status == Status::Partial)
    }

    /// Push a short error string onto the record's error trail.
    pub fn push_error(&mut self, err: impl Into<String>) {
        self.errors.push(err.into());
    }
}
