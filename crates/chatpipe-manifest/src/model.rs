use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema version shared by the manifest and metrics documents.
pub const MANIFEST_SCHEMA_VERSION: &str = "1.0.0";

/// Pipeline step identifiers, in execution order.
///
/// `M4` is reserved by the historical numbering; the pipeline runs
/// M1 → M2 → M3 → M5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepId {
    M1Parse,
    M2Media,
    M3Audio,
    M5Render,
}

impl StepId {
    /// Canonical step name used in the manifest, file names, and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::M1Parse => "M1_parse",
            Self::M2Media => "M2_media",
            Self::M3Audio => "M3_audio",
            Self::M5Render => "M5_render",
        }
    }

    /// All steps in execution order.
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [Self::M1Parse, Self::M2Media, Self::M3Audio, Self::M5Render]
    }
}

/// Step lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Ok,
    Failed,
    Skipped,
}

/// Progress record for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    pub status: StepStatus,
    pub total: u64,
    pub done: u64,
    pub errors: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl Default for StepState {
    fn default() -> Self {
        Self {
            status: StepStatus::Pending,
            total: 0,
            done: 0,
            errors: 0,
            end_time: None,
        }
    }
}

/// Run-level summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub messages_total: u64,
    pub voice_total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The run manifest, rewritten after every step transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: String,
    pub run_id: String,
    /// Archive root the run was launched against.
    pub root: String,
    pub chat_file: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub steps: BTreeMap<String, StepState>,
    pub summary: Summary,
}

impl RunManifest {
    /// Fresh manifest with every step pending.
    #[must_use]
    pub fn new(run_id: &str, root: &str, chat_file: &str) -> Self {
        let steps = StepId::all()
            .iter()
            .map(|s| (s.as_str().to_string(), StepState::default()))
            .collect();
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
            run_id: run_id.to_string(),
            root: root.to_string(),
            chat_file: chat_file.to_string(),
            start_time: Utc::now(),
            end_time: None,
            current_step: None,
            steps,
            summary: Summary::default(),
        }
    }

    /// Mutable access to a step's state, inserting the default if a prior
    /// manifest version lacked it.
    pub fn step_mut(&mut self, step: StepId) -> &mut StepState {
        self.steps.entry(step.as_str().to_string()).or_default()
    }

    /// Read access to a step's state.
    #[must_use]
    pub fn step(&self, step: StepId) -> Option<&StepState> {
        self.steps.get(step.as_str())
    }

    /// Whether a prior run completed this step successfully.
    #[must_use]
    pub fn is_step_ok(&self, step: StepId) -> bool {
        self.step(step).is_some_and(|s| s.status == StepStatus::Ok)
    }
}

/// The metrics summary, written once at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub schema_version: String,
    pub messages_total: u64,
    pub voice_total: u64,
    pub voice_ok: u64,
    pub voice_partial: u64,
    pub voice_failed: u64,
    pub media_resolved: u64,
    pub media_unresolved: u64,
    pub media_ambiguous: u64,
    pub asr_provider: String,
    pub asr_model: String,
    pub asr_language: String,
    pub audio_seconds_total: f64,
    pub asr_cost_total: f64,
    pub wall_clock_seconds: f64,
}
