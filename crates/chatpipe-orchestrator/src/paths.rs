use camino::{Utf8Path, Utf8PathBuf};

use chatpipe_manifest::StepId;

/// Fixed layout of a run directory.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub run_dir: Utf8PathBuf,
    pub m1: Utf8PathBuf,
    pub m2: Utf8PathBuf,
    pub m3: Utf8PathBuf,
    pub transcript: Utf8PathBuf,
    pub preview: Utf8PathBuf,
    pub exceptions: Utf8PathBuf,
    pub manifest: Utf8PathBuf,
    pub metrics: Utf8PathBuf,
    pub logs_dir: Utf8PathBuf,
    pub lock: Utf8PathBuf,
}

impl RunPaths {
    #[must_use]
    pub fn new(run_dir: &Utf8Path) -> Self {
        Self {
            run_dir: run_dir.to_owned(),
            m1: run_dir.join("messages.M1.jsonl"),
            m2: run_dir.join("messages.M2.jsonl"),
            m3: run_dir.join("messages.M3.jsonl"),
            transcript: run_dir.join("chat_with_audio.txt"),
            preview: run_dir.join("preview_transcripts.txt"),
            exceptions: run_dir.join("exceptions.csv"),
            manifest: run_dir.join("run_manifest.json"),
            metrics: run_dir.join("metrics.json"),
            logs_dir: run_dir.join("logs"),
            lock: run_dir.join("run.lock"),
        }
    }

    /// Primary output file of a step, used by the resume skip check.
    #[must_use]
    pub fn step_output(&self, step: StepId) -> &Utf8Path {
        match step {
            StepId::M1Parse => &self.m1,
            StepId::M2Media => &self.m2,
            StepId::M3Audio => &self.m3,
            StepId::M5Render => &self.transcript,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_contract() {
        let paths = RunPaths::new(Utf8Path::new("/runs/r1"));
        assert_eq!(paths.m1.as_str(), "/runs/r1/messages.M1.jsonl");
        assert_eq!(paths.transcript.as_str(), "/runs/r1/chat_with_audio.txt");
        assert_eq!(paths.manifest.as_str(), "/runs/r1/run_manifest.json");
        assert_eq!(paths.step_output(StepId::M3Audio).as_str(), "/runs/r1/messages.M3.jsonl");
    }
}
