//! Configuration validation, applied once after discovery and CLI
//! overrides are merged.

use thiserror::Error;

use crate::model::Config;

/// Configuration failures. All are surfaced before any pipeline work
/// begins.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },

    #[error("Failed to read configuration file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Invalid configuration: {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl Config {
    /// Validate cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audio.chunk_seconds <= 0.0 {
            return Err(invalid("audio.chunk_seconds", "must be positive"));
        }
        if self.audio.chunk_overlap_seconds < 0.0 {
            return Err(invalid("audio.chunk_overlap_seconds", "must be non-negative"));
        }
        if self.audio.chunk_overlap_seconds >= self.audio.chunk_seconds {
            return Err(invalid(
                "audio.chunk_overlap_seconds",
                "overlap must be strictly less than the chunk window",
            ));
        }
        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be positive"));
        }
        if self.audio.channels == 0 {
            return Err(invalid("audio.channels", "must be positive"));
        }

        let w = &self.resolver.weights;
        for (name, value) in [
            ("resolver.weights.hint", w.hint),
            ("resolver.weights.ext", w.ext),
            ("resolver.weights.seq", w.seq),
            ("resolver.weights.mtime", w.mtime),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(name, "must be a non-negative finite number"));
            }
        }
        if !self.resolver.tau.is_finite() || self.resolver.tau < 0.0 {
            return Err(invalid("resolver.tau", "must be a non-negative finite number"));
        }
        if self.resolver.clock_drift_hours < 0 {
            return Err(invalid("resolver.clock_drift_hours", "must be non-negative"));
        }

        if self.run.max_workers_audio == 0 || self.run.max_workers_audio > 64 {
            return Err(invalid("run.max_workers_audio", "must be between 1 and 64"));
        }

        match self.asr.provider.as_str() {
            "openai" | "whisper-cli" | "stub" => {}
            other => {
                return Err(invalid(
                    "asr.provider",
                    &format!("unknown provider '{other}'; supported: openai, whisper-cli, stub"),
                ));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn overlap_must_be_less_than_window() {
        let mut cfg = Config::default();
        cfg.audio.chunk_seconds = 10.0;
        cfg.audio.chunk_overlap_seconds = 10.0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("chunk_overlap_seconds"));

        cfg.audio.chunk_overlap_seconds = 9.999;
        cfg.validate().unwrap();
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let mut cfg = Config::default();
        cfg.asr.provider = "telepathy".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("telepathy"));
    }

    #[test]
    fn worker_bounds_are_enforced() {
        let mut cfg = Config::default();
        cfg.run.max_workers_audio = 0;
        assert!(cfg.validate().is_err());
        cfg.run.max_workers_audio = 65;
        assert!(cfg.validate().is_err());
        cfg.run.max_workers_audio = 8;
        cfg.validate().unwrap();
    }
}
