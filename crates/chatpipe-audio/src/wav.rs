//! Canonical-PCM wav reading and writing.
//!
//! The normalizer contract fixes the working format at 16 kHz mono
//! 16-bit little-endian PCM; this module only has to handle that shape
//! plus enough validation to reject everything else loudly.

use camino::Utf8Path;
use hound::{SampleFormat, WavSpec};

use crate::error::AudioError;

/// Decoded PCM audio held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl PcmAudio {
    /// Duration in seconds.
    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate) / f64::from(self.channels)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Read a 16-bit PCM wav file.
///
/// # Errors
///
/// Returns [`AudioError::WavParse`] for unreadable or non-16-bit-PCM
/// input.
pub fn read_wav(path: &Utf8Path) -> Result<PcmAudio, AudioError> {
    let mut reader = hound::WavReader::open(path.as_std_path()).map_err(|e| {
        AudioError::WavParse {
            path: path.to_string(),
            reason: e.to_string(),
        }
    })?;
    let spec = reader.spec();
    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(AudioError::WavParse {
            path: path.to_string(),
            reason: format!(
                "expected 16-bit integer PCM, found {:?}/{} bits",
                spec.sample_format, spec.bits_per_sample
            ),
        });
    }
    let samples: Result<Vec<i16>, _> = reader.samples::<i16>().collect();
    let samples = samples.map_err(|e| AudioError::WavParse {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    Ok(PcmAudio {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        samples,
    })
}

/// Write 16-bit PCM samples as a wav file.
///
/// # Errors
///
/// Returns [`AudioError::ChunkWrite`] on any I/O failure.
pub fn write_wav(
    path: &Utf8Path,
    sample_rate: u32,
    channels: u16,
    samples: &[i16],
) -> Result<(), AudioError> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let write = || -> Result<(), hound::Error> {
        let mut writer = hound::WavWriter::create(path.as_std_path(), spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()
    };
    write().map_err(|e| AudioError::ChunkWrite {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// Whether `path` is already in the canonical PCM form (given rate and
/// channel count, 16-bit int). Used by the normalizer to skip the external
/// tool for pre-normalized input.
#[must_use]
pub fn is_canonical_wav(path: &Utf8Path, sample_rate: u32, channels: u16) -> bool {
    hound::WavReader::open(path.as_std_path())
        .map(|reader| {
            let spec = reader.spec();
            spec.sample_rate == sample_rate
                && spec.channels == channels
                && spec.bits_per_sample == 16
                && spec.sample_format == SampleFormat::Int
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn tone(n: usize) -> Vec<i16> {
        (0..n).map(|i| ((i % 100) as i16 - 50) * 100).collect()
    }

    #[test]
    fn wav_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("t.wav")).unwrap();
        let samples = tone(16_000);

        write_wav(&path, 16_000, 1, &samples).unwrap();
        let audio = read_wav(&path).unwrap();

        assert_eq!(audio.sample_rate, 16_000);
        assert_eq!(audio.channels, 1);
        assert_eq!(audio.samples, samples);
        assert!((audio.duration_seconds() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn canonical_detection() {
        let dir = TempDir::new().unwrap();
        let good = Utf8PathBuf::from_path_buf(dir.path().join("good.wav")).unwrap();
        write_wav(&good, 16_000, 1, &tone(100)).unwrap();
        assert!(is_canonical_wav(&good, 16_000, 1));
        assert!(!is_canonical_wav(&good, 44_100, 1));

        let other = Utf8PathBuf::from_path_buf(dir.path().join("other.wav")).unwrap();
        write_wav(&other, 44_100, 2, &tone(100)).unwrap();
        assert!(!is_canonical_wav(&other, 16_000, 1));

        let missing = Utf8PathBuf::from_path_buf(dir.path().join("nope.wav")).unwrap();
        assert!(!is_canonical_wav(&missing, 16_000, 1));
    }

    #[test]
    fn garbage_fails_parse() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("junk.wav")).unwrap();
        std::fs::write(path.as_std_path(), b"not a wav at all").unwrap();
        assert!(matches!(read_wav(&path), Err(AudioError::WavParse { .. })));
    }
}
