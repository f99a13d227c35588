//! Energy-based voice activity detection.
//!
//! Strictly observational: the stats land in `derived.asr.vad` and never
//! influence status, status reason, or whether recognition runs.

use chatpipe_message::VadStats;
use chatpipe_utils::canonical::round3;

use crate::wav::PcmAudio;

/// Analysis frame length in seconds.
const FRAME_SECONDS: f64 = 0.03;

/// Absolute RMS floor below which a frame is never speech (i16 scale).
const RMS_FLOOR: f64 = 250.0;

/// Fraction of the whole-stream RMS a frame must exceed to count as
/// speech.
const RELATIVE_RMS: f64 = 0.35;

fn frame_rms(frame: &[i16]) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = frame.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum_sq / frame.len() as f64).sqrt()
}

/// Compute speech-activity stats over normalized PCM audio.
///
/// A frame is speech when its RMS exceeds both an absolute floor and a
/// fraction of the stream RMS. `is_mostly_silence` applies the configured
/// thresholds.
#[must_use]
pub fn analyze_vad(audio: &PcmAudio, min_speech_ratio: f64, min_speech_seconds: f64) -> VadStats {
    let total_seconds = audio.duration_seconds();
    if audio.is_empty() {
        return VadStats {
            speech_ratio: 0.0,
            speech_seconds: 0.0,
            total_seconds: 0.0,
            segments: 0,
            is_mostly_silence: true,
        };
    }

    let frame_len =
        ((f64::from(audio.sample_rate) * FRAME_SECONDS) as usize * usize::from(audio.channels))
            .max(1);
    let stream_rms = frame_rms(&audio.samples);
    let threshold = RMS_FLOOR.max(stream_rms * RELATIVE_RMS);

    let mut speech_frames = 0usize;
    let mut total_frames = 0usize;
    let mut segments = 0usize;
    let mut in_segment = false;

    for frame in audio.samples.chunks(frame_len) {
        total_frames += 1;
        let speech = frame_rms(frame) >= threshold;
        if speech {
            speech_frames += 1;
            if !in_segment {
                segments += 1;
                in_segment = true;
            }
        } else {
            in_segment = false;
        }
    }

    let speech_ratio = if total_frames == 0 {
        0.0
    } else {
        speech_frames as f64 / total_frames as f64
    };
    let speech_seconds = total_seconds * speech_ratio;

    VadStats {
        speech_ratio: round3(speech_ratio),
        speech_seconds: round3(speech_seconds),
        total_seconds: round3(total_seconds),
        segments,
        is_mostly_silence: speech_ratio < min_speech_ratio
            || speech_seconds < min_speech_seconds,
    }
}
