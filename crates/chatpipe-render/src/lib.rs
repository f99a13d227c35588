//! Rendered transcript writer: stage M5.
//!
//! Consumes the final stage records and writes the human-readable
//! `chat_with_audio.txt`. Failed audio rows keep their explicit
//! placeholder text; merge-donor records are not rendered. Output is
//! UTF-8 with LF terminators, deterministic for identical inputs.

use anyhow::Result;
use camino::Utf8Path;

use chatpipe_message::{Kind, Message, Status, StatusReason};
use chatpipe_utils::atomic_write::write_text_atomic;

/// Render all records into the transcript text form.
#[must_use]
pub fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for msg in messages {
        if msg.status == Status::Skipped
            && msg.status_reason == Some(StatusReason::MergedIntoPreviousMedia)
        {
            continue;
        }
        render_message(&mut out, msg);
    }
    out
}

/// Render and atomically write the transcript file.
///
/// # Errors
///
/// Returns an error when the file cannot be written.
pub fn write_transcript(path: &Utf8Path, messages: &[Message]) -> Result<()> {
    write_text_atomic(path, &render_transcript(messages))
}

fn render_message(out: &mut String, msg: &Message) {
    let ts = msg.ts.format("%Y-%m-%d %H:%M:%S");

    if msg.kind == Kind::System {
        out.push_str(&format!("[{ts}] -- {}\n", msg.content_text));
        return;
    }

    out.push_str(&format!("[{ts}] {}: ", msg.sender));

    if msg.kind.expects_media() {
        let annotation = match &msg.media_filename {
            Some(path) => format!(
                "[{}: {}]",
                msg.kind.as_str(),
                path.file_name().unwrap_or(path.as_str())
            ),
            None => match msg.status_reason {
                Some(StatusReason::AmbiguousMedia) => {
                    format!("[{}: ambiguous]", msg.kind.as_str())
                }
                _ => format!("[{}: unresolved]", msg.kind.as_str()),
            },
        };
        out.push_str(&annotation);
        if !msg.content_text.is_empty() {
            out.push('\n');
            out.push_str(&msg.content_text);
        }
        if let Some(caption) = &msg.caption {
            out.push('\n');
            out.push_str(caption);
        }
    } else {
        out.push_str(&msg.content_text);
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn msg(idx: u64, kind: Kind, sender: &str, text: &str) -> Message {
        let ts = NaiveDate::from_ymd_opt(2025, 7, 8)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        let mut m = Message::new(idx, ts, sender, kind);
        m.content_text = text.to_string();
        m
    }

    #[test]
    fn text_and_system_rows() {
        let mut sys = msg(0, Kind::System, "", "calls are encrypted");
        sys.sender = String::new();
        let text = msg(1, Kind::Text, "Ada", "hello");

        let out = render_transcript(&[sys, text]);
        assert_eq!(
            out,
            "[2025-07-08 14:30:00] -- calls are encrypted\n[2025-07-08 14:30:00] Ada: hello\n"
        );
    }

    #[test]
    fn voice_rows_carry_annotation_and_transcript() {
        let mut voice = msg(0, Kind::Voice, "Ada", "chunk-0\nchunk-1");
        voice.media_filename = Some("/a/Media/PTT-20250708-WA0028.opus".into());

        let out = render_transcript(&[voice]);
        assert!(out.contains("[voice: PTT-20250708-WA0028.opus]"));
        assert!(out.contains("chunk-0\nchunk-1\n"));
    }

    #[test]
    fn failed_voice_rows_keep_placeholder() {
        let mut voice = msg(0, Kind::Voice, "Ada", "[AUDIO TRANSCRIPTION FAILED]");
        voice.media_filename = Some("/a/PTT-1.opus".into());
        voice.status = Status::Failed;
        voice.status_reason = Some(StatusReason::AsrFailed);

        let out = render_transcript(&[voice]);
        assert!(out.contains("[AUDIO TRANSCRIPTION FAILED]"));
    }

    #[test]
    fn merge_donors_are_not_rendered() {
        let mut image = msg(0, Kind::Image, "Ada", "");
        image.media_filename = Some("/a/IMG-1.jpg".into());
        image.caption = Some("sunset".to_string());
        let mut donor = msg(1, Kind::Text, "Ada", "");
        donor.status = Status::Skipped;
        donor.status_reason = Some(StatusReason::MergedIntoPreviousMedia);

        let out = render_transcript(&[image, donor]);
        assert!(out.contains("sunset"));
        assert_eq!(out.lines().count(), 2); // annotation line + caption line
    }

    #[test]
    fn unresolved_media_is_annotated() {
        let unresolved = {
            let mut m = msg(0, Kind::Image, "Ada", "");
            m.status_reason = Some(StatusReason::UnresolvedMedia);
            m
        };
        let out = render_transcript(&[unresolved]);
        assert!(out.contains("[image: unresolved]"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let rows = vec![msg(0, Kind::Text, "Ada", "same")];
        assert_eq!(render_transcript(&rows), render_transcript(&rows));
    }
}
