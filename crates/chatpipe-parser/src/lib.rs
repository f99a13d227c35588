//! Chat transcript parser: stage M1.
//!
//! Consumes a WhatsApp-style exported transcript and produces the dense,
//! canonical message records every later stage builds on. Two header
//! shapes are recognized (dash and bracketed); lines matching neither
//! continue the previous record's block. A final pass folds caption
//! messages into the media record they annotate.

use camino::Utf8Path;
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use chatpipe_message::{Kind, Message, Status, StatusReason};

static DASH_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{1,2})/(\d{1,2})/(\d{2,4}),\s(\d{1,2}):(\d{2})(?::(\d{2}))?(?:\s?([AaPp])\.?[Mm]\.?)?\s-\s(.*)$",
    )
    .expect("dash header pattern compiles")
});

static BRACKET_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[(\d{1,2})/(\d{1,2})/(\d{2,4}),\s(\d{1,2}):(\d{2})(?::(\d{2}))?\]\s(.*)$")
        .expect("bracket header pattern compiles")
});

static FILE_ATTACHED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?<file>\S+\.[A-Za-z0-9]{1,5})\s\(file attached\)$")
        .expect("file attached pattern compiles")
});

static ATTACHED_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^<attached:\s*(?<file>.+?)>$").expect("attached marker pattern compiles")
});

const MEDIA_OMITTED: &str = "<Media omitted>";

/// Parsing failures. Any of these fails stage M1 and the run.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to read chat file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("No message records found in {path}")]
    NoRecords { path: String },
}

/// Parse a chat export file into canonical records.
///
/// # Errors
///
/// Returns [`ParseError::Io`] for unreadable input and
/// [`ParseError::NoRecords`] when nothing parses: a bad chat file fails
/// the run.
pub fn parse_chat_file(path: &Utf8Path) -> Result<Vec<Message>, ParseError> {
    let content = std::fs::read_to_string(path.as_std_path()).map_err(|e| ParseError::Io {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    let messages = parse_chat(&content);
    if messages.is_empty() {
        return Err(ParseError::NoRecords {
            path: path.to_string(),
        });
    }
    debug!(path = %path, records = messages.len(), "Chat file parsed");
    Ok(messages)
}

/// Parse chat text into canonical records. Returns an empty vec when no
/// line matches a header shape.
#[must_use]
pub fn parse_chat(content: &str) -> Vec<Message> {
    let mut messages: Vec<Message> = Vec::new();

    for raw_line in content.lines() {
        let line = strip_direction_marks(raw_line);
        match parse_header(&line) {
            Some((ts, rest)) => {
                let idx = messages.len() as u64;
                messages.push(build_record(idx, ts, &rest, raw_line));
            }
            None => {
                // Continuation of the previous record's block; leading
                // junk before the first header is dropped.
                if let Some(last) = messages.last_mut() {
                    last.raw_block.push('\n');
                    last.raw_block.push_str(raw_line);
                    if !last.content_text.is_empty() || !line.trim().is_empty() {
                        if !last.content_text.is_empty() {
                            last.content_text.push('\n');
                        }
                        last.content_text.push_str(line.trim_end());
                    }
                }
            }
        }
    }

    merge_captions(&mut messages);
    messages
}

fn strip_direction_marks(line: &str) -> String {
    line.chars()
        .filter(|c| !matches!(c, '\u{200e}' | '\u{200f}' | '\u{202a}'..='\u{202e}'))
        .collect()
}

fn parse_header(line: &str) -> Option<(NaiveDateTime, String)> {
    if let Some(c) = DASH_HEADER.captures(line) {
        let ts = build_ts(
            &c[1],
            &c[2],
            &c[3],
            &c[4],
            &c[5],
            c.get(6).map(|m| m.as_str()),
            c.get(7).map(|m| m.as_str()),
        )?;
        return Some((ts, c[8].to_string()));
    }
    if let Some(c) = BRACKET_HEADER.captures(line) {
        let ts = build_ts(
            &c[1],
            &c[2],
            &c[3],
            &c[4],
            &c[5],
            c.get(6).map(|m| m.as_str()),
            None,
        )?;
        return Some((ts, c[7].to_string()));
    }
    None
}

/// Exports carry either day-first or month-first dates depending on the
/// device locale. A field larger than 12 disambiguates; otherwise
/// day-first wins (the dominant export locale for this format).
fn build_ts(
    f1: &str,
    f2: &str,
    year: &str,
    hour: &str,
    minute: &str,
    second: Option<&str>,
    meridiem: Option<&str>,
) -> Option<NaiveDateTime> {
    let a: u32 = f1.parse().ok()?;
    let b: u32 = f2.parse().ok()?;
    let mut year: i32 = year.parse().ok()?;
    if year < 100 {
        year += 2000;
    }

    let (day, month) = if a > 12 { (a, b) } else if b > 12 { (b, a) } else { (a, b) };

    let mut hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;
    let second: u32 = second.and_then(|s| s.parse().ok()).unwrap_or(0);
    match meridiem.map(str::to_ascii_lowercase).as_deref() {
        Some("p") if hour < 12 => hour += 12,
        Some("a") if hour == 12 => hour = 0,
        _ => {}
    }

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

fn build_record(idx: u64, ts: NaiveDateTime, rest: &str, raw_line: &str) -> Message {
    let (sender, body) = match rest.split_once(": ") {
        Some((sender, body)) if !sender.is_empty() => (sender.to_string(), body.to_string()),
        _ => (String::new(), rest.to_string()),
    };

    let mut msg = Message::new(
        idx,
        ts,
        sender.clone(),
        if sender.is_empty() { Kind::System } else { Kind::Text },
    );
    msg.raw_line = raw_line.to_string();
    msg.raw_block = raw_line.to_string();

    if msg.kind == Kind::System {
        msg.content_text = body.trim().to_string();
        return msg;
    }

    let body = body.trim_end();
    if let Some(c) = FILE_ATTACHED.captures(body) {
        let file = c["file"].to_string();
        msg.kind = kind_from_filename(&file);
        msg.media_hint = Some(file);
    } else if let Some(c) = ATTACHED_MARKER.captures(body) {
        let file = c["file"].to_string();
        msg.kind = kind_from_filename(&file);
        msg.media_hint = Some(file);
    } else if body == MEDIA_OMITTED {
        msg.kind = Kind::Unknown;
    } else {
        msg.content_text = body.to_string();
    }

    msg
}

fn kind_from_filename(name: &str) -> Kind {
    let prefix = name.split('-').next().unwrap_or("");
    match prefix {
        "IMG" => return Kind::Image,
        "VID" => return Kind::Video,
        "PTT" | "AUD" => return Kind::Voice,
        "DOC" => return Kind::Document,
        "STK" => return Kind::Sticker,
        _ => {}
    }
    match name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) => match ext.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "heic" => Kind::Image,
            "webp" => Kind::Sticker,
            "mp4" | "mov" | "3gp" => Kind::Video,
            "opus" | "ogg" | "m4a" | "mp3" | "aac" | "amr" | "wav" => Kind::Voice,
            "pdf" | "doc" | "docx" | "xls" | "xlsx" | "txt" | "vcf" => Kind::Document,
            _ => Kind::Unknown,
        },
        None => Kind::Unknown,
    }
}

/// Fold an immediately following same-sender, same-timestamp text record
/// into the preceding media record's caption. The donor stays in the
/// output as a skipped merge marker so `idx` remains dense.
fn merge_captions(messages: &mut [Message]) {
    for i in 1..messages.len() {
        let (head, tail) = messages.split_at_mut(i);
        let prev = &mut head[i - 1];
        let cur = &mut tail[0];

        let prev_is_media = prev.kind.expects_media() && prev.status == Status::Ok;
        let mergeable = cur.kind == Kind::Text
            && cur.status == Status::Ok
            && !cur.content_text.is_empty()
            && cur.sender == prev.sender
            && cur.ts == prev.ts
            && prev.caption.is_none();

        if prev_is_media && mergeable {
            prev.caption = Some(std::mem::take(&mut cur.content_text));
            cur.status = Status::Skipped;
            cur.status_reason = Some(StatusReason::MergedIntoPreviousMedia);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Vec<Message> {
        parse_chat(content)
    }

    #[test]
    fn basic_text_messages() {
        let msgs = parse(
            "08/07/2025, 14:30 - Ada: hello there\n08/07/2025, 14:31 - Grace: hi back\n",
        );
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].sender, "Ada");
        assert_eq!(msgs[0].kind, Kind::Text);
        assert_eq!(msgs[0].content_text, "hello there");
        assert_eq!(msgs[0].ts.format("%Y-%m-%dT%H:%M:%S").to_string(), "2025-07-08T14:30:00");
        assert_eq!(msgs[1].idx, 1);
    }

    #[test]
    fn continuation_lines_extend_the_block() {
        let msgs = parse("08/07/2025, 14:30 - Ada: first line\nsecond line\nthird line\n");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content_text, "first line\nsecond line\nthird line");
        assert!(msgs[0].raw_block.contains("second line"));
        assert_eq!(msgs[0].raw_line, "08/07/2025, 14:30 - Ada: first line");
    }

    #[test]
    fn attachment_markers_set_hint_and_kind() {
        let msgs = parse(
            "08/07/2025, 14:30 - Ada: PTT-20250708-WA0028.opus (file attached)\n\
             08/07/2025, 14:31 - Ada: <attached: IMG-20250708-WA0001.jpg>\n\
             08/07/2025, 14:32 - Grace: <Media omitted>\n",
        );
        assert_eq!(msgs[0].kind, Kind::Voice);
        assert_eq!(msgs[0].media_hint.as_deref(), Some("PTT-20250708-WA0028.opus"));
        assert_eq!(msgs[1].kind, Kind::Image);
        assert_eq!(msgs[1].media_hint.as_deref(), Some("IMG-20250708-WA0001.jpg"));
        assert_eq!(msgs[2].kind, Kind::Unknown);
        assert_eq!(msgs[2].media_hint, None);
    }

    #[test]
    fn system_lines_have_no_sender() {
        let msgs = parse(
            "08/07/2025, 14:29 - Messages and calls are end-to-end encrypted.\n\
             08/07/2025, 14:30 - Ada: hi\n",
        );
        assert_eq!(msgs[0].kind, Kind::System);
        assert_eq!(msgs[0].sender, "");
        assert!(msgs[0].content_text.contains("end-to-end"));
    }

    #[test]
    fn caption_merge_moves_payload() {
        let msgs = parse(
            "08/07/2025, 14:30 - Ada: IMG-20250708-WA0001.jpg (file attached)\n\
             08/07/2025, 14:30 - Ada: sunset at the pier\n\
             08/07/2025, 14:31 - Grace: nice!\n",
        );
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].caption.as_deref(), Some("sunset at the pier"));
        assert_eq!(msgs[1].status, Status::Skipped);
        assert_eq!(
            msgs[1].status_reason,
            Some(StatusReason::MergedIntoPreviousMedia)
        );
        assert_eq!(msgs[1].content_text, "");
        // Unrelated follow-up is untouched.
        assert_eq!(msgs[2].status, Status::Ok);
    }

    #[test]
    fn different_sender_or_time_does_not_merge() {
        let msgs = parse(
            "08/07/2025, 14:30 - Ada: IMG-20250708-WA0001.jpg (file attached)\n\
             08/07/2025, 14:31 - Ada: a minute later\n",
        );
        assert_eq!(msgs[0].caption, None);
        assert_eq!(msgs[1].status, Status::Ok);
    }

    #[test]
    fn am_pm_and_two_digit_years() {
        let msgs = parse("8/7/25, 2:30 PM - Ada: afternoon\n8/7/25, 12:05 AM - Ada: midnight\n");
        assert_eq!(msgs[0].ts.format("%H:%M").to_string(), "14:30");
        assert_eq!(msgs[1].ts.format("%H:%M").to_string(), "00:05");
        assert_eq!(msgs[0].ts.format("%Y").to_string(), "2025");
    }

    #[test]
    fn month_first_dates_disambiguate_on_large_fields() {
        // 25 cannot be a month, so 7/25 is month-first July 25.
        let msgs = parse("7/25/2025, 10:00 - Ada: summer\n");
        assert_eq!(msgs[0].ts.format("%Y-%m-%d").to_string(), "2025-07-25");
    }

    #[test]
    fn bracket_header_with_seconds() {
        let msgs = parse("[08/07/2025, 14:30:05] Ada: precise\n");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].ts.format("%H:%M:%S").to_string(), "14:30:05");
    }

    #[test]
    fn direction_marks_are_stripped() {
        let msgs = parse("\u{200e}08/07/2025, 14:30 - Ada: \u{200e}IMG-20250708-WA0001.jpg (file attached)\n");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].media_hint.as_deref(), Some("IMG-20250708-WA0001.jpg"));
    }

    #[test]
    fn empty_input_parses_to_nothing() {
        assert!(parse("").is_empty());
        assert!(parse("no headers here\njust prose\n").is_empty());
    }

    #[test]
    fn idx_is_dense_in_file_order() {
        let msgs = parse(
            "08/07/2025, 14:30 - Ada: one\n08/07/2025, 14:31 - Ada: two\n08/07/2025, 14:32 - Ada: three\n",
        );
        let idx: Vec<u64> = msgs.iter().map(|m| m.idx).collect();
        assert_eq!(idx, vec![0, 1, 2]);
    }
}
