//! Stage JSONL I/O with invariant enforcement.
//!
//! Every read and write path validates the record invariants: dense `idx`
//! after sorting, `partial ↔ status=partial`, and a compatible schema
//! version. A violated invariant is a hard error, never a warning.

use camino::Utf8Path;
use std::fs;
use std::io::Write;

use crate::error::MessageError;
use crate::model::{Message, Status};
use crate::schema::check_schema_compat;

/// Validate the cross-record invariants over a sorted-or-sortable slice.
///
/// # Errors
///
/// Returns the first violated invariant: non-dense `idx`, inconsistent
/// `partial` flag, or incompatible schema version.
pub fn validate_records(messages: &[Message]) -> Result<(), MessageError> {
    let mut indices: Vec<u64> = messages.iter().map(|m| m.idx).collect();
    indices.sort_unstable();
    for (position, &found) in indices.iter().enumerate() {
        let expected = position as u64;
        if found != expected {
            return Err(MessageError::NonDenseIdx {
                expected,
                found,
                position,
            });
        }
    }

    for msg in messages {
        if !msg.partial_flag_consistent() {
            return Err(MessageError::PartialFlagMismatch {
                idx: msg.idx,
                partial: msg.partial,
                status: status_name(msg.status).to_string(),
            });
        }
        check_schema_compat(&msg.schema_version, 0)?;
    }

    Ok(())
}

/// Write a stage output file: records sorted by `idx`, one JSON object per
/// line, LF terminators, trailing newline.
///
/// The write is not atomic by itself; callers route the returned string
/// through their atomic writer. This function validates before producing
/// any bytes.
///
/// # Errors
///
/// Returns an error when validation fails or the file cannot be written.
pub fn write_jsonl(path: &Utf8Path, messages: &[Message]) -> Result<(), MessageError> {
    let content = to_jsonl_string(messages)?;
    let mut tmp = path.to_owned();
    tmp.set_extension("jsonl.tmp");
    {
        let mut file = fs::File::create(tmp.as_std_path()).map_err(|e| io_err(&tmp, e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| io_err(&tmp, e))?;
        file.sync_all().map_err(|e| io_err(&tmp, e))?;
    }
    fs::rename(tmp.as_std_path(), path.as_std_path()).map_err(|e| io_err(path, e))?;
    Ok(())
}

/// Serialize records to the JSONL string form without touching disk.
///
/// # Errors
///
/// Returns an error when validation fails.
pub fn to_jsonl_string(messages: &[Message]) -> Result<String, MessageError> {
    validate_records(messages)?;

    let mut sorted: Vec<&Message> = messages.iter().collect();
    sorted.sort_by_key(|m| m.idx);

    let mut out = String::new();
    for msg in sorted {
        let line = serde_json::to_string(msg).map_err(|e| MessageError::InvalidRecord {
            path: String::new(),
            line: msg.idx as usize,
            reason: e.to_string(),
        })?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

/// Read a stage output file, validating every record.
///
/// Records are returned sorted by `idx`.
///
/// # Errors
///
/// Returns an error on unreadable files, unparseable lines, or any
/// violated invariant.
pub fn read_jsonl(path: &Utf8Path) -> Result<Vec<Message>, MessageError> {
    let content = fs::read_to_string(path.as_std_path()).map_err(|e| io_err(path, e))?;

    let mut messages = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let msg: Message =
            serde_json::from_str(line).map_err(|e| MessageError::InvalidRecord {
                path: path.to_string(),
                line: line_no + 1,
                reason: e.to_string(),
            })?;
        messages.push(msg);
    }

    validate_records(&messages)?;
    messages.sort_by_key(|m| m.idx);
    Ok(messages)
}

fn status_name(status: Status) -> &'static str {
    match status {
        Status::Ok => "ok",
        Status::Partial => "partial",
        Status::Failed => "failed",
        Status::Skipped => "skipped",
    }
}

fn io_err(path: &Utf8Path, source: std::io::Error) -> MessageError {
    MessageError::Io {
        path: path.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Kind;
    use camino::Utf8PathBuf;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn msg(idx: u64) -> Message {
        let ts = NaiveDate::from_ymd_opt(2025, 7, 8)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        Message::new(idx, ts, "Ada", Kind::Text)
    }

    #[test]
    fn round_trip_preserves_order_and_content() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("messages.M1.jsonl")).unwrap();

        // Unsorted input is sorted on write.
        let messages = vec![msg(2), msg(0), msg(1)];
        write_jsonl(&path, &messages).unwrap();

        let back = read_jsonl(&path).unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(
            back.iter().map(|m| m.idx).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn non_dense_idx_is_rejected() {
        let messages = vec![msg(0), msg(2)];
        assert!(matches!(
            validate_records(&messages),
            Err(MessageError::NonDenseIdx { expected: 1, found: 2, .. })
        ));
    }

    #[test]
    fn partial_mismatch_is_rejected() {
        let mut bad = msg(0);
        bad.partial = true;
        assert!(matches!(
            validate_records(&[bad]),
            Err(MessageError::PartialFlagMismatch { idx: 0, .. })
        ));
    }

    #[test]
    fn incompatible_schema_version_is_rejected_on_read() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("m.jsonl")).unwrap();

        let mut m = msg(0);
        m.schema_version = "9.0.0".to_string();
        let line = serde_json::to_string(&m).unwrap();
        std::fs::write(path.as_std_path(), format!("{line}\n")).unwrap();

        assert!(matches!(
            read_jsonl(&path),
            Err(MessageError::SchemaVersion { .. })
        ));
    }

    #[test]
    fn blank_lines_are_tolerated() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("m.jsonl")).unwrap();

        let line = serde_json::to_string(&msg(0)).unwrap();
        std::fs::write(path.as_std_path(), format!("{line}\n\n")).unwrap();

        assert_eq!(read_jsonl(&path).unwrap().len(), 1);
    }
}
