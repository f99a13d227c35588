//! The exceptions log: one CSV row per unresolved or ambiguous record.
//!
//! The file is rewritten whole once per run; there are no incremental
//! appends.

use anyhow::Result;
use camino::Utf8Path;

use chatpipe_message::{Disambiguation, Message};
use chatpipe_utils::atomic_write::write_text_atomic;

/// Column header, fixed by the external contract.
pub const HEADER: &str = "idx,ts,sender,kind,media_hint,reason,top1_path,top1_score,top2_path,top2_score,top3_path,top3_score,disambiguation_json";

/// One exceptions row.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionRow {
    pub idx: u64,
    pub ts: String,
    pub sender: String,
    pub kind: String,
    pub media_hint: String,
    pub reason: String,
    /// Up to three `(path, total)` pairs, best first.
    pub top: Vec<(String, f64)>,
    pub disambiguation_json: String,
}

impl ExceptionRow {
    /// Build a row from the message being reported.
    #[must_use]
    pub fn new(
        msg: &Message,
        reason: &str,
        top: &[(String, f64)],
        disambiguation: Option<&Disambiguation>,
    ) -> Self {
        let disambiguation_json = disambiguation
            .and_then(|d| serde_json::to_string(d).ok())
            .unwrap_or_default();
        Self {
            idx: msg.idx,
            ts: msg.ts.format("%Y-%m-%dT%H:%M:%S").to_string(),
            sender: msg.sender.clone(),
            kind: msg.kind.as_str().to_string(),
            media_hint: msg.media_hint.clone().unwrap_or_default(),
            reason: reason.to_string(),
            top: top.to_vec(),
            disambiguation_json,
        }
    }

    fn to_csv_line(&self) -> String {
        let mut fields: Vec<String> = vec![
            self.idx.to_string(),
            self.ts.clone(),
            self.sender.clone(),
            self.kind.clone(),
            self.media_hint.clone(),
            self.reason.clone(),
        ];
        for slot in 0..3 {
            match self.top.get(slot) {
                Some((path, score)) => {
                    fields.push(path.clone());
                    fields.push(format!("{score:.3}"));
                }
                None => {
                    fields.push(String::new());
                    fields.push(String::new());
                }
            }
        }
        fields.push(self.disambiguation_json.clone());
        fields
            .iter()
            .map(|f| escape_csv(f))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Rewrite the exceptions file with the given rows.
///
/// # Errors
///
/// Returns an error when the file cannot be written.
pub fn write_exceptions(path: &Utf8Path, rows: &[ExceptionRow]) -> Result<()> {
    let mut content = String::from(HEADER);
    content.push('\n');
    for row in rows {
        content.push_str(&row.to_csv_line());
        content.push('\n');
    }
    write_text_atomic(path, &content)
}

fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn row() -> ExceptionRow {
        ExceptionRow {
            idx: 7,
            ts: "2025-07-08T12:00:00".to_string(),
            sender: "Ada, the first".to_string(),
            kind: "image".to_string(),
            media_hint: String::new(),
            reason: "ambiguous_media".to_string(),
            top: vec![
                ("/a/IMG-1.jpg".to_string(), 2.5),
                ("/a/IMG-2.jpg".to_string(), 2.25),
            ],
            disambiguation_json: r#"{"top_score":2.5}"#.to_string(),
        }
    }

    #[test]
    fn rows_are_escaped_and_padded() {
        let line = row().to_csv_line();
        // Comma-bearing sender is quoted.
        assert!(line.contains("\"Ada, the first\""));
        // Missing top3 slots serialize as empty fields.
        assert!(line.contains("2.250,,,"));
        // Embedded quotes in JSON are doubled.
        assert!(line.contains(r#""{""top_score"":2.5}""#));
    }

    #[test]
    fn file_is_rewritten_whole() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("exceptions.csv")).unwrap();

        write_exceptions(&path, &[row(), row()]).unwrap();
        write_exceptions(&path, &[row()]).unwrap();

        let content = std::fs::read_to_string(path.as_std_path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], HEADER);
    }

    #[test]
    fn empty_run_still_writes_header() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("exceptions.csv")).unwrap();

        write_exceptions(&path, &[]).unwrap();
        let content = std::fs::read_to_string(path.as_std_path()).unwrap();
        assert_eq!(content, format!("{HEADER}\n"));
    }
}
