//! Atomic file writes: temp file in the target directory, fsync, rename.
//!
//! Readers either observe the previous complete file or the new complete
//! file, never a torn intermediate. Text goes out UTF-8 with LF line
//! terminators only.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;

use tempfile::NamedTempFile;

/// Atomically write text content to `path`.
///
/// CRLF/CR line endings in `content` are normalized to LF before the write.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created, the temp
/// file cannot be written or synced, or the rename fails.
pub fn write_text_atomic(path: &Utf8Path, content: &str) -> Result<()> {
    let normalized = normalize_line_endings(content);
    write_bytes_atomic(path, normalized.as_bytes())
}

/// Atomically write raw bytes to `path`.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created, the temp
/// file cannot be written or synced, or the rename fails.
pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {parent}"))?;
    }

    let temp_dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut temp_file = NamedTempFile::new_in(temp_dir)
        .with_context(|| format!("Failed to create temporary file in: {temp_dir}"))?;

    temp_file
        .write_all(content)
        .with_context(|| format!("Failed to write temporary file for: {path}"))?;

    temp_file
        .as_file()
        .sync_all()
        .with_context(|| format!("Failed to fsync temporary file for: {path}"))?;

    temp_file
        .persist(path.as_std_path())
        .map_err(|e| anyhow::anyhow!(e.error))
        .with_context(|| format!("Failed to atomically replace: {path}"))?;

    Ok(())
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

/// Cap a string to its last `max_bytes` bytes, respecting char boundaries.
///
/// Used for stderr tails persisted into derived metadata and logs.
#[must_use]
pub fn tail_str(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut start = s.len() - max_bytes;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    s[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn utf8_path(dir: &TempDir, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap()
    }

    #[test]
    fn writes_and_normalizes_line_endings() {
        let dir = TempDir::new().unwrap();
        let path = utf8_path(&dir, "out.txt");

        write_text_atomic(&path, "a\r\nb\rc\n").unwrap();

        let content = fs::read_to_string(path.as_std_path()).unwrap();
        assert_eq!(content, "a\nb\nc\n");
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = utf8_path(&dir, "nested/deeper/out.txt");

        write_text_atomic(&path, "payload").unwrap();
        assert_eq!(fs::read_to_string(path.as_std_path()).unwrap(), "payload");
    }

    #[test]
    fn replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = utf8_path(&dir, "out.txt");

        write_text_atomic(&path, "first").unwrap();
        write_text_atomic(&path, "second").unwrap();

        assert_eq!(fs::read_to_string(path.as_std_path()).unwrap(), "second");
    }

    #[test]
    fn tail_str_respects_char_boundaries() {
        assert_eq!(tail_str("hello", 10), "hello");
        assert_eq!(tail_str("hello", 3), "llo");
        // Multi-byte char straddling the cut point gets dropped whole.
        let s = "aé";
        assert_eq!(tail_str(s, 1), "");
    }
}
