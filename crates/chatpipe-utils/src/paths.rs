//! Filesystem path helpers shared across stages.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;

/// Create a directory and all parents, tolerating benign races.
///
/// # Errors
///
/// Returns an error for any failure other than the directory already
/// existing.
pub fn ensure_dir_all(path: &Utf8Path) -> Result<()> {
    match fs::create_dir_all(path.as_std_path()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to create directory: {path}")),
    }
}

/// Express `path` relative to `base` when possible, otherwise return it
/// unchanged.
///
/// Stage outputs record run-dir-relative paths (chunk files, cache hints)
/// so identical fixtures produce identical bytes regardless of where the
/// run directory lives.
#[must_use]
pub fn relative_to(path: &Utf8Path, base: &Utf8Path) -> String {
    path.strip_prefix(base)
        .map(|p| p.to_string())
        .unwrap_or_else(|_| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[test]
    fn ensure_dir_all_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("a/b/c")).unwrap();
        ensure_dir_all(&path).unwrap();
        ensure_dir_all(&path).unwrap();
        assert!(path.is_dir());
    }

    #[test]
    fn relative_to_strips_base() {
        let base = Utf8Path::new("/runs/r1");
        let path = Utf8Path::new("/runs/r1/tmp/audio/chunk_0000.wav");
        assert_eq!(relative_to(path, base), "tmp/audio/chunk_0000.wav");
        assert_eq!(relative_to(Utf8Path::new("/other"), base), "/other");
    }
}
