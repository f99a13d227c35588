//! BLAKE3 content hashing helpers.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs::File;
use std::io::{BufReader, Read};

/// Hash a byte slice, returning lowercase hex.
#[must_use]
pub fn blake3_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Hash a file's content in streaming fashion, returning lowercase hex.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn blake3_hex_file(path: &Utf8Path) -> Result<String> {
    let file = File::open(path.as_std_path())
        .with_context(|| format!("Failed to open file for hashing: {path}"))?;
    let mut reader = BufReader::new(file);
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("Failed to read file for hashing: {path}"))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Hash a file and return the labeled form recorded in derived metadata,
/// e.g. `blake3:af13…`.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn labeled_file_hash(path: &Utf8Path) -> Result<String> {
    Ok(format!("blake3:{}", blake3_hex_file(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[test]
    fn file_hash_matches_bytes_hash() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("f.bin")).unwrap();
        std::fs::write(path.as_std_path(), b"chatpipe").unwrap();

        assert_eq!(blake3_hex_file(&path).unwrap(), blake3_hex(b"chatpipe"));
    }

    #[test]
    fn labeled_hash_carries_prefix() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("f.bin")).unwrap();
        std::fs::write(path.as_std_path(), b"x").unwrap();

        let labeled = labeled_file_hash(&path).unwrap();
        assert!(labeled.starts_with("blake3:"));
        assert_eq!(labeled.len(), "blake3:".len() + 64);
    }
}
