//! Archive scan and media artifact index.
//!
//! Artifacts are bucketed by `(chat day, kind)`. The chat day lives in the
//! archive's naive local frame: modification times are converted once here
//! and every downstream comparison stays in that frame.
//!
//! The exact-basename map behind the resolver fast path covers only the
//! archive root and recognized first-level media folders; the scored
//! ladder draws from the full tree.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Local, NaiveDate, NaiveDateTime, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::sync::{Arc, OnceLock};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

use chatpipe_config::ResolverConfig;
use chatpipe_message::Kind;

use crate::error::MediaError;

/// Canonical archive filename pattern, e.g. `PTT-20250708-WA0028.opus`.
static CANONICAL_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(IMG|VID|PTT|AUD|DOC)-(\d{8})-WA(\d{3,6})(\(\d+\))?\.[A-Za-z0-9]{1,5}$")
        .expect("canonical name pattern compiles")
});

static SEQ_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"WA(\d{3,6})").expect("sequence pattern compiles"));

static DATE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b((?:19|20)\d{6})\b").expect("date token pattern compiles"));

static COPY_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s?\(\d+\)$").expect("copy suffix pattern compiles"));

/// First-level directory names (lowercased substring match) whose contents
/// are visible to the exact-filename fast path. The scored ladder sees the
/// whole tree; only the fast path is restricted.
const RECOGNIZED_MEDIA_FOLDERS: &[&str] = &[
    "media", "images", "video", "audio", "voice", "documents", "stickers",
];

/// Whether `path` lies in the archive root itself or under a recognized
/// first-level media folder.
fn fast_path_visible(root: &Utf8Path, path: &Utf8Path) -> bool {
    let Ok(rel) = path.strip_prefix(root) else {
        return false;
    };
    let mut components = rel.components();
    let Some(first) = components.next() else {
        return false;
    };
    if components.next().is_none() {
        // The file sits directly in the archive root.
        return true;
    }
    let name = first.as_str().to_lowercase();
    RECOGNIZED_MEDIA_FOLDERS.iter().any(|t| name.contains(t))
}

/// Media artifact kind parsed from the filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactKind {
    Voice,
    Image,
    Video,
    Document,
    Other,
}

impl ArtifactKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Image => "image",
            Self::Video => "video",
            Self::Document => "document",
            Self::Other => "other",
        }
    }

    /// Parse the names used in `resolver.ext_priority` configuration.
    #[must_use]
    pub fn from_config_name(name: &str) -> Option<Self> {
        match name {
            "voice" => Some(Self::Voice),
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "document" => Some(Self::Document),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Artifact kinds compatible with a message kind.
    #[must_use]
    pub fn compatible_with(message_kind: Kind) -> &'static [Self] {
        match message_kind {
            Kind::Voice => &[Self::Voice],
            Kind::Image => &[Self::Image],
            Kind::Video => &[Self::Video],
            Kind::Document => &[Self::Document],
            Kind::Sticker => &[Self::Image, Self::Other],
            Kind::Unknown => &[
                Self::Voice,
                Self::Image,
                Self::Video,
                Self::Document,
                Self::Other,
            ],
            Kind::Text | Kind::System => &[],
        }
    }
}

/// Tokens parsed from an artifact filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTokens {
    pub kind: ArtifactKind,
    /// Filename without extension, copy suffix stripped.
    pub stem: String,
    /// `YYYYMMDD` token when present.
    pub date_token: Option<String>,
    /// `WA`-sequence number when present.
    pub seq: Option<u32>,
    /// Whether the name carried a `(n)` duplicate suffix.
    pub copy_suffix: bool,
}

/// Whether `name` matches the canonical archive filename pattern used by
/// the resolver fast path.
#[must_use]
pub fn is_canonical_archive_name(name: &str) -> bool {
    CANONICAL_NAME.is_match(name)
}

fn kind_from_extension(ext: &str) -> ArtifactKind {
    match ext {
        "jpg" | "jpeg" | "png" | "webp" | "gif" | "heic" => ArtifactKind::Image,
        "mp4" | "mov" | "3gp" | "mkv" | "avi" => ArtifactKind::Video,
        "opus" | "ogg" | "m4a" | "mp3" | "aac" | "amr" | "wav" | "flac" => ArtifactKind::Voice,
        "pdf" | "doc" | "docx" | "xls" | "xlsx" | "txt" | "vcf" | "zip" => ArtifactKind::Document,
        _ => ArtifactKind::Other,
    }
}

/// Parse filename tokens from a basename like `IMG-20250708-WA0012(1).jpg`.
#[must_use]
pub fn parse_file_tokens(basename: &str) -> FileTokens {
    let (stem_raw, ext) = match basename.rsplit_once('.') {
        Some((stem, ext)) => (stem, ext.to_ascii_lowercase()),
        None => (basename, String::new()),
    };

    let copy_suffix = COPY_SUFFIX.is_match(stem_raw);
    let stem = COPY_SUFFIX.replace(stem_raw, "").to_string();

    let kind = match stem.split('-').next() {
        Some("IMG") => ArtifactKind::Image,
        Some("VID") => ArtifactKind::Video,
        Some("PTT" | "AUD") => ArtifactKind::Voice,
        Some("DOC") => ArtifactKind::Document,
        _ => kind_from_extension(&ext),
    };

    let date_token = DATE_TOKEN
        .captures(&stem)
        .map(|c| c[1].to_string());
    let seq = SEQ_TOKEN
        .captures(&stem)
        .and_then(|c| c[1].parse::<u32>().ok());

    FileTokens {
        kind,
        stem,
        date_token,
        seq,
        copy_suffix,
    }
}

/// A single media file discovered under the archive root.
#[derive(Debug)]
pub struct MediaArtifact {
    pub path: Utf8PathBuf,
    pub size: u64,
    /// Modification time, epoch seconds.
    pub mtime_epoch: i64,
    pub tokens: FileTokens,
    hash: OnceLock<Option<String>>,
}

impl MediaArtifact {
    /// Construct an artifact from already-known metadata. Filename tokens
    /// are parsed from the path's basename.
    #[must_use]
    pub fn new(path: Utf8PathBuf, size: u64, mtime_epoch: i64) -> Self {
        let tokens = parse_file_tokens(path.file_name().unwrap_or_default());
        Self {
            path,
            size,
            mtime_epoch,
            tokens,
            hash: OnceLock::new(),
        }
    }

    fn from_file(path: Utf8PathBuf, meta: &fs::Metadata) -> Self {
        let mtime_epoch = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let tokens = parse_file_tokens(path.file_name().unwrap_or_default());
        Self {
            path,
            size: meta.len(),
            mtime_epoch,
            tokens,
            hash: OnceLock::new(),
        }
    }

    /// Modification time in the archive's naive local frame.
    #[must_use]
    pub fn mtime_naive(&self) -> NaiveDateTime {
        Local
            .timestamp_opt(self.mtime_epoch, 0)
            .single()
            .map(|dt| dt.naive_local())
            .unwrap_or_default()
    }

    /// Calendar date used for candidate bucketing.
    #[must_use]
    pub fn chat_day(&self) -> NaiveDate {
        self.mtime_naive().date()
    }

    /// Labeled content hash (`blake3:<hex>`), computed once on demand.
    ///
    /// Returns `None` (and stays `None`) when the file cannot be read.
    pub fn content_hash(&self) -> Option<&str> {
        self.hash
            .get_or_init(|| match chatpipe_utils::hash::labeled_file_hash(&self.path) {
                Ok(h) => Some(h),
                Err(e) => {
                    warn!(path = %self.path, error = %e, "Failed to hash media artifact");
                    None
                }
            })
            .as_deref()
    }

    /// Basename of the artifact.
    #[must_use]
    pub fn basename(&self) -> &str {
        self.path.file_name().unwrap_or_default()
    }
}

/// Read-only index of all media artifacts under an archive root.
#[derive(Debug)]
pub struct MediaIndex {
    root: Utf8PathBuf,
    by_day_kind: BTreeMap<(NaiveDate, ArtifactKind), Vec<Arc<MediaArtifact>>>,
    by_basename: HashMap<String, Vec<Arc<MediaArtifact>>>,
    all: Vec<Arc<MediaArtifact>>,
}

impl MediaIndex {
    /// Scan the archive tree under `root`.
    ///
    /// Per-entry I/O failures are tolerated (logged and skipped); only a
    /// missing root is an error. Files are admitted by extension from
    /// `resolver.allowed_extensions`.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::RootMissing`] when `root` is not a directory.
    pub fn scan(root: &Utf8Path, cfg: &ResolverConfig) -> Result<Self, MediaError> {
        if !root.is_dir() {
            return Err(MediaError::RootMissing {
                root: root.to_string(),
            });
        }

        let allowed: Vec<String> = cfg
            .allowed_extensions
            .iter()
            .map(|e| e.to_ascii_lowercase())
            .collect();

        let mut all: Vec<Arc<MediaArtifact>> = Vec::new();
        let mut stack = vec![root.to_owned()];
        while let Some(dir) = stack.pop() {
            let entries = match fs::read_dir(dir.as_std_path()) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %dir, error = %e, "Skipping unreadable directory");
                    continue;
                }
            };
            for entry in entries {
                let Ok(entry) = entry else { continue };
                let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                    continue;
                };
                let Ok(meta) = entry.metadata() else {
                    warn!(path = %path, "Skipping entry with unreadable metadata");
                    continue;
                };
                if meta.is_dir() {
                    stack.push(path);
                    continue;
                }
                let ext = path.extension().unwrap_or("").to_ascii_lowercase();
                if !allowed.iter().any(|a| a == &ext) {
                    continue;
                }
                all.push(Arc::new(MediaArtifact::from_file(path, &meta)));
            }
        }

        // Deterministic base order regardless of directory iteration order.
        all.sort_by(|a, b| a.path.cmp(&b.path));

        let mut by_day_kind: BTreeMap<(NaiveDate, ArtifactKind), Vec<Arc<MediaArtifact>>> =
            BTreeMap::new();
        let mut by_basename: HashMap<String, Vec<Arc<MediaArtifact>>> = HashMap::new();
        for artifact in &all {
            by_day_kind
                .entry((artifact.chat_day(), artifact.tokens.kind))
                .or_default()
                .push(Arc::clone(artifact));
            if fast_path_visible(root, &artifact.path) {
                by_basename
                    .entry(artifact.basename().to_string())
                    .or_default()
                    .push(Arc::clone(artifact));
            }
        }

        debug!(root = %root, artifacts = all.len(), "Media index built");

        Ok(Self {
            root: root.to_owned(),
            by_day_kind,
            by_basename,
            all,
        })
    }

    /// An index with no artifacts, used when the archive carries no media.
    #[must_use]
    pub fn empty(root: &Utf8Path) -> Self {
        Self {
            root: root.to_owned(),
            by_day_kind: BTreeMap::new(),
            by_basename: HashMap::new(),
            all: Vec::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.all.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Exact basename lookup for the fast path, restricted to the archive
    /// root and recognized first-level media folders. Multiple hits
    /// (duplicate basenames in different folders) resolve to the lexically
    /// smallest path.
    #[must_use]
    pub fn find_exact(&self, basename: &str) -> Option<Arc<MediaArtifact>> {
        self.by_basename
            .get(basename)
            .and_then(|v| v.first())
            .cloned()
    }

    /// Candidate set for a message: artifacts of a compatible kind on the
    /// message's chat day, extended by artifacts within the drift window.
    #[must_use]
    pub fn candidates(
        &self,
        ts: NaiveDateTime,
        kinds: &[ArtifactKind],
        drift_hours: i64,
    ) -> Vec<Arc<MediaArtifact>> {
        let day = ts.date();
        let mut out: Vec<Arc<MediaArtifact>> = Vec::new();

        for kind in kinds {
            if let Some(bucket) = self.by_day_kind.get(&(day, *kind)) {
                out.extend(bucket.iter().cloned());
            }
        }

        let drift_secs = drift_hours * 3600;
        for artifact in &self.all {
            if !kinds.contains(&artifact.tokens.kind) {
                continue;
            }
            let delta = (artifact.mtime_naive() - ts).num_seconds().abs();
            if delta <= drift_secs && !out.iter().any(|a| a.path == artifact.path) {
                out.push(Arc::clone(artifact));
            }
        }

        out.sort_by(|a, b| a.path.cmp(&b.path));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names_are_recognized() {
        assert!(is_canonical_archive_name("PTT-20250708-WA0028.opus"));
        assert!(is_canonical_archive_name("IMG-20250708-WA0012(1).jpg"));
        assert!(!is_canonical_archive_name("holiday-photo.jpg"));
        assert!(!is_canonical_archive_name("IMG-2025-WA0012.jpg"));
    }

    #[test]
    fn tokens_parse_prefix_date_and_sequence() {
        let t = parse_file_tokens("PTT-20250708-WA0028.opus");
        assert_eq!(t.kind, ArtifactKind::Voice);
        assert_eq!(t.date_token.as_deref(), Some("20250708"));
        assert_eq!(t.seq, Some(28));
        assert!(!t.copy_suffix);
        assert_eq!(t.stem, "PTT-20250708-WA0028");
    }

    #[test]
    fn copy_suffix_is_detected_and_stripped() {
        let t = parse_file_tokens("IMG-20250708-WA0012(1).jpg");
        assert!(t.copy_suffix);
        assert_eq!(t.stem, "IMG-20250708-WA0012");
        assert_eq!(t.seq, Some(12));
    }

    #[test]
    fn kind_falls_back_to_extension() {
        assert_eq!(parse_file_tokens("voicenote.opus").kind, ArtifactKind::Voice);
        assert_eq!(parse_file_tokens("scan.pdf").kind, ArtifactKind::Document);
        assert_eq!(parse_file_tokens("mystery.bin").kind, ArtifactKind::Other);
    }

    #[test]
    fn compatible_kinds_for_message_kinds() {
        assert_eq!(ArtifactKind::compatible_with(Kind::Voice), &[ArtifactKind::Voice]);
        assert!(ArtifactKind::compatible_with(Kind::Text).is_empty());
        assert_eq!(ArtifactKind::compatible_with(Kind::Unknown).len(), 5);
    }

    #[test]
    fn scan_indexes_and_finds_exact_basenames() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let media = root.join("Media");
        fs::create_dir_all(media.as_std_path()).unwrap();
        fs::write(media.join("IMG-20250708-WA0001.jpg").as_std_path(), b"a").unwrap();
        fs::write(media.join("notes.txt").as_std_path(), b"b").unwrap();
        fs::write(media.join("skipme.xyz").as_std_path(), b"c").unwrap();

        let index = MediaIndex::scan(&root, &ResolverConfig::default()).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.find_exact("IMG-20250708-WA0001.jpg").is_some());
        assert!(index.find_exact("skipme.xyz").is_none());
    }

    #[test]
    fn fast_path_index_covers_root_and_recognized_folders_only() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        fs::write(root.join("IMG-20250708-WA0002.jpg").as_std_path(), b"a").unwrap();
        let images = root.join("WhatsApp Images").join("Sent");
        fs::create_dir_all(images.as_std_path()).unwrap();
        fs::write(images.join("IMG-20250708-WA0003.jpg").as_std_path(), b"b").unwrap();
        let deep = root.join("unrelated").join("junk");
        fs::create_dir_all(deep.as_std_path()).unwrap();
        fs::write(deep.join("IMG-20250708-WA0001.jpg").as_std_path(), b"c").unwrap();

        let index = MediaIndex::scan(&root, &ResolverConfig::default()).unwrap();

        // Everything is indexed for the scored ladder.
        assert_eq!(index.len(), 3);
        // Only root-level and recognized-folder files answer exact lookups.
        assert!(index.find_exact("IMG-20250708-WA0002.jpg").is_some());
        assert!(index.find_exact("IMG-20250708-WA0003.jpg").is_some());
        assert!(index.find_exact("IMG-20250708-WA0001.jpg").is_none());
    }

    #[test]
    fn missing_root_is_an_error() {
        let err = MediaIndex::scan(Utf8Path::new("/nonexistent/archive"), &ResolverConfig::default());
        assert!(matches!(err, Err(MediaError::RootMissing { .. })));
    }
}
