//! Pure scoring functions for the candidate ladder.
//!
//! Every function here is a deterministic map from inputs to a score in
//! `[0, 1]`; the resolver combines them with configured weights. Keeping
//! these side-effect free is what makes rankings reproducible across runs
//! and worker counts.

use chrono::NaiveDateTime;
use std::cmp::Ordering;
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;

use chatpipe_config::Weights;

use crate::index::{ArtifactKind, MediaArtifact};

/// Hint tokens gathered from a message and its surrounding context.
#[derive(Debug, Clone, Default)]
pub struct HintContext {
    /// Exact filenames seen in same-sender text (normalized, lowercase).
    pub same_sender_filenames: Vec<String>,
    /// Exact filenames seen anywhere in the context window.
    pub global_filenames: Vec<String>,
    /// `WA`-sequence numbers from same-sender text.
    pub same_sender_seqs: Vec<u32>,
    /// `WA`-sequence numbers from anywhere in the window.
    pub global_seqs: Vec<u32>,
    /// Target sequence inferred from the message's own media hint.
    pub target_seq: Option<u32>,
}

/// NFC-normalize and lowercase a token for hint comparison.
#[must_use]
pub fn fold_token(token: &str) -> String {
    token.nfc().collect::<String>().to_lowercase()
}

/// Per-feature scores and their weighted total for one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub hint: f64,
    pub ext: f64,
    pub seq: f64,
    pub mtime: f64,
    pub total: f64,
}

/// Hint feature: how strongly the surrounding text points at this
/// candidate. Same-sender evidence outranks global evidence.
#[must_use]
pub fn hint_score(ctx: &HintContext, artifact: &MediaArtifact) -> f64 {
    let basename = fold_token(artifact.basename());
    let stem = fold_token(&artifact.tokens.stem);

    let tiered = |same: bool, value: f64| if same { value } else { value * 0.8 };

    if ctx.same_sender_filenames.iter().any(|f| f == &basename) {
        return tiered(true, 1.0);
    }
    if ctx.global_filenames.iter().any(|f| f == &basename) {
        return tiered(false, 1.0);
    }

    if let Some(seq) = artifact.tokens.seq {
        if ctx.same_sender_seqs.contains(&seq) {
            return tiered(true, 0.8);
        }
        if ctx.global_seqs.contains(&seq) {
            return tiered(false, 0.8);
        }
    }

    if !stem.is_empty() {
        if ctx.same_sender_filenames.iter().any(|f| f.contains(&stem)) {
            return tiered(true, 0.5);
        }
        if ctx.global_filenames.iter().any(|f| f.contains(&stem)) {
            return tiered(false, 0.5);
        }
    }

    0.0
}

/// Kind priority feature: rank position in the configured priority list
/// mapped onto `(len - rank) / len`. Unlisted kinds score 0.
#[must_use]
pub fn ext_score(priority: &[ArtifactKind], kind: ArtifactKind) -> f64 {
    let len = priority.len();
    if len == 0 {
        return 0.0;
    }
    match priority.iter().position(|k| *k == kind) {
        Some(rank) => (len - rank) as f64 / len as f64,
        None => 0.0,
    }
}

/// Sequence proximity feature: `1 / (1 + |target - candidate|)`; 0 when
/// either side has no sequence number.
#[must_use]
pub fn seq_score(target: Option<u32>, candidate: Option<u32>) -> f64 {
    match (target, candidate) {
        (Some(t), Some(c)) => {
            let delta = (i64::from(t) - i64::from(c)).unsigned_abs() as f64;
            1.0 / (1.0 + delta)
        }
        _ => 0.0,
    }
}

/// Modification-time proximity feature, monotonically decreasing in the
/// absolute hour distance: `1 / (1 + hours)`.
#[must_use]
pub fn mtime_score(message_ts: NaiveDateTime, artifact_mtime: NaiveDateTime) -> f64 {
    let hours = (artifact_mtime - message_ts).num_seconds().abs() as f64 / 3600.0;
    1.0 / (1.0 + hours)
}

/// Compute the full breakdown for one candidate.
#[must_use]
pub fn score_candidate(
    ctx: &HintContext,
    priority: &[ArtifactKind],
    weights: &Weights,
    message_ts: NaiveDateTime,
    artifact: &MediaArtifact,
) -> ScoreBreakdown {
    let hint = hint_score(ctx, artifact);
    let ext = ext_score(priority, artifact.tokens.kind);
    let seq = seq_score(ctx.target_seq, artifact.tokens.seq);
    let mtime = mtime_score(message_ts, artifact.mtime_naive());
    let total = weights.hint * hint + weights.ext * ext + weights.seq * seq + weights.mtime * mtime;
    ScoreBreakdown {
        hint,
        ext,
        seq,
        mtime,
        total,
    }
}

/// Final ranking order: total descending, then size ascending, then
/// lexical path ascending. Total ties are broken without ever comparing
/// float identity beyond `total_cmp`.
#[must_use]
pub fn cmp_ranked(
    a: &(Arc<MediaArtifact>, ScoreBreakdown),
    b: &(Arc<MediaArtifact>, ScoreBreakdown),
) -> Ordering {
    b.1.total
        .total_cmp(&a.1.total)
        .then_with(|| a.0.size.cmp(&b.0.size))
        .then_with(|| a.0.path.cmp(&b.0.path))
}
