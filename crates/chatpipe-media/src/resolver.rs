//! The media resolver: fast path, candidate ladder, decisive-margin
//! selection.
//!
//! Resolution never guesses. A candidate is assigned only when its total
//! clears the acceptance threshold and leads the runner-up by the decisive
//! margin; everything else is recorded as unresolved or ambiguous and
//! flows into the exceptions log.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use chatpipe_config::ResolverConfig;
use chatpipe_message::{
    Disambiguation, DisambiguationCandidate, Message, Status, StatusReason,
};

use crate::exceptions::ExceptionRow;
use crate::index::{ArtifactKind, MediaIndex, is_canonical_archive_name};
use crate::score::{HintContext, cmp_ranked, fold_token, score_candidate};

static FILENAME_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9][\w\-().]*\.[A-Za-z0-9]{1,5}").expect("filename token pattern compiles")
});

static SEQ_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"WA(\d{3,6})").expect("sequence token pattern compiles"));

/// How many candidates are recorded per exception row and disambiguation
/// blob.
const TOP_K: usize = 3;

/// Counters and exception rows produced by a resolution pass.
#[derive(Debug, Default)]
pub struct ResolverReport {
    pub resolved: usize,
    pub unresolved: usize,
    pub ambiguous: usize,
    pub exceptions: Vec<ExceptionRow>,
}

/// Binds media-expecting records to archive files.
pub struct Resolver<'a> {
    index: &'a MediaIndex,
    cfg: &'a ResolverConfig,
    priority: Vec<ArtifactKind>,
}

enum Outcome {
    Resolved,
    Unresolved,
    Ambiguous,
    NotApplicable,
}

impl<'a> Resolver<'a> {
    #[must_use]
    pub fn new(index: &'a MediaIndex, cfg: &'a ResolverConfig) -> Self {
        let priority: Vec<ArtifactKind> = cfg
            .ext_priority
            .iter()
            .filter_map(|name| ArtifactKind::from_config_name(name))
            .collect();
        Self {
            index,
            cfg,
            priority,
        }
    }

    /// Resolve every applicable record in place.
    ///
    /// Re-running over the resolver's own output is a fixed point: records
    /// with a bound `media_filename` are skipped, and the pure ladder
    /// reproduces identical outcomes for the rest.
    pub fn resolve_all(&self, messages: &mut [Message]) -> ResolverReport {
        let mut report = ResolverReport::default();

        for i in 0..messages.len() {
            let outcome = self.resolve_one(messages, i, &mut report.exceptions);
            match outcome {
                Outcome::Resolved => report.resolved += 1,
                Outcome::Unresolved => report.unresolved += 1,
                Outcome::Ambiguous => report.ambiguous += 1,
                Outcome::NotApplicable => {}
            }
        }

        debug!(
            resolved = report.resolved,
            unresolved = report.unresolved,
            ambiguous = report.ambiguous,
            "Media resolution pass complete"
        );
        report
    }

    fn resolve_one(
        &self,
        messages: &mut [Message],
        i: usize,
        exceptions: &mut Vec<ExceptionRow>,
    ) -> Outcome {
        {
            let msg = &messages[i];
            if !msg.kind.expects_media()
                || msg.status == Status::Skipped
                || msg.media_filename.is_some()
            {
                return Outcome::NotApplicable;
            }
        }

        // Exact-filename fast path: canonical export name found in the
        // archive root or a recognized media subfolder. Never consults the
        // ladder, never emits exceptions.
        if let Some(hint) = messages[i].media_hint.clone() {
            if is_canonical_archive_name(&hint) {
                if let Some(artifact) = self.index.find_exact(&hint) {
                    let msg = &mut messages[i];
                    msg.media_filename = Some(artifact.path.clone());
                    msg.status_reason = None;
                    if let Some(hash) = artifact.content_hash() {
                        msg.derived.media_sha256 = Some(hash.to_string());
                    }
                    return Outcome::Resolved;
                }
            }
        }

        let ctx = self.hint_context(messages, i);
        let msg_ts = messages[i].ts;
        let kinds = ArtifactKind::compatible_with(messages[i].kind);
        let candidates = self
            .index
            .candidates(msg_ts, kinds, self.cfg.clock_drift_hours);

        let mut ranked: Vec<_> = candidates
            .into_iter()
            .map(|artifact| {
                let score = score_candidate(
                    &ctx,
                    &self.priority,
                    &self.cfg.weights,
                    msg_ts,
                    &artifact,
                );
                (artifact, score)
            })
            .collect();
        ranked.sort_by(cmp_ranked);

        let top_k: Vec<(String, f64)> = ranked
            .iter()
            .take(TOP_K)
            .map(|(a, s)| (a.path.to_string(), s.total))
            .collect();

        let accepted = ranked
            .first()
            .is_some_and(|(_, s)| s.total >= self.cfg.min_score);

        if !accepted {
            let msg = &mut messages[i];
            msg.status_reason = Some(StatusReason::UnresolvedMedia);
            msg.media_filename = None;
            exceptions.push(ExceptionRow::new(msg, "unresolved_media", &top_k, None));
            return Outcome::Unresolved;
        }

        let top_total = ranked[0].1.total;
        let decisive = ranked
            .get(1)
            .is_none_or(|(_, s)| top_total - s.total >= self.cfg.tau);
        let tie_margin = self.cfg.effective_tie_margin();
        let ties = ranked
            .iter()
            .filter(|(_, s)| s.total >= self.cfg.min_score && top_total - s.total <= tie_margin)
            .count();

        if !decisive && ties >= 2 {
            // The blob records the tie set itself, not the global top-K.
            let blob = Disambiguation {
                candidates: ranked
                    .iter()
                    .filter(|(_, s)| {
                        s.total >= self.cfg.min_score && top_total - s.total <= tie_margin
                    })
                    .take(TOP_K)
                    .map(|(a, s)| DisambiguationCandidate {
                        path: a.path.to_string(),
                        score: s.total,
                    })
                    .collect(),
                top_score: top_total,
                tie_margin,
            };
            let msg = &mut messages[i];
            msg.status_reason = Some(StatusReason::AmbiguousMedia);
            msg.media_filename = None;
            msg.derived.disambiguation = Some(blob.clone());
            exceptions.push(ExceptionRow::new(msg, "ambiguous_media", &top_k, Some(&blob)));
            return Outcome::Ambiguous;
        }

        let (artifact, _) = &ranked[0];
        let msg = &mut messages[i];
        msg.media_filename = Some(artifact.path.clone());
        msg.status_reason = None;
        if let Some(hash) = artifact.content_hash() {
            msg.derived.media_sha256 = Some(hash.to_string());
        }
        Outcome::Resolved
    }

    /// Gather hint tokens from the target message and the ±2 surrounding
    /// records' text and captions. Same-sender evidence is kept apart so
    /// the scorer can prefer it.
    fn hint_context(&self, messages: &[Message], i: usize) -> HintContext {
        let mut ctx = HintContext::default();

        let target_sender = &messages[i].sender;
        ctx.target_seq = messages[i]
            .media_hint
            .as_deref()
            .and_then(|hint| SEQ_TOKEN.captures(hint))
            .and_then(|c| c[1].parse::<u32>().ok());

        let lo = i.saturating_sub(2);
        let hi = (i + 2).min(messages.len().saturating_sub(1));
        for msg in &messages[lo..=hi] {
            let same_sender = &msg.sender == target_sender;
            let mut texts: Vec<&str> = vec![&msg.content_text];
            if let Some(caption) = &msg.caption {
                texts.push(caption);
            }
            if let Some(hint) = &msg.media_hint {
                texts.push(hint);
            }
            for text in texts {
                for m in FILENAME_TOKEN.find_iter(text) {
                    let token = fold_token(m.as_str());
                    if same_sender {
                        ctx.same_sender_filenames.push(token.clone());
                    }
                    ctx.global_filenames.push(token);
                }
                for c in SEQ_TOKEN.captures_iter(text) {
                    if let Ok(seq) = c[1].parse::<u32>() {
                        if same_sender {
                            ctx.same_sender_seqs.push(seq);
                        }
                        ctx.global_seqs.push(seq);
                    }
                }
            }
        }

        ctx
    }
}
