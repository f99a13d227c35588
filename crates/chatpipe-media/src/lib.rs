//! Media resolution for chatpipe.
//!
//! Binds media-expecting message records to concrete archive files.
//! An exact-filename fast path handles canonical export names; everything
//! else goes through a scored candidate ladder with decisive-margin
//! selection. Scoring is pure, orderings are fully deterministic, and
//! no outcome here ever aborts a run.

mod error;
mod exceptions;
mod index;
mod resolver;
mod score;

pub use error::MediaError;
pub use exceptions::{ExceptionRow, write_exceptions};
pub use index::{ArtifactKind, FileTokens, MediaArtifact, MediaIndex, parse_file_tokens};
pub use resolver::{Resolver, ResolverReport};
pub use score::{ScoreBreakdown, cmp_ranked, ext_score, mtime_score, seq_score};
