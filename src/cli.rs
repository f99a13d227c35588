//! Command-line interface definitions.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Deterministic, resumable chat-archive pipeline.
#[derive(Debug, Parser)]
#[command(name = "chatpipe", version, about)]
pub struct Cli {
    /// Verbose logging (debug level).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Execute the pipeline over an exported chat archive.
    Run(RunArgs),
    /// Print the manifest summary of an existing run directory.
    Status(StatusArgs),
}

#[derive(Debug, clap::Args)]
pub struct RunArgs {
    /// Archive root containing the transcript and media tree.
    #[arg(long)]
    pub root: Utf8PathBuf,

    /// Chat transcript file; defaults to the only `.txt` at the root.
    #[arg(long)]
    pub chat: Option<Utf8PathBuf>,

    /// Run directory; defaults to `<root>/run`.
    #[arg(long)]
    pub run_dir: Option<Utf8PathBuf>,

    /// Configuration file; defaults to upward discovery of
    /// `chatpipe.toml`.
    #[arg(long)]
    pub config: Option<Utf8PathBuf>,

    /// ASR provider override (`openai`, `whisper-cli`, `stub`).
    #[arg(long)]
    pub provider: Option<String>,

    /// Bounded worker count for voice transcription.
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Re-run every step even when prior outputs exist.
    #[arg(long)]
    pub overwrite: bool,

    /// Disable step- and item-level resume.
    #[arg(long)]
    pub no_resume: bool,
}

#[derive(Debug, clap::Args)]
pub struct StatusArgs {
    /// Run directory to inspect.
    #[arg(long)]
    pub run_dir: Utf8PathBuf,

    /// Emit the raw manifest JSON instead of the summary.
    #[arg(long)]
    pub json: bool,
}
