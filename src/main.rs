use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use tracing::error;

use chatpipe::cli::{Cli, Command, RunArgs, StatusArgs};
use chatpipe::exit_codes;
use chatpipe_config::{Config, discover};
use chatpipe_manifest::read_manifest;
use chatpipe_orchestrator::{Orchestrator, OrchestratorError, RunOptions};

fn main() {
    let cli = Cli::parse();
    if let Err(e) = chatpipe_utils::logging::init_tracing(cli.verbose) {
        eprintln!("warning: failed to initialize logging: {e}");
    }

    let code = match cli.command {
        Command::Run(args) => run_command(args),
        Command::Status(args) => status_command(&args),
    };
    std::process::exit(code);
}

fn run_command(args: RunArgs) -> i32 {
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(message) => {
            error!("{message}");
            return exit_codes::CONFIG_ERROR;
        }
    };

    let chat_file = match args.chat.clone().map_or_else(
        || default_chat_file(&args.root),
        Ok,
    ) {
        Ok(path) => path,
        Err(message) => {
            error!("{message}");
            return exit_codes::CONFIG_ERROR;
        }
    };

    let orchestrator = match Orchestrator::new(RunOptions {
        root: args.root.clone(),
        chat_file,
        config,
    }) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("{e}");
            return exit_codes::CONFIG_ERROR;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to start async runtime: {e}");
            return exit_codes::STEP_FAILED;
        }
    };

    runtime.block_on(async {
        let cancel = orchestrator.cancel_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                error!("interrupt received, cancelling at the next suspension point");
                cancel.cancel();
            }
        });

        match orchestrator.run().await {
            Ok(report) => {
                println!(
                    "run {} complete: {} messages, {} voice ({} ok, {} partial, {} failed)",
                    report.manifest.run_id,
                    report.metrics.messages_total,
                    report.metrics.voice_total,
                    report.metrics.voice_ok,
                    report.metrics.voice_partial,
                    report.metrics.voice_failed
                );
                exit_codes::SUCCESS
            }
            Err(e @ (OrchestratorError::Config(_) | OrchestratorError::LockHeld { .. })) => {
                error!("{e}");
                exit_codes::CONFIG_ERROR
            }
            Err(e @ OrchestratorError::Cancelled { .. }) => {
                error!("{e}");
                exit_codes::CANCELLED
            }
            Err(e) => {
                error!("{e}");
                exit_codes::STEP_FAILED
            }
        }
    })
}

fn load_config(args: &RunArgs) -> Result<Config, String> {
    let mut config = match &args.config {
        Some(path) => {
            let content = std::fs::read_to_string(path.as_std_path())
                .map_err(|e| format!("cannot read config file {path}: {e}"))?;
            let mut config =
                Config::from_toml_str(&content).map_err(|e| e.to_string())?;
            config.freeze_env();
            config
        }
        None => discover(&args.root).map_err(|e| e.to_string())?,
    };

    // CLI overrides take precedence over the file.
    if let Some(run_dir) = &args.run_dir {
        config.run.run_dir = Some(run_dir.clone());
    }
    if let Some(provider) = &args.provider {
        config.asr.provider = provider.clone();
        config.freeze_env();
    }
    if let Some(workers) = args.max_workers {
        config.run.max_workers_audio = workers;
    }
    if args.overwrite {
        config.run.overwrite = true;
    }
    if args.no_resume {
        config.run.resume = false;
    }

    Ok(config)
}

/// When `--chat` is omitted, the archive must contain exactly one
/// top-level `.txt` transcript.
fn default_chat_file(root: &Utf8Path) -> Result<Utf8PathBuf, String> {
    let entries = std::fs::read_dir(root.as_std_path())
        .map_err(|e| format!("cannot read archive root {root}: {e}"))?;
    let mut candidates: Vec<Utf8PathBuf> = entries
        .filter_map(Result::ok)
        .filter_map(|e| Utf8PathBuf::from_path_buf(e.path()).ok())
        .filter(|p| p.extension() == Some("txt") && p.is_file())
        .collect();
    candidates.sort();
    match candidates.len() {
        0 => Err(format!("no .txt transcript found under {root}; pass --chat")),
        1 => Ok(candidates.remove(0)),
        _ => Err(format!(
            "multiple .txt files under {root}; pass --chat to pick one"
        )),
    }
}

fn status_command(args: &StatusArgs) -> i32 {
    let manifest_path = args.run_dir.join("run_manifest.json");
    let manifest = match read_manifest(&manifest_path) {
        Ok(Some(manifest)) => manifest,
        Ok(None) => {
            error!("no manifest found at {manifest_path}");
            return exit_codes::CONFIG_ERROR;
        }
        Err(e) => {
            error!("{e}");
            return exit_codes::CONFIG_ERROR;
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&manifest) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!("failed to serialize manifest: {e}");
                return exit_codes::STEP_FAILED;
            }
        }
        return exit_codes::SUCCESS;
    }

    println!("run:   {}", manifest.run_id);
    println!("chat:  {}", manifest.chat_file);
    for (name, state) in &manifest.steps {
        println!(
            "{name:<10} {:<8} {}/{} ({} errors)",
            format!("{:?}", state.status).to_lowercase(),
            state.done,
            state.total,
            state.errors
        );
    }
    println!(
        "summary: {} messages, {} voice",
        manifest.summary.messages_total, manifest.summary.voice_total
    );
    if let Some(error) = &manifest.summary.error {
        println!("error: {error}");
        return exit_codes::STEP_FAILED;
    }
    exit_codes::SUCCESS
}
