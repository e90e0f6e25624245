//! history-sync CLI
//!
//! Pulls point history from the provider into a target table file, with pause
//! (Ctrl-C) and resume support.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::{info, warn};

use history_sync::{
    application::settings::SyncSettings,
    domain::synchronization::checkpoint::CheckpointStore,
    infrastructure::{table::JsonTableStore, RunOutcome, SyncContext, SyncOrchestrator},
};

#[derive(Parser, Debug)]
#[command(name = "history-sync", version, about, long_about = None)]
struct Cli {
    /// JSON settings file. Defaults apply when omitted.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start a fresh run, discarding any saved progress.
    Run {
        /// Table file holding the point identifiers.
        #[arg(long)]
        source: PathBuf,
        /// Table file receiving the samples.
        #[arg(long)]
        target: PathBuf,
    },
    /// Continue from the saved progress. The target may differ from the first run.
    Resume {
        #[arg(long)]
        source: PathBuf,
        #[arg(long)]
        target: PathBuf,
    },
    /// Discard saved progress.
    Stop,
    /// Print saved progress.
    Status,
    /// Check that the history API is reachable with the configured credentials.
    Probe,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => SyncSettings::load(path).await?,
        None => SyncSettings::default(),
    };

    match cli.command {
        Command::Run { source, target } => run(&settings, source, target, false).await,
        Command::Resume { source, target } => run(&settings, source, target, true).await,
        Command::Stop => {
            settings.checkpoint_store().clear().await?;
            info!("Saved progress cleared");
            Ok(())
        }
        Command::Status => {
            match settings.checkpoint_store().load().await? {
                Some(progress) => println!("{}", serde_json::to_string_pretty(&progress)?),
                None => println!("No saved progress"),
            }
            Ok(())
        }
        Command::Probe => {
            let fetcher = settings.fetcher()?;
            match fetcher.probe().await {
                Ok(()) => {
                    println!("Connected to {}", fetcher.endpoint());
                    Ok(())
                }
                Err(e) => Err(e).with_context(|| format!("probing {}", fetcher.endpoint())),
            }
        }
    }
}

async fn run(settings: &SyncSettings, source: PathBuf, target: PathBuf, resume: bool) -> anyhow::Result<()> {
    let config = settings.to_config()?;
    let source = JsonTableStore::open(&source)
        .await
        .with_context(|| format!("opening source table {}", source.display()))?;
    let target = JsonTableStore::open(&target)
        .await
        .with_context(|| format!("opening target table {}", target.display()))?;

    let mut orchestrator = SyncOrchestrator::new(SyncContext {
        source: Arc::new(source),
        target: Arc::new(target),
        fetcher: Arc::new(settings.fetcher()?),
        checkpoints: Arc::new(settings.checkpoint_store()),
        config,
    });

    let control = orchestrator.control();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, pausing after the current record");
            control.pause();
        }
    });

    let outcome = if resume {
        orchestrator.resume(None).await?
    } else {
        orchestrator.start().await?
    };

    match outcome {
        RunOutcome::Completed { success, fail } => {
            println!("Done. Success: {}, failed: {}", success, fail)
        }
        RunOutcome::Paused => {
            let progress = orchestrator.progress();
            println!(
                "Paused at {}/{}. Run `history-sync resume` to continue.",
                progress.current_index, progress.total
            )
        }
        RunOutcome::Stopped => println!("Stopped."),
        RunOutcome::AlreadyRunning => println!("A run is already in progress."),
    }
    Ok(())
}
