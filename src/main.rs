mod app;
mod cli;
mod error;
mod watch;

use crate::app::App;
use crate::cli::{Cli, Command, LedgerArgs};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use larder_config::{Config, Overrides};
use larder_inbox::{FileSignal, ScanSummary};
use larder_ledger::{Ledger, LedgerEntry, Status};
use larder_storage::backend::LocalBackend;
use std::process::ExitCode;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const SIGNAL_BUFFER: usize = 64;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = ?err, "{}", *err);
            ExitCode::FAILURE
        },
    }
}

/// `RUST_LOG` wins; otherwise each `-v` raises the default level by one.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "larder=info,warn",
        1 => "larder=debug,larder_inbox=debug,info",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let overrides = Overrides { vault: cli.vault };
    let config = Config::load(cli.config.as_deref(), &overrides).or_raise(|| ErrorKind::Config)?;
    tracing::debug!(vault = %config.vault().display(), inbox = %config.inbox.display(), "Configuration loaded");
    match cli.command {
        Command::Scan => scan(&config).await,
        Command::Watch => watch(&config).await,
        Command::Ledger(args) => ledger(&config, &args).await,
    }
}

async fn scan(config: &Config) -> Result<ExitCode> {
    let app = App::open(config).await?;
    let summary = app.pipeline.scan_all().await;
    print_summary(&summary);
    Ok(if summary.quarantined > 0 || summary.errors > 0 { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

fn print_summary(summary: &ScanSummary) {
    println!(
        "{} found, {} created, {} duplicates, {} quarantined",
        summary.discovered, summary.created, summary.duplicates, summary.quarantined
    );
    if summary.busy + summary.vanished > 0 {
        println!("{} busy, {} already gone", summary.busy, summary.vanished);
    }
    if summary.errors > 0 {
        println!("{} parts of the inbox could not be listed", summary.errors);
    }
}

async fn watch(config: &Config) -> Result<ExitCode> {
    let app = App::open(config).await?;
    let (signals, receiver) = mpsc::channel(SIGNAL_BUFFER);
    let runner = tokio::spawn(app.pipeline.clone().run(receiver));
    // Anything dropped in while we were not running.
    if signals.send(FileSignal::Scan).await.is_err() {
        tracing::warn!("Pipeline stopped before the initial scan");
    }
    let watched = watch::forward(app.backend.clone(), config.settle(), config.scan_interval(), signals).await;
    if let Err(err) = runner.await {
        tracing::error!(error = %err, "Pipeline task panicked");
    }
    watched?;
    Ok(ExitCode::SUCCESS)
}

async fn ledger(config: &Config, args: &LedgerArgs) -> Result<ExitCode> {
    let backend = Arc::new(LocalBackend::new("vault", config.vault()).or_raise(|| ErrorKind::Startup)?);
    let store = app::ledger_store(config, backend);
    let ledger = Ledger::open(store, config.ledger.capacity).await.or_raise(|| ErrorKind::Startup)?;
    for entry in select_entries(ledger.serialize(), args.status.map(Status::from), args.limit) {
        let processed = entry.processed_at.format(&Rfc3339).unwrap_or_default();
        println!("{processed}  {:<7}  {}  {}", entry.status, entry.key, entry.detail.unwrap_or_default());
    }
    Ok(ExitCode::SUCCESS)
}

/// Entries matching `status`, the newest `limit` of them, still oldest first.
fn select_entries(entries: Vec<LedgerEntry>, status: Option<Status>, limit: Option<usize>) -> Vec<LedgerEntry> {
    let mut selected: Vec<LedgerEntry> =
        entries.into_iter().filter(|entry| status.is_none_or(|status| entry.status == status)).collect();
    if let Some(limit) = limit {
        let skip = selected.len().saturating_sub(limit);
        selected.drain(..skip);
    }
    selected
}
