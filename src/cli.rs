use clap::{Args, Parser, Subcommand, ValueEnum};
use larder_ledger::Status;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "larder", version, about = "Turns inbox captures into recipe notes")]
pub struct Cli {
    /// Config file (TOML, YAML or JSON); defaults to the platform config
    /// directory.
    #[arg(long, global = true, env = "LARDER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Vault root, overriding the configured one.
    #[arg(long, global = true)]
    pub vault: Option<PathBuf>,

    /// More logging; repeat for more.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process everything currently in the inbox, then exit.
    Scan,
    /// Process the inbox, then keep watching it until interrupted.
    Watch,
    /// Show recorded jobs, oldest first.
    Ledger(LedgerArgs),
}

#[derive(Debug, Args)]
pub struct LedgerArgs {
    /// Only entries with this status.
    #[arg(long, value_enum)]
    pub status: Option<StatusFilter>,

    /// Only the most recent N entries.
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusFilter {
    Success,
    Error,
    Skipped,
}
impl From<StatusFilter> for Status {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::Success => Status::Success,
            StatusFilter::Error => Status::Error,
            StatusFilter::Skipped => Status::Skipped,
        }
    }
}
