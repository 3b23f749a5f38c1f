use std::path::PathBuf;

use clap::{Parser, Subcommand};
use strata::config::Config;
use strata::{MemorySystem, storage};
use strata_cli::commands::{
    ConsolidateCommand, FuseCommand, MemoryCommand, SearchCommand, StatusCommand,
};
use strata_cli::error::CliResult;
use strata_cli::output::OutputFormat;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "strata-cli")]
#[command(about = "Strata CLI - Management tool for a Strata memory store")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'd', global = true, help = "Path to data directory")]
    pub data_dir: Option<PathBuf>,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Node management commands")]
    Memory(MemoryCommand),

    #[clap(about = "Search every tier")]
    Search(SearchCommand),

    #[clap(about = "Create, discover and validate fusions")]
    Fuse(FuseCommand),

    #[clap(about = "Run a consolidation pass")]
    Consolidate(ConsolidateCommand),

    #[clap(about = "Show load, health and recommended actions")]
    Status(StatusCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = &cli.data_dir {
        config.storage.data_dir = data_dir.clone();
    }
    tracing::debug!("Using data directory {}", config.storage.data_dir.display());

    let store = storage::open(&config.storage).await?;
    let system = MemorySystem::open(&config, store).await?;

    match &cli.command {
        Command::Memory(cmd) => cmd.execute(&system, format).await,
        Command::Search(cmd) => cmd.execute(&system, format).await,
        Command::Fuse(cmd) => cmd.execute(&system, format).await,
        Command::Consolidate(cmd) => cmd.execute(&system, format).await,
        Command::Status(cmd) => cmd.execute(&system, format).await,
    }
}
