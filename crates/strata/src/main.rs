//! Strata Daemon - keeps a memory store consolidated in the background

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use strata::config::Config;
use strata::error::Result;
use strata::{MaintenanceHandle, MemorySystem, storage};

/// Strata - tiered memory engine with background consolidation
#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "A tiered memory engine that consolidates, fuses and forgets on its own")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Load the store and run the consolidation loop (default command)
    #[command(name = "serve")]
    Serve,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => serve(cli.config).await,
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,strata=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    tracing::info!("Starting Strata daemon");

    let config = Config::load(config_path.as_deref())?;
    tracing::debug!("Config loaded: {:?}", config);

    tracing::info!("Initializing storage at: {}", config.storage.data_dir.display());
    let store = storage::open(&config.storage).await?;
    let system = Arc::new(MemorySystem::open(&config, store).await?);

    let status = system.get_system_status().await;
    tracing::info!(
        "Holding {} nodes ({:.0}% of capacity)",
        status.metrics.total_nodes,
        status.metrics.load_factor * 100.0
    );

    let maintenance = MaintenanceHandle::start(system.clone());

    shutdown_signal().await?;

    if let Some(handle) = maintenance {
        handle.stop().await;
    }

    tracing::info!("Strata daemon stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            },
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            },
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    }

    Ok(())
}
