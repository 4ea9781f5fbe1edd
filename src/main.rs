//! gmconsole - operator client for a game-server admin backend

use anyhow::Result;
use clap::{Parser, Subcommand};
use gmconsole::{client, config::Config};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gmconsole")]
#[command(about = "Console, GM tools and table export for a game-server admin backend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send commands to game servers through the debug console
    Console {
        /// Target to focus once the server list arrives
        #[arg(short, long)]
        target: Option<String>,
    },
    /// Browse and invoke GM commands
    Gm,
    /// Edit export settings, run table exports and look up sheets
    Export,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Logs go to stderr; stdout carries channel output
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.general.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Console { target } => {
            tracing::info!("Opening console");
            client::run_console(&config, target).await
        }
        Commands::Gm => {
            tracing::info!("Opening GM tools");
            client::run_gm(&config).await
        }
        Commands::Export => {
            tracing::info!("Opening table export");
            client::run_export(&config).await
        }
    }
}
