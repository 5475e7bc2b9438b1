mod commands;
mod utils;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stackflow")]
#[command(about = "Converge cluster specifications into cloud infrastructure", long_about = None)]
#[command(version)]
struct Cli {
    /// Operator config file (default: discovered)
    #[arg(short, long, global = true, env = "STACKFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported versions and their resource chains
    Versions,
    /// Print the composed stack template of a cluster
    Render {
        /// Cluster specification (YAML)
        #[arg(long)]
        cluster: PathBuf,
    },
    /// Run one reconciliation pass against an in-memory cloud
    Plan {
        /// Cluster specification (YAML)
        #[arg(long)]
        cluster: PathBuf,
        /// Seed the in-memory cloud from a saved state (JSON)
        #[arg(long)]
        state: Option<PathBuf>,
        /// Write the resulting state (JSON)
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = stackflow_config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Versions => commands::versions::handle(config),
        Commands::Render { cluster } => commands::render::handle(config, &cluster),
        Commands::Plan {
            cluster,
            state,
            save,
        } => commands::plan::handle(config, &cluster, state.as_deref(), save.as_deref()).await,
    }
}
