use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;

use config::ConfigLoader;

#[derive(Parser)]
#[command(name = "sidecar", about = "Download, run and inspect auxiliary services")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: $SIDECAR_CONFIG, .sidecar/config.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start helper binaries and auto-start services, then wait for Ctrl-C
    Run(commands::run::RunArgs),
    /// Download and install a service
    Download(commands::download::DownloadArgs),
    /// Start a service and keep it running until Ctrl-C
    Start(commands::start::StartArgs),
    /// Show service status
    Status(commands::status::StatusArgs),
    /// Show or replace the retrieval server config file
    RagConfig(commands::rag_config::RagConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ConfigLoader::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => commands::run::run(args, config).await,
        Commands::Download(args) => commands::download::run(args, config).await,
        Commands::Start(args) => commands::start::run(args, config).await,
        Commands::Status(args) => commands::status::run(args, config).await,
        Commands::RagConfig(args) => commands::rag_config::run(args, config).await,
    }
}
