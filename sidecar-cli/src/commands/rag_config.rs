//! Retrieval server config file commands

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use sidecar_core::ServicesConfig;
use tokio_util::sync::CancellationToken;

use super::build_host;

/// Arguments for the rag-config command
#[derive(Debug, Args)]
pub struct RagConfigArgs {
    #[command(subcommand)]
    pub command: RagConfigCommand,
}

/// rag-config subcommands
#[derive(Debug, Subcommand)]
pub enum RagConfigCommand {
    /// Print the current config file
    Show,
    /// Replace the config file with the contents of FILE
    Set {
        /// File holding the new config
        file: PathBuf,
    },
}

/// Run the rag-config command
pub async fn run(args: RagConfigArgs, config: ServicesConfig) -> Result<()> {
    let host = build_host(config, &CancellationToken::new())?;

    match args.command {
        RagConfigCommand::Show => {
            let content = host
                .get_retrieval_config()
                .await
                .context("Failed to read retrieval server config")?;
            print!("{content}");
        }
        RagConfigCommand::Set { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            host.save_retrieval_config(content)
                .await
                .context("Failed to save retrieval server config")?;
            println!("Retrieval server config updated");
        }
    }
    Ok(())
}
