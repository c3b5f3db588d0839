//! Subcommand implementations

pub mod download;
pub mod rag_config;
pub mod run;
pub mod start;
pub mod status;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ValueEnum;
use sidecar_core::{ServiceEvent, ServiceHost, ServiceKind, ServicesConfig, StaticBundle};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Service selector accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ServiceArg {
    /// Retrieval server (go-rag)
    Retrieval,
    /// Vector database (qdrant)
    VectorDb,
}

impl From<ServiceArg> for ServiceKind {
    fn from(arg: ServiceArg) -> Self {
        match arg {
            ServiceArg::Retrieval => ServiceKind::Retrieval,
            ServiceArg::VectorDb => ServiceKind::VectorDb,
        }
    }
}

/// Build a host whose cancellable processes die with `cancel`.
///
/// This build ships no bundled helper binaries.
pub fn build_host(config: ServicesConfig, cancel: &CancellationToken) -> Result<ServiceHost> {
    let host = ServiceHost::new(config, Arc::new(StaticBundle::new()))
        .context("Invalid service configuration")?;
    Ok(host.with_cancellation(cancel.clone()))
}

/// Next event from the host, skipping over lag; `None` once the host is gone.
pub async fn next_event(events: &mut broadcast::Receiver<ServiceEvent>) -> Option<ServiceEvent> {
    loop {
        match events.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                debug!("Event listener lagged by {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

/// Wait for Ctrl-C.
pub async fn wait_for_ctrl_c() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    println!();
    Ok(())
}
