//! Run command: the long-lived host

use anyhow::Result;
use clap::Args;
use sidecar_core::{ServiceEventKind, ServiceKind, ServicesConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{ServiceArg, build_host, next_event, wait_for_ctrl_c};

/// Arguments for the run command
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Also start this service after startup (in addition to auto-start)
    #[arg(long, value_enum)]
    pub start: Option<ServiceArg>,
}

/// Start helpers and auto-start services, wait for Ctrl-C, then shut down
pub async fn run(args: RunArgs, config: ServicesConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    let host = build_host(config, &cancel)?;

    let mut events = host.subscribe();
    let logger = tokio::spawn(async move {
        while let Some(event) = next_event(&mut events).await {
            match event.kind {
                ServiceEventKind::StartComplete { pid } => {
                    info!(service = %event.service, pid = pid, "Service started");
                }
                ServiceEventKind::StartFailed { error } | ServiceEventKind::StopFailed { error } => {
                    warn!(service = %event.service, error = %error, "Service operation failed");
                }
                _ => {}
            }
        }
    });

    host.startup().await;

    if let Some(service) = args.start {
        let kind = ServiceKind::from(service);
        if let Err(e) = host.start(kind).await {
            warn!(service = %kind, error = %e, "Failed to start requested service");
        }
    }

    for kind in ServiceKind::ALL {
        let status = host.status(kind).await;
        println!(
            "{kind}: {}",
            if status.running { "running" } else { "not running" }
        );
    }
    println!("Press Ctrl-C to stop");

    wait_for_ctrl_c().await?;

    host.shutdown().await;
    cancel.cancel();
    logger.abort();
    Ok(())
}
