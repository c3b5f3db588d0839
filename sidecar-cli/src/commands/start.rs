//! Start command

use anyhow::{Context, Result};
use clap::Args;
use sidecar_core::{ServiceKind, ServicesConfig, StopOutcome};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{ServiceArg, build_host, wait_for_ctrl_c};

/// Arguments for the start command
#[derive(Debug, Args)]
pub struct StartArgs {
    /// Service to start
    #[arg(value_enum)]
    pub service: ServiceArg,
}

/// Start a service, wait for it to be healthy, then run until Ctrl-C
pub async fn run(args: StartArgs, config: ServicesConfig) -> Result<()> {
    let kind = ServiceKind::from(args.service);
    let cancel = CancellationToken::new();
    let host = build_host(config, &cancel)?;

    let pid = match host.start(kind).await {
        Ok(pid) => pid,
        Err(e) => {
            host.shutdown().await;
            return Err(e).with_context(|| format!("Failed to start {kind}"));
        }
    };
    println!("{kind} is running (pid {pid}), press Ctrl-C to stop");

    wait_for_ctrl_c().await?;

    if let Ok(StopOutcome::Orphaned { pid }) = host.stop(kind).await {
        warn!(pid = pid, "{} did not exit in time and may still be running", kind);
    }
    host.shutdown().await;
    cancel.cancel();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        start: StartArgs,
    }

    #[test]
    fn requires_a_service() {
        assert!(TestCli::try_parse_from(["test"]).is_err());
        let cli = TestCli::parse_from(["test", "retrieval"]);
        assert_eq!(cli.start.service, ServiceArg::Retrieval);
    }
}
