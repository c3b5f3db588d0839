//! Download command

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use sidecar_core::{DownloadStage, ProgressEvent, ServiceEventKind, ServiceKind, ServicesConfig};
use tokio_util::sync::CancellationToken;

use super::{ServiceArg, build_host, next_event};

/// Arguments for the download command
#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Service to download
    #[arg(value_enum)]
    pub service: ServiceArg,
}

/// Run the download command
pub async fn run(args: DownloadArgs, config: ServicesConfig) -> Result<()> {
    let kind = ServiceKind::from(args.service);
    let host = build_host(config, &CancellationToken::new())?;
    let mut events = host.subscribe();

    let printer = tokio::spawn(async move {
        while let Some(event) = next_event(&mut events).await {
            if event.service != kind {
                continue;
            }
            match event.kind {
                ServiceEventKind::DownloadProgress { progress } => print_progress(&progress),
                ServiceEventKind::DownloadComplete | ServiceEventKind::DownloadFailed { .. } => {
                    eprintln!();
                    break;
                }
                _ => {}
            }
        }
    });

    let result = host.download(kind).await;
    let _ = printer.await;

    let binary = result.with_context(|| format!("Failed to download {kind}"))?;
    println!("Installed {kind} at {}", binary.display());
    Ok(())
}

fn print_progress(progress: &ProgressEvent) {
    eprint!("\r\x1b[2K{}", progress_line(progress));
    let _ = std::io::stderr().flush();
}

/// One-line rendering of a progress event
pub fn progress_line(progress: &ProgressEvent) -> String {
    match (progress.stage, progress.total) {
        (DownloadStage::Downloading, Some(total)) => format!(
            "{} {:>5.1}% ({} / {})",
            progress.status,
            progress.percent,
            format_bytes(progress.downloaded),
            format_bytes(total)
        ),
        (DownloadStage::Downloading, None) => {
            format!("{} {}", progress.status, format_bytes(progress.downloaded))
        }
        _ => progress.status.clone(),
    }
}

fn format_bytes(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    if bytes as f64 >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB)
    } else {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        download: DownloadArgs,
    }

    #[test]
    fn parses_service_names() {
        let cli = TestCli::parse_from(["test", "vector-db"]);
        assert_eq!(cli.download.service, ServiceArg::VectorDb);

        let cli = TestCli::parse_from(["test", "retrieval"]);
        assert_eq!(cli.download.service, ServiceArg::Retrieval);
    }

    #[test]
    fn rejects_unknown_service() {
        assert!(TestCli::try_parse_from(["test", "postgres"]).is_err());
    }

    #[test]
    fn progress_line_with_known_total() {
        let event = ProgressEvent::new(DownloadStage::Downloading, 512 * 1024, Some(1024 * 1024));
        assert_eq!(progress_line(&event), "Downloading...  50.0% (512.0 KiB / 1.0 MiB)");
    }

    #[test]
    fn progress_line_without_total() {
        let event = ProgressEvent::new(DownloadStage::Downloading, 2 * 1024 * 1024, None);
        assert_eq!(progress_line(&event), "Downloading... 2.0 MiB");

        let event = ProgressEvent::new(DownloadStage::Extracting, 10, None);
        assert_eq!(progress_line(&event), "Extracting...");
    }
}
