//! Status command

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use serde::Serialize;
use sidecar_core::{LifecycleState, ServiceKind, ServicesConfig, StatusSnapshot};
use tokio_util::sync::CancellationToken;

use super::build_host;

/// Arguments for the status command
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct ServiceStatus {
    service: ServiceKind,
    enabled: bool,
    state: Option<LifecycleState>,
    #[serde(flatten)]
    snapshot: StatusSnapshot,
}

/// Run the status command
pub async fn run(args: StatusArgs, config: ServicesConfig) -> Result<()> {
    let host = build_host(config, &CancellationToken::new())?;

    let mut rows = Vec::new();
    for service in ServiceKind::ALL {
        rows.push(ServiceStatus {
            service,
            enabled: host.is_enabled(service),
            state: host.lifecycle_state(service).await,
            snapshot: host.status(service).await,
        });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("{}", render_table(&rows));
    }
    Ok(())
}

fn yes_no(value: bool) -> Cell {
    if value {
        Cell::new("yes").fg(Color::Green)
    } else {
        Cell::new("no")
    }
}

fn render_table(rows: &[ServiceStatus]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Service").fg(Color::Cyan),
        Cell::new("Enabled").fg(Color::Cyan),
        Cell::new("Installed").fg(Color::Cyan),
        Cell::new("Running").fg(Color::Cyan),
        Cell::new("Healthy").fg(Color::Cyan),
    ]);

    for row in rows {
        table.add_row(vec![
            Cell::new(row.service),
            yes_no(row.enabled),
            yes_no(row.snapshot.installed),
            yes_no(row.snapshot.running),
            yes_no(row.snapshot.healthy),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        status: StatusArgs,
    }

    #[test]
    fn json_flag() {
        assert!(!TestCli::parse_from(["test"]).status.json);
        assert!(TestCli::parse_from(["test", "--json"]).status.json);
    }

    #[test]
    fn json_row_is_flat() {
        let row = ServiceStatus {
            service: ServiceKind::VectorDb,
            enabled: true,
            state: Some(LifecycleState::Installed),
            snapshot: StatusSnapshot {
                installed: true,
                running: false,
                healthy: false,
            },
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "service": "vector_db",
                "enabled": true,
                "state": "installed",
                "installed": true,
                "running": false,
                "healthy": false
            })
        );
    }

    #[test]
    fn table_lists_every_service() {
        let rows: Vec<ServiceStatus> = ServiceKind::ALL
            .into_iter()
            .map(|service| ServiceStatus {
                service,
                enabled: false,
                state: None,
                snapshot: StatusSnapshot::default(),
            })
            .collect();
        let rendered = render_table(&rows).to_string();
        assert!(rendered.contains("retrieval"));
        assert!(rendered.contains("vector-db"));
    }
}
