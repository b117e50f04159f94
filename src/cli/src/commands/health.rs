//! Health check command.
//!
//! Queries the `/health` endpoint and displays server status.

use anyhow::Result;
use clap::Args;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct HealthArgs {
    /// Also print the Prometheus metrics the server exposes
    #[arg(short, long)]
    metrics: bool,
}

fn field<'a>(health: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    health.get(key).and_then(|v| v.as_str())
}

pub async fn execute(args: HealthArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: serde_json::Value = client.get_raw("/health").await?;

    match format {
        OutputFormat::Table => {
            let status = field(&health, "status").unwrap_or("unknown");

            output::print_header("Server Health");
            output::print_detail("Status", status);
            output::print_detail("API URL", client.base_url());

            if let Some(version) = field(&health, "version") {
                output::print_detail("Version", version);
            }
            if let Some(database) = field(&health, "database") {
                output::print_detail("Database", database);
            }
            if let Some(cached) = health.get("cached_timelines").and_then(|v| v.as_u64()) {
                output::print_detail("Cached timelines", &cached.to_string());
            }
            if let Some(ts) = field(&health, "timestamp") {
                output::print_detail("Timestamp", ts);
            }

            if status == "healthy" {
                output::print_success("Server operational");
            } else {
                output::print_error(&format!("Server status: {}", status));
            }
        }
        _ => output::print_item(&health, format)?,
    }

    if args.metrics {
        let metrics = client.get_text("/metrics").await?;
        output::print_header("Metrics");
        let lines: Vec<&str> = metrics
            .lines()
            .filter(|line| line.starts_with("codetrail_"))
            .collect();
        if lines.is_empty() {
            output::print_info("No codetrail metrics recorded yet");
        }
        for line in lines {
            println!("  {}", line);
        }
    }

    Ok(())
}
