//! Codetrail CLI - Command-line interface for browsing code evolution timelines.
//!
//! Provides commands for timelines, playback cursors, health, and configuration.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use commands::{config, cursor, health, timeline};
use output::OutputFormat;

/// Codetrail - Code Evolution Reconstruction CLI
#[derive(Parser)]
#[command(
    name = "codetrail",
    version,
    about = "Codetrail - Code Evolution Reconstruction",
    long_about = "CLI for replaying how a student's code evolved on an exercise, snapshot by snapshot.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format (defaults to the `output` config key, then table)
    #[arg(short, long, global = true)]
    output: Option<OutputFormat>,

    /// API server URL
    #[arg(long, global = true, env = "CODETRAIL_API_URL")]
    api_url: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Timeline operations
    #[command(subcommand)]
    Timeline(timeline::TimelineCommands),

    /// Step through a built timeline
    #[command(subcommand)]
    Cursor(cursor::CursorCommands),

    /// Check server health
    Health(health::HealthArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let api_url = cli
        .api_url
        .clone()
        .or_else(config::load_api_url)
        .unwrap_or_else(|| "http://localhost:8080".to_string());

    let format = cli
        .output
        .or_else(|| config::load_output().and_then(|raw| OutputFormat::from_str(&raw, true).ok()))
        .unwrap_or_default();

    let client = client::ApiClient::new(&api_url)?;

    let result = match cli.command {
        Commands::Timeline(cmd) => timeline::execute(cmd, &client, format).await,
        Commands::Cursor(cmd) => cursor::execute(cmd, &client, format).await,
        Commands::Health(args) => health::execute(args, &client, format).await,
        Commands::Config(cmd) => config::execute(cmd, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
