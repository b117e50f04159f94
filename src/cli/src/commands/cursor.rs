//! Playback cursor commands.
//!
//! Step through a built timeline one snapshot at a time.

use anyhow::Result;
use clap::Subcommand;
use serde::{Deserialize, Serialize};

use super::timeline::{TimelineEntry, TimelineTarget};
use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum CursorCommands {
    /// Show the entry under the cursor
    Show {
        #[command(flatten)]
        target: TimelineTarget,
    },

    /// Step forward one entry
    Next {
        #[command(flatten)]
        target: TimelineTarget,
    },

    /// Step back one entry
    #[command(alias = "prev")]
    Previous {
        #[command(flatten)]
        target: TimelineTarget,
    },

    /// Jump to an entry (clamped to the last one)
    Seek {
        #[command(flatten)]
        target: TimelineTarget,

        /// Zero-based entry index
        position: usize,
    },
}

#[derive(Debug, Deserialize, Serialize)]
struct CursorView {
    position: Option<usize>,
    len: usize,
    has_next: bool,
    has_previous: bool,
    entry: Option<TimelineEntry>,
}

#[derive(Serialize)]
struct SeekRequest {
    position: usize,
}

pub async fn execute(cmd: CursorCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (target, view): (TimelineTarget, Option<CursorView>) = match cmd {
        CursorCommands::Show { target } => {
            let view = client.get(&target.path(&["cursor"])?).await?;
            (target, view)
        }
        CursorCommands::Next { target } => {
            let view = client
                .post(&target.path(&["cursor", "next"])?, &serde_json::json!({}))
                .await?;
            (target, view)
        }
        CursorCommands::Previous { target } => {
            let view = client
                .post(&target.path(&["cursor", "previous"])?, &serde_json::json!({}))
                .await?;
            (target, view)
        }
        CursorCommands::Seek { target, position } => {
            let view = client
                .post(&target.path(&["cursor", "seek"])?, &SeekRequest { position })
                .await?;
            (target, view)
        }
    };

    let Some(view) = view else {
        anyhow::bail!("No cursor for {}", target.path(&[])?);
    };

    match format {
        OutputFormat::Table => print_view(&view),
        _ => output::print_item(&view, format)?,
    }
    Ok(())
}

fn print_view(view: &CursorView) {
    let Some(entry) = &view.entry else {
        output::print_info("Timeline is empty");
        return;
    };

    let position = view.position.map(|p| p + 1).unwrap_or(0);
    output::print_header(&format!(
        "Entry {}/{} ({}, {})",
        position,
        view.len,
        entry.action_kind,
        entry.timestamp.format("%Y-%m-%d %H:%M:%S")
    ));

    match &entry.diff_from_previous {
        Some(ops) => output::print_diff(ops),
        None => output::print_code(&entry.code),
    }

    if let Some(out) = entry.output.as_deref().filter(|s| !s.is_empty()) {
        output::print_header("Output");
        println!("{}", out);
    }
    if let Some(err) = entry.error.as_deref().filter(|s| !s.is_empty()) {
        output::print_header("Error");
        output::print_error(err);
    }

    println!();
    let nav = match (view.has_previous, view.has_next) {
        (true, true) => "previous | next",
        (true, false) => "previous | (end)",
        (false, true) => "(start) | next",
        (false, false) => "(only entry)",
    };
    output::print_detail("Navigate", nav);
}
