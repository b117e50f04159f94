//! Timeline commands.
//!
//! Fetch, rebuild and summarize the code history of one student on one
//! exercise.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

/// Identifies one timeline on the server.
#[derive(Args, Clone)]
pub struct TimelineTarget {
    /// Student ID
    pub student: String,
    /// Assignment ID
    pub assignment: String,
    /// Exercise reference, in any encoding the stores use
    pub exercise: String,
}

impl TimelineTarget {
    /// API path of the timeline followed by `tail` segments such as
    /// `["cursor", "next"]`. Every segment is percent-encoded, so ids may
    /// contain `/`, `?` or spaces.
    pub fn path(&self, tail: &[&str]) -> Result<String> {
        let mut url = Url::parse("http://codetrail.local/").context("Failed to build API path")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Failed to build API path"))?
            .pop_if_empty()
            .extend(["api", "v1", "timelines"])
            .extend([self.student.as_str(), self.assignment.as_str(), self.exercise.as_str()])
            .extend(tail);
        Ok(url.path().to_string())
    }
}

#[derive(Subcommand)]
pub enum TimelineCommands {
    /// Show a timeline, building it on the server if needed
    Show {
        #[command(flatten)]
        target: TimelineTarget,

        /// Print each entry's diff instead of the summary table
        #[arg(short, long)]
        diff: bool,
    },

    /// Rebuild a timeline from the event stores
    Refresh {
        #[command(flatten)]
        target: TimelineTarget,
    },

    /// Show per-day activity
    Activity {
        #[command(flatten)]
        target: TimelineTarget,

        /// Window in days, 0 for all activity
        #[arg(short, long, default_value = "7")]
        days: u32,
    },
}

// ── API types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LineOp {
    pub kind: String,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimelineEntry {
    pub sequence_index: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub action_kind: String,
    pub source: String,
    pub code: String,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub diff_from_previous: Option<Vec<LineOp>>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Timeline {
    entries: Vec<TimelineEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
struct SourceError {
    source: String,
    message: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct DropCounts {
    #[serde(default)]
    malformed: usize,
    #[serde(default)]
    unmatched: usize,
}

#[derive(Debug, Deserialize, Serialize)]
struct TimelineReport {
    timeline: Timeline,
    fingerprint: String,
    #[serde(default)]
    source_errors: Vec<SourceError>,
    #[serde(default)]
    dropped: DropCounts,
    generation: u64,
    built_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ActivityBucket {
    day: chrono::NaiveDate,
    action_kind: String,
    count: usize,
    last_activity: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Tabled)]
struct EntryRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Lines")]
    lines: usize,
    #[tabled(rename = "+/-")]
    changes: String,
}

impl From<&TimelineEntry> for EntryRow {
    fn from(entry: &TimelineEntry) -> Self {
        let changes = match &entry.diff_from_previous {
            Some(ops) => {
                let added = ops.iter().filter(|op| op.kind == "added").count();
                let removed = ops.iter().filter(|op| op.kind == "removed").count();
                format!("+{} -{}", added, removed)
            }
            None => "-".to_string(),
        };
        Self {
            index: entry.sequence_index,
            time: entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            action: entry.action_kind.clone(),
            source: entry.source.clone(),
            lines: entry.code.split('\n').count(),
            changes,
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct ActivityRow {
    #[tabled(rename = "Day")]
    day: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Count")]
    count: usize,
    #[tabled(rename = "Last Activity")]
    last_activity: String,
}

// ── Execution ───────────────────────────────────────────────────────────────

pub async fn execute(cmd: TimelineCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        TimelineCommands::Show { target, diff } => {
            let report: Option<TimelineReport> = client.get(&target.path(&[])?).await?;
            print_report(report, diff, format)
        }

        TimelineCommands::Refresh { target } => {
            let report: Option<TimelineReport> = client
                .post(&target.path(&["refresh"])?, &serde_json::json!({}))
                .await?;
            print_report(report, false, format)
        }

        TimelineCommands::Activity { target, days } => {
            let buckets: Option<Vec<ActivityBucket>> = client
                .get(&format!("{}?days={}", target.path(&["activity"])?, days))
                .await?;
            let Some(buckets) = buckets else {
                output::print_warning("A newer request for this timeline is in progress; try again");
                return Ok(());
            };
            match format {
                OutputFormat::Table => {
                    let rows: Vec<ActivityRow> = buckets
                        .iter()
                        .map(|b| ActivityRow {
                            day: b.day.to_string(),
                            action: b.action_kind.clone(),
                            count: b.count,
                            last_activity: b.last_activity.format("%H:%M:%S").to_string(),
                        })
                        .collect();
                    output::print_list(&rows, format)
                }
                _ => output::print_item(&buckets, format),
            }
        }
    }
}

fn print_report(report: Option<TimelineReport>, show_diffs: bool, format: OutputFormat) -> Result<()> {
    let Some(report) = report else {
        output::print_warning("A newer request for this timeline superseded this one; try again");
        return Ok(());
    };

    if !matches!(format, OutputFormat::Table) {
        return output::print_item(&report, format);
    }

    output::print_header("Timeline");
    output::print_detail("Entries", &report.timeline.entries.len().to_string());
    output::print_detail("Generation", &report.generation.to_string());
    output::print_detail("Built", &report.built_at.to_rfc3339());
    output::print_detail("Fingerprint", &report.fingerprint);
    if report.dropped.malformed + report.dropped.unmatched > 0 {
        output::print_detail(
            "Dropped",
            &format!(
                "{} malformed, {} other exercises",
                report.dropped.malformed, report.dropped.unmatched
            ),
        );
    }
    for err in &report.source_errors {
        output::print_warning(&format!("{} source: {}", err.source, err.message));
    }
    println!();

    if show_diffs {
        for entry in &report.timeline.entries {
            output::print_header(&format!(
                "#{} {} ({})",
                entry.sequence_index,
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.action_kind
            ));
            match &entry.diff_from_previous {
                Some(ops) => output::print_diff(ops),
                None => output::print_code(&entry.code),
            }
        }
        return Ok(());
    }

    let rows: Vec<EntryRow> = report.timeline.entries.iter().map(EntryRow::from).collect();
    output::print_list(&rows, format)
}
