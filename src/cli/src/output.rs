//! Terminal rendering for the Codetrail CLI.
//!
//! Structured data goes out as a table, JSON or YAML. Status lines carry a
//! colored tag; code snapshots get line numbers and diffs get `+`/`-`
//! gutters.

use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::*;
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

use crate::commands::timeline::LineOp;

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable tables and details
    #[default]
    Table,
    Json,
    Yaml,
}

// ── Status lines ────────────────────────────────────────────────────────────

fn tag(label: &str, color: Color) -> ColoredString {
    format!("[{}]", label).color(color).bold()
}

pub fn print_success(msg: &str) {
    println!("{} {}", tag("OK", Color::Green), msg);
}

pub fn print_info(msg: &str) {
    println!("{} {}", tag("INFO", Color::Blue), msg);
}

/// Warnings and errors go to stderr so piped JSON stays clean.
pub fn print_warning(msg: &str) {
    eprintln!("{} {}", tag("WARN", Color::Yellow), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", tag("ERROR", Color::Red), msg);
}

pub fn print_header(title: &str) {
    println!("\n{}\n", title.bold().underline());
}

pub fn print_detail(key: &str, value: &str) {
    println!("  {:<12} {}", format!("{}:", key).cyan(), value);
}

// ── Structured data ─────────────────────────────────────────────────────────

/// Render rows as a table, or the whole slice as JSON/YAML.
pub fn print_list<T: Tabled + Serialize>(rows: &[T], format: OutputFormat) -> Result<()> {
    if !matches!(format, OutputFormat::Table) {
        return print_item(rows, format);
    }
    if rows.is_empty() {
        println!("{}", "(nothing to show)".dimmed());
        return Ok(());
    }
    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Columns::first()).with(Alignment::right()));
    println!("{}", table);
    Ok(())
}

/// Serialize one value. Table mode falls back to pretty JSON.
pub fn print_item<T: Serialize + ?Sized>(item: &T, format: OutputFormat) -> Result<()> {
    let rendered = match format {
        OutputFormat::Yaml => serde_yaml::to_string(item).context("Failed to encode YAML")?,
        OutputFormat::Table | OutputFormat::Json => {
            serde_json::to_string_pretty(item).context("Failed to encode JSON")? + "\n"
        }
    };
    print!("{}", rendered);
    Ok(())
}

// ── Code ────────────────────────────────────────────────────────────────────

pub fn print_diff(ops: &[LineOp]) {
    for op in ops {
        println!("{}", diff_line(op));
    }
}

fn diff_line(op: &LineOp) -> ColoredString {
    match op.kind.as_str() {
        "added" => format!("+ {}", op.text).green(),
        "removed" => format!("- {}", op.text).red(),
        _ => format!("  {}", op.text).dimmed(),
    }
}

/// Print a snapshot with a right-aligned line-number gutter.
pub fn print_code(code: &str) {
    let count = code.split('\n').count();
    let width = count.to_string().len();
    for (n, line) in code.split('\n').enumerate() {
        let gutter = format!("{:>width$} |", n + 1, width = width);
        println!("{} {}", gutter.dimmed(), line);
    }
}
