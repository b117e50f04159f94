//! Line-level diffs between consecutive snapshots.
//!
//! A diff is either normalized from a precomputed change payload or computed
//! directly with a positional comparison. The positional diff aligns lines by
//! index, not by content, so inserting a line near the top cascades into a
//! run of removed/added pairs. Viewers of recorded histories depend on that
//! exact output, so it must not be replaced by a minimal edit script.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::events::{LineChange, RawChanges};

/// Tag of one line operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Added,
    Removed,
    Unchanged,
}

impl LineKind {
    /// Two-character prefix used in rendered output.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Added => "+ ",
            Self::Removed => "- ",
            Self::Unchanged => "  ",
        }
    }
}

/// One tagged line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineOp {
    pub kind: LineKind,
    pub text: String,
}

impl LineOp {
    pub fn added(text: impl Into<String>) -> Self {
        Self { kind: LineKind::Added, text: text.into() }
    }

    pub fn removed(text: impl Into<String>) -> Self {
        Self { kind: LineKind::Removed, text: text.into() }
    }

    pub fn unchanged(text: impl Into<String>) -> Self {
        Self { kind: LineKind::Unchanged, text: text.into() }
    }
}

/// Per-kind line counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
}

/// An ordered sequence of line operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiffResult {
    ops: Vec<LineOp>,
}

impl DiffResult {
    pub fn new(ops: Vec<LineOp>) -> Self {
        Self { ops }
    }

    pub fn ops(&self) -> &[LineOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<LineOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Whether any line was added or removed.
    pub fn has_changes(&self) -> bool {
        self.ops.iter().any(|op| op.kind != LineKind::Unchanged)
    }

    /// Text of the snapshot that owns this diff (added + unchanged lines).
    pub fn reconstruct_current(&self) -> String {
        self.join_skipping(LineKind::Removed)
    }

    /// Text of the preceding snapshot (removed + unchanged lines).
    pub fn reconstruct_previous(&self) -> String {
        self.join_skipping(LineKind::Added)
    }

    fn join_skipping(&self, skipped: LineKind) -> String {
        self.ops
            .iter()
            .filter(|op| op.kind != skipped)
            .map(|op| op.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn stats(&self) -> DiffStats {
        self.ops.iter().fold(DiffStats::default(), |mut stats, op| {
            match op.kind {
                LineKind::Added => stats.added += 1,
                LineKind::Removed => stats.removed += 1,
                LineKind::Unchanged => stats.unchanged += 1,
            }
            stats
        })
    }

    /// Prefixed text, one op per line.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DiffResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}{}", op.kind.prefix(), op.text)?;
        }
        Ok(())
    }
}

impl FromIterator<LineOp> for DiffResult {
    fn from_iter<I: IntoIterator<Item = LineOp>>(iter: I) -> Self {
        Self { ops: iter.into_iter().collect() }
    }
}

// =============================================================================
// Diff Engine
// =============================================================================

/// Diff `current` against `previous`, preferring a precomputed payload.
pub fn diff(previous: &str, current: &str, precomputed: Option<&RawChanges>) -> DiffResult {
    match precomputed {
        Some(RawChanges::Lines(lines)) => from_change_lines(lines),
        Some(RawChanges::ByLine(entries)) => from_line_map(entries),
        None => positional_diff(previous, current),
    }
}

/// Index-aligned comparison of two snapshots.
///
/// Snapshots are split on `'\n'` only, so `""` is one empty line and a
/// trailing newline yields a trailing empty line. This keeps reconstruction
/// exact in both directions.
pub fn positional_diff(previous: &str, current: &str) -> DiffResult {
    let previous: Vec<&str> = previous.split('\n').collect();
    let current: Vec<&str> = current.split('\n').collect();
    let mut ops = Vec::with_capacity(previous.len().max(current.len()) + 1);

    for (i, line) in current.iter().enumerate() {
        match previous.get(i) {
            None => ops.push(LineOp::added(*line)),
            Some(old) if old != line => {
                ops.push(LineOp::removed(*old));
                ops.push(LineOp::added(*line));
            }
            Some(_) => ops.push(LineOp::unchanged(*line)),
        }
    }
    for old in previous.iter().skip(current.len()) {
        ops.push(LineOp::removed(*old));
    }

    DiffResult::new(ops)
}

/// Normalize the array-of-lines payload (difflib `ndiff` style).
///
/// `"? "` hint lines carry no content and are dropped. Each line loses one
/// trailing newline, since the recorder kept line ends.
pub fn from_change_lines(lines: &[String]) -> DiffResult {
    lines
        .iter()
        .filter_map(|raw| {
            let line = raw.strip_suffix('\n').unwrap_or(raw.as_str());
            if let Some(text) = line.strip_prefix("+ ") {
                Some(LineOp::added(text))
            } else if let Some(text) = line.strip_prefix("- ") {
                Some(LineOp::removed(text))
            } else if line.starts_with("? ") {
                None
            } else {
                Some(LineOp::unchanged(line.strip_prefix("  ").unwrap_or(line)))
            }
        })
        .collect()
}

/// Normalize the map-of-line-number payload. Entries must already be in
/// ascending line order.
pub fn from_line_map(entries: &[(u64, LineChange)]) -> DiffResult {
    let mut ops = Vec::with_capacity(entries.len() * 2);
    for (_, change) in entries {
        if let Some(previous) = change.previous.as_deref().filter(|s| !s.is_empty()) {
            ops.push(LineOp::removed(previous));
        }
        if let Some(current) = change.current.as_deref().filter(|s| !s.is_empty()) {
            ops.push(LineOp::added(current));
        }
    }
    DiffResult::new(ops)
}
