//! Timeline construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::diff::{diff, DiffResult};
use crate::events::merge::absorb;
use crate::events::{ActionKind, RawEvent, SourceKind};

/// Build tuning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Drop entries whose code equals their predecessor's. Runs and
    /// submissions are never dropped.
    #[serde(default)]
    pub collapse_unchanged: bool,
}

impl BuildOptions {
    pub fn with_collapse_unchanged(mut self, collapse: bool) -> Self {
        self.collapse_unchanged = collapse;
        self
    }
}

/// One code state in a built timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub sequence_index: usize,
    pub timestamp: DateTime<Utc>,
    pub action_kind: ActionKind,
    pub source: SourceKind,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `None` only for the first entry.
    pub diff_from_previous: Option<DiffResult>,
}

/// Ordered code history of one student on one exercise.
///
/// Entries are non-decreasing by timestamp and `sequence_index` runs
/// contiguously from 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&TimelineEntry> {
        self.entries.get(index)
    }

    pub fn first(&self) -> Option<&TimelineEntry> {
        self.entries.first()
    }

    pub fn last(&self) -> Option<&TimelineEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TimelineEntry> {
        self.entries.iter()
    }

    /// SHA-256 hex digest of the serialized entries.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for entry in &self.entries {
            hasher.update(serde_json::to_vec(entry).unwrap_or_default());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

impl<'a> IntoIterator for &'a Timeline {
    type Item = &'a TimelineEntry;
    type IntoIter = std::slice::Iter<'a, TimelineEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Build a timeline with default options.
pub fn build(events: Vec<RawEvent>) -> Timeline {
    build_with(events, &BuildOptions::default())
}

/// Sort merged events and attach diffs.
///
/// The sort is stable, so events with equal timestamps keep their merged
/// order. Empty input is an empty timeline.
pub fn build_with(mut events: Vec<RawEvent>, options: &BuildOptions) -> Timeline {
    events.sort_by_key(|event| event.timestamp);

    if options.collapse_unchanged {
        events.dedup_by(|current, previous| {
            if current.code != previous.code || current.action_kind.is_significant() {
                return false;
            }
            absorb(previous, current);
            true
        });
    }

    let mut entries: Vec<TimelineEntry> = Vec::with_capacity(events.len());
    for (index, event) in events.into_iter().enumerate() {
        let diff_from_previous = entries
            .last()
            .map(|previous| diff(&previous.code, &event.code, event.changes.as_ref()));

        entries.push(TimelineEntry {
            sequence_index: index,
            timestamp: event.timestamp,
            action_kind: event.action_kind,
            source: event.source,
            code: event.code,
            output: event.output,
            error: event.error,
            diff_from_previous,
        });
    }

    Timeline { entries }
}
