//! Playback cursor over a built timeline.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::builder::{Timeline, TimelineEntry};

/// A bounded position over a [`Timeline`].
///
/// The position is `None` exactly when the timeline is empty. Stepping past
/// either end is a no-op, never an error.
#[derive(Debug, Clone)]
pub struct PlaybackCursor {
    timeline: Arc<Timeline>,
    position: Option<usize>,
}

impl PlaybackCursor {
    /// Start at the first entry.
    pub fn new(timeline: Arc<Timeline>) -> Self {
        let position = if timeline.is_empty() { None } else { Some(0) };
        Self { timeline, position }
    }

    pub fn timeline(&self) -> &Arc<Timeline> {
        &self.timeline
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    /// Move to `index`, clamped to the last entry.
    pub fn seek(&mut self, index: usize) -> Option<&TimelineEntry> {
        let last = self.timeline.len().checked_sub(1)?;
        self.position = Some(index.min(last));
        self.current()
    }

    /// Step forward. Returns false at the end.
    pub fn next(&mut self) -> bool {
        if !self.has_next() {
            return false;
        }
        self.position = self.position.map(|p| p + 1);
        true
    }

    /// Step back. Returns false at the start.
    pub fn previous(&mut self) -> bool {
        if !self.has_previous() {
            return false;
        }
        self.position = self.position.map(|p| p - 1);
        true
    }

    pub fn has_next(&self) -> bool {
        self.position.is_some_and(|p| p + 1 < self.timeline.len())
    }

    pub fn has_previous(&self) -> bool {
        self.position.is_some_and(|p| p > 0)
    }

    /// Entry at the current position; its `diff_from_previous` is `None` at 0.
    pub fn current(&self) -> Option<&TimelineEntry> {
        self.position.and_then(|p| self.timeline.get(p))
    }

    pub fn view(&self) -> CursorView {
        CursorView {
            position: self.position,
            len: self.timeline.len(),
            has_next: self.has_next(),
            has_previous: self.has_previous(),
            entry: self.current().cloned(),
        }
    }
}

/// Serializable snapshot of a cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorView {
    pub position: Option<usize>,
    pub len: usize,
    pub has_next: bool,
    pub has_previous: bool,
    pub entry: Option<TimelineEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ActionKind, RawEvent, SourceKind};
    use crate::timeline::builder::build;

    fn timeline(n: usize) -> Arc<Timeline> {
        let events = (0..n)
            .map(|i| RawEvent {
                source: SourceKind::Fine,
                timestamp: chrono::DateTime::from_timestamp(1_700_000_000 + i as i64 * 10, 0).unwrap(),
                exercise_ref: None,
                action_kind: ActionKind::Keystroke,
                code: format!("v{}", i),
                changes: None,
                output: None,
                error: None,
                is_submission: false,
            })
            .collect();
        Arc::new(build(events))
    }

    #[test]
    fn test_empty_cursor_is_inactive() {
        let mut cursor = PlaybackCursor::new(timeline(0));
        assert_eq!(cursor.position(), None);
        assert!(cursor.current().is_none());
        assert!(cursor.seek(3).is_none());
        assert!(!cursor.next());
        assert!(!cursor.previous());
        assert_eq!(cursor.view().entry, None);
    }

    #[test]
    fn test_seek_clamps() {
        let mut cursor = PlaybackCursor::new(timeline(3));
        assert_eq!(cursor.seek(10).map(|e| e.sequence_index), Some(2));
        assert_eq!(cursor.seek(1).map(|e| e.code.as_str()), Some("v1"));
    }

    #[test]
    fn test_stepping_stops_at_bounds() {
        let mut cursor = PlaybackCursor::new(timeline(2));
        assert!(!cursor.has_previous());
        assert!(!cursor.previous());
        assert_eq!(cursor.position(), Some(0));
        assert!(cursor.current().unwrap().diff_from_previous.is_none());

        assert!(cursor.next());
        assert!(!cursor.next());
        assert_eq!(cursor.position(), Some(1));
        assert!(cursor.current().unwrap().diff_from_previous.is_some());

        let view = cursor.view();
        assert!(!view.has_next);
        assert!(view.has_previous);
        assert_eq!(view.len, 2);
    }
}
