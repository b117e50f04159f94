//! Normalized event records.
//!
//! Both stores hand back loosely-typed JSON documents. This module turns one
//! such document into a [`RawEvent`], the common shape every later stage of
//! the pipeline works with.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{Result, TrailError};
use crate::identity::{extract_reference, ExerciseRef};

/// Epoch values above this are read as milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

// =============================================================================
// Source & Action Kinds
// =============================================================================

/// Which store a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Debounced editor snapshots (`code_keystrokes`).
    Fine,
    /// Discrete run/submission/access actions (`code_history`).
    Coarse,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fine => "fine",
            Self::Coarse => "coarse",
        }
    }

    /// Field holding the record time, in lookup order.
    fn timestamp_fields(&self) -> [&'static str; 2] {
        match self {
            Self::Fine => ["timestamp", "created_at"],
            Self::Coarse => ["created_at", "timestamp"],
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the student was doing when the snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Keystroke,
    Run,
    Submission,
    Access,
    Unknown,
}

impl ActionKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "keystroke" | "edit" => Self::Keystroke,
            "run" | "run_code" | "execute" => Self::Run,
            "submission" | "submit" => Self::Submission,
            "access" | "view" | "open" => Self::Access,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keystroke => "keystroke",
            Self::Run => "run",
            Self::Submission => "submission",
            Self::Access => "access",
            Self::Unknown => "unknown",
        }
    }

    /// Kinds that carry a signal worth keeping when a duplicate is dropped.
    pub fn is_significant(&self) -> bool {
        matches!(self, Self::Run | Self::Submission)
    }

    /// Ordering used when a duplicate upgrades the kept record.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Access => 1,
            Self::Keystroke => 2,
            Self::Run => 3,
            Self::Submission => 4,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Precomputed Changes
// =============================================================================

/// One entry of the map-shaped change payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
}

/// A precomputed change description, in either shape the stores produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "shape", content = "data")]
pub enum RawChanges {
    /// difflib-style lines: `"+ x"`, `"- x"`, `"  x"`, `"? ..."`.
    Lines(Vec<String>),
    /// Line number to `{previous, current}`, sorted by line number.
    ByLine(Vec<(u64, LineChange)>),
}

impl RawChanges {
    /// Parse the `changes` field. `null`, absent and unrecognized shapes
    /// yield `None` so the diff engine falls back to snapshot comparison.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(Self::Lines(
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.clone()),
                        Value::Null => None,
                        other => Some(other.to_string()),
                    })
                    .collect(),
            )),
            Value::Object(map) => {
                let mut lines: Vec<(u64, LineChange)> = Vec::with_capacity(map.len());
                for (key, change) in map {
                    let Ok(line) = key.trim().parse::<u64>() else {
                        tracing::warn!(key = %key, "Skipping change entry with non-numeric line key");
                        continue;
                    };
                    lines.push((
                        line,
                        LineChange {
                            previous: change.get("previous").and_then(text_field),
                            current: change.get("current").and_then(text_field),
                        },
                    ));
                }
                lines.sort_by_key(|(line, _)| *line);
                Some(Self::ByLine(lines))
            }
            _ => None,
        }
    }
}

// =============================================================================
// Raw Event
// =============================================================================

/// One record from either source, normalized to a common shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub source: SourceKind,
    pub timestamp: DateTime<Utc>,
    pub exercise_ref: Option<ExerciseRef>,
    pub action_kind: ActionKind,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<RawChanges>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub is_submission: bool,
}

impl RawEvent {
    /// Normalize one store document.
    ///
    /// Fails with `MalformedRecord` when the document has no parseable
    /// timestamp or no `code` string. An empty `code` is a valid snapshot.
    pub fn from_json(source: SourceKind, record: &Value) -> Result<Self> {
        let timestamp = source
            .timestamp_fields()
            .iter()
            .find_map(|field| record.get(*field).and_then(parse_timestamp))
            .ok_or_else(|| TrailError::malformed_record(source, "missing or unparseable timestamp"))?;

        let code = match record.get("code") {
            Some(Value::String(code)) => code.clone(),
            _ => return Err(TrailError::malformed_record(source, "missing code snapshot")),
        };

        let action_kind = match record.get("action_type").and_then(Value::as_str) {
            Some(raw) => ActionKind::parse(raw),
            None => match source {
                SourceKind::Fine => ActionKind::Keystroke,
                SourceKind::Coarse => ActionKind::Access,
            },
        };

        Ok(Self {
            source,
            timestamp,
            exercise_ref: extract_reference(record),
            action_kind,
            code,
            changes: record.get("changes").and_then(RawChanges::from_json),
            output: record.get("output").and_then(text_field),
            error: record.get("error").and_then(text_field),
            is_submission: record.get("is_submission").map(truthy).unwrap_or(false),
        })
    }

    /// Whether the record carries program output or an error message.
    pub fn has_run_result(&self) -> bool {
        self.output.as_deref().is_some_and(|s| !s.is_empty())
            || self.error.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Timestamp rounded half-up to the whole second.
    pub fn dedup_key(&self) -> i64 {
        (self.timestamp.timestamp_millis() + 500).div_euclid(1000)
    }
}

// =============================================================================
// Field Helpers
// =============================================================================

fn text_field(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false,
    }
}

/// Parse the timestamp encodings the stores are known to produce.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s.trim()),
        Value::Number(n) => {
            let raw = n.as_f64()?;
            let millis = if raw.abs() > EPOCH_MILLIS_THRESHOLD {
                raw
            } else {
                raw * 1000.0
            };
            Utc.timestamp_millis_opt(millis.round() as i64).single()
        }
        Value::Object(map) => map.get("$date").and_then(parse_timestamp),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"];
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_parse_fine_record() {
        let record = json!({
            "timestamp": "2024-03-01T10:00:00Z",
            "problem_index": 2,
            "code": "a = 1",
            "changes": ["+ a = 1\n"]
        });
        let event = RawEvent::from_json(SourceKind::Fine, &record).unwrap();
        assert_eq!(event.action_kind, ActionKind::Keystroke);
        assert_eq!(event.exercise_ref, Some(ExerciseRef::Number(2)));
        assert_eq!(event.changes, Some(RawChanges::Lines(vec!["+ a = 1\n".into()])));
    }

    #[test]
    fn test_parse_coarse_record_defaults_to_access() {
        let record = json!({
            "created_at": "2024-03-01T10:00:05.250",
            "exercise_id": "3",
            "code": "",
            "is_submission": "true"
        });
        let event = RawEvent::from_json(SourceKind::Coarse, &record).unwrap();
        assert_eq!(event.action_kind, ActionKind::Access);
        assert!(event.is_submission);
        assert_eq!(event.code, "");
        assert_eq!(event.timestamp.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_missing_timestamp_is_malformed() {
        let err = RawEvent::from_json(SourceKind::Fine, &json!({"code": "x"})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedRecord);
    }

    #[test]
    fn test_missing_code_is_malformed() {
        let record = json!({"timestamp": "2024-03-01T10:00:00Z"});
        let err = RawEvent::from_json(SourceKind::Fine, &record).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedRecord);
    }

    #[test]
    fn test_timestamp_encodings() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp(&json!("2024-03-01T10:00:00+00:00")), Some(expected));
        assert_eq!(parse_timestamp(&json!("2024-03-01 10:00:00")), Some(expected));
        assert_eq!(parse_timestamp(&json!(expected.timestamp())), Some(expected));
        assert_eq!(parse_timestamp(&json!(expected.timestamp_millis())), Some(expected));
        assert_eq!(
            parse_timestamp(&json!({"$date": "2024-03-01T10:00:00Z"})),
            Some(expected)
        );
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
    }

    #[test]
    fn test_map_changes_sorted_numerically() {
        let changes = RawChanges::from_json(&json!({
            "10": {"previous": "b", "current": "c"},
            "2": {"current": "a"},
            "x": {"current": "ignored"}
        }))
        .unwrap();
        let RawChanges::ByLine(lines) = changes else {
            panic!("expected map shape");
        };
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0, 2);
        assert_eq!(lines[1].0, 10);
        assert_eq!(lines[0].1.previous, None);
    }

    #[test]
    fn test_dedup_key_rounds_half_up() {
        let mut event = RawEvent::from_json(
            SourceKind::Fine,
            &json!({"timestamp": "2024-03-01T10:00:04.500Z", "code": ""}),
        )
        .unwrap();
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 5).unwrap().timestamp();
        assert_eq!(event.dedup_key(), base);
        event.timestamp = event.timestamp - chrono::Duration::milliseconds(1);
        assert_eq!(event.dedup_key(), base - 1);
    }

    #[test]
    fn test_action_kind_parse() {
        assert_eq!(ActionKind::parse("RUN"), ActionKind::Run);
        assert_eq!(ActionKind::parse("submit"), ActionKind::Submission);
        assert_eq!(ActionKind::parse("placeholder"), ActionKind::Unknown);
    }
}
