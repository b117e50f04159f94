//! End-to-end tests of the reconstruction pipeline.
//!
//! Tests cover:
//! - Ingest, merge and build over both stores
//! - Submission promotion across duplicate records
//! - Exercise alias matching
//! - Ordering and idempotence of rebuilt timelines

use std::sync::Arc;

use codetrail_core::events::{
    merge, ActionKind, EventIngestor, EventSource, InMemoryEventSource, IngestConfig, SourceKind,
};
use codetrail_core::identity::ExerciseIdentity;
use codetrail_core::timeline::{build, build_with, BuildOptions, LineOp, PlaybackCursor, Timeline};
use serde_json::{json, Value};

// ============================================================================
// Helpers
// ============================================================================

fn ingestor(fine: Vec<Value>, coarse: Vec<Value>) -> EventIngestor {
    let fine: Arc<dyn EventSource> = Arc::new(InMemoryEventSource::with_records("fine", fine));
    let coarse: Arc<dyn EventSource> = Arc::new(InMemoryEventSource::with_records("coarse", coarse));
    EventIngestor::new(fine, coarse, IngestConfig::default())
}

async fn reconstruct(fine: Vec<Value>, coarse: Vec<Value>, exercise: i64) -> Timeline {
    let identity = ExerciseIdentity::resolve(exercise);
    let batch = ingestor(fine, coarse).fetch_events("s1", "a1", &identity).await;
    assert!(batch.source_errors.is_empty());
    let (merged, _) = merge(batch.fine, batch.coarse);
    build(merged)
}

fn keystroke(ts: &str, code: &str) -> Value {
    json!({"user_id": "s1", "assignment_id": "a1", "exercise_id": 3, "timestamp": ts, "code": code})
}

// ============================================================================
// Reconstruction
// ============================================================================

#[tokio::test]
async fn test_submission_promoted_from_coarse_duplicate() {
    let fine = vec![
        keystroke("2024-03-01T10:00:00Z", "a=1"),
        keystroke("2024-03-01T10:00:05Z", "a=1\nb=2"),
    ];
    let coarse = vec![json!({
        "user_id": "s1",
        "assignment_id": "a1",
        "exercise_id": 3,
        "created_at": "2024-03-01T10:00:05Z",
        "code": "a=1\nb=2",
        "is_submission": true
    })];

    let timeline = reconstruct(fine, coarse, 3).await;

    assert_eq!(timeline.len(), 2);
    let second = timeline.get(1).unwrap();
    assert_eq!(second.action_kind, ActionKind::Submission);
    assert_eq!(second.source, SourceKind::Fine);
    assert_eq!(
        second.diff_from_previous.as_ref().unwrap().ops(),
        &[LineOp::unchanged("a=1"), LineOp::added("b=2")]
    );
    assert!(timeline.first().unwrap().diff_from_previous.is_none());
}

#[tokio::test]
async fn test_collapse_keeps_unchanged_submission() {
    let fine = vec![keystroke("2024-03-01T10:00:00Z", "a")];
    let coarse = vec![json!({
        "user_id": "s1",
        "assignment_id": "a1",
        "problem_index": "3",
        "created_at": "2024-03-01T10:05:00Z",
        "code": "a",
        "is_submission": true
    })];

    let identity = ExerciseIdentity::resolve(3i64);
    let batch = ingestor(fine, coarse).fetch_events("s1", "a1", &identity).await;
    let (merged, _) = merge(batch.fine, batch.coarse);
    let timeline = build_with(merged, &BuildOptions::default().with_collapse_unchanged(true));

    let kinds: Vec<_> = timeline.iter().map(|e| e.action_kind).collect();
    assert_eq!(kinds, vec![ActionKind::Keystroke, ActionKind::Submission]);
    assert_eq!(timeline.get(1).unwrap().source, SourceKind::Coarse);
}

#[tokio::test]
async fn test_empty_sources_yield_empty_timeline() {
    let timeline = reconstruct(Vec::new(), Vec::new(), 3).await;

    assert!(timeline.is_empty());
    let cursor = PlaybackCursor::new(Arc::new(timeline));
    assert!(cursor.current().is_none());
    assert!(!cursor.has_next());
}

#[tokio::test]
async fn test_entries_sorted_across_sources() {
    let fine = vec![
        keystroke("2024-03-01T10:00:30Z", "c"),
        keystroke("2024-03-01T10:00:10Z", "a"),
    ];
    let coarse = vec![json!({
        "user_id": "s1",
        "exercise_id": "3",
        "created_at": "2024-03-01T10:00:20Z",
        "action_type": "run",
        "code": "b",
        "output": "ok"
    })];

    let timeline = reconstruct(fine, coarse, 3).await;

    let codes: Vec<&str> = timeline.iter().map(|e| e.code.as_str()).collect();
    assert_eq!(codes, vec!["a", "b", "c"]);
    let indexes: Vec<usize> = timeline.iter().map(|e| e.sequence_index).collect();
    assert_eq!(indexes, vec![0, 1, 2]);
    assert_eq!(timeline.get(1).unwrap().action_kind, ActionKind::Run);
    assert_eq!(timeline.get(1).unwrap().output.as_deref(), Some("ok"));
}

#[tokio::test]
async fn test_same_second_records_deduplicated() {
    let fine = vec![
        keystroke("2024-03-01T10:00:00.100Z", "x"),
        keystroke("2024-03-01T10:00:00.300Z", "x"),
        keystroke("2024-03-01T10:00:02Z", "y"),
    ];

    let timeline = reconstruct(fine, Vec::new(), 3).await;

    assert_eq!(timeline.len(), 2);
    let seconds: Vec<i64> = timeline.iter().map(|e| e.timestamp.timestamp()).collect();
    assert!(seconds.windows(2).all(|w| w[0] != w[1]));
}

#[tokio::test]
async fn test_exercise_aliases_match_every_encoding() {
    let fine = vec![
        json!({"user_id": "s1", "timestamp": "2024-03-01T10:00:00Z", "exercise_id": 3, "code": "int"}),
        json!({"user_id": "s1", "timestamp": "2024-03-01T10:00:01Z", "exercise_id": "3", "code": "text"}),
        json!({"user_id": "s1", "timestamp": "2024-03-01T10:00:02Z", "problem_index": 2, "code": "zero-based"}),
        json!({"user_id": "s1", "timestamp": "2024-03-01T10:00:03Z", "exercise_id": 4, "code": "other"}),
    ];

    let timeline = reconstruct(fine, Vec::new(), 3).await;

    let codes: Vec<&str> = timeline.iter().map(|e| e.code.as_str()).collect();
    assert_eq!(codes, vec!["int", "text", "zero-based"]);
}

#[tokio::test]
async fn test_malformed_records_are_skipped() {
    let fine = vec![
        keystroke("2024-03-01T10:00:00Z", "ok"),
        json!({"user_id": "s1", "exercise_id": 3, "code": "no time"}),
        json!({"user_id": "s1", "exercise_id": 3, "timestamp": "2024-03-01T10:00:05Z"}),
    ];
    let identity = ExerciseIdentity::resolve(3i64);

    let batch = ingestor(fine, Vec::new()).fetch_events("s1", "a1", &identity).await;

    assert_eq!(batch.fine.len(), 1);
    assert_eq!(batch.dropped.malformed, 2);
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let fine = vec![
        keystroke("2024-03-01T10:00:00Z", "a"),
        keystroke("2024-03-01T10:00:04Z", "a\nb"),
        keystroke("2024-03-01T10:00:09Z", "b"),
    ];

    let first = reconstruct(fine.clone(), Vec::new(), 3).await;
    let second = reconstruct(fine, Vec::new(), 3).await;

    assert_eq!(first, second);
    assert_eq!(first.fingerprint(), second.fingerprint());
}

#[tokio::test]
async fn test_diff_reconstructs_each_snapshot() {
    let fine = vec![
        keystroke("2024-03-01T10:00:00Z", "def f():\n    pass"),
        keystroke("2024-03-01T10:00:04Z", "def f():\n    return 1\n"),
        keystroke("2024-03-01T10:00:09Z", ""),
    ];

    let timeline = reconstruct(fine, Vec::new(), 3).await;

    for pair in timeline.entries().windows(2) {
        let diff = pair[1].diff_from_previous.as_ref().unwrap();
        assert_eq!(diff.reconstruct_previous(), pair[0].code);
        assert_eq!(diff.reconstruct_current(), pair[1].code);
    }
}
