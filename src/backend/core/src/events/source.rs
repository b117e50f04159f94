//! Event store abstraction.
//!
//! A source answers one question: "which raw records exist for this student,
//! assignment and exercise?". The fetch limit counts matching records only,
//! so a busy neighbouring exercise cannot push the requested one out of the
//! window. The ingestor still re-checks every record against the alias set.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use crate::error::{ErrorContext, Result};
use crate::identity::ExerciseIdentity;

/// Parameters for one source query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceQuery {
    pub student_id: String,
    pub assignment_id: String,
    pub exercise: ExerciseIdentity,
    /// Upper bound on returned records.
    pub limit: usize,
}

/// A read-only store of raw event documents.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Short name for logs and diagnostics.
    fn name(&self) -> &str;

    /// Fetch up to `limit` records of `(student, assignment)` that match
    /// `query.exercise` under any of its aliases, oldest first.
    async fn query(&self, query: &SourceQuery) -> Result<Vec<Value>>;
}

// =============================================================================
// In-Memory Source
// =============================================================================

/// In-memory store, used for fixtures, seeded demo servers and tests.
///
/// Records are matched on `user_id` / `assignment_id` by text form; a record
/// without an `assignment_id` matches every assignment.
#[derive(Debug, Clone)]
pub struct InMemoryEventSource {
    name: String,
    records: Arc<RwLock<Vec<Value>>>,
}

impl InMemoryEventSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_records(name: impl Into<String>, records: Vec<Value>) -> Self {
        let source = Self::new(name);
        *source.records.write() = records;
        source
    }

    pub fn push(&self, record: Value) {
        self.records.write().push(record);
    }

    pub fn extend(&self, records: impl IntoIterator<Item = Value>) {
        self.records.write().extend(records);
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

fn field_text(record: &Value, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, query: &SourceQuery) -> Result<Vec<Value>> {
        let records = self.records.read();
        Ok(records
            .iter()
            .filter(|r| field_text(r, "user_id").as_deref() == Some(query.student_id.as_str()))
            .filter(|r| match field_text(r, "assignment_id") {
                Some(assignment) => assignment == query.assignment_id,
                None => true,
            })
            .filter(|r| query.exercise.matches_record(r))
            .take(query.limit)
            .cloned()
            .collect())
    }
}

// =============================================================================
// Seed Files
// =============================================================================

/// Contents of a seed file: raw documents for both stores.
#[derive(Debug, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub fine: Vec<Value>,
    #[serde(default)]
    pub coarse: Vec<Value>,
}

impl SeedData {
    /// Read a `{ "fine": [...], "coarse": [...] }` JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read seed file {}", path.display()))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Build the pair of in-memory sources.
    pub fn into_sources(self) -> (InMemoryEventSource, InMemoryEventSource) {
        (
            InMemoryEventSource::with_records("memory-fine", self.fine),
            InMemoryEventSource::with_records("memory-coarse", self.coarse),
        )
    }
}
