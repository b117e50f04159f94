//! Dual-source event ingestion.
//!
//! Both sources are always queried, concurrently. A source that fails or
//! times out contributes an empty stream and a [`SourceError`]; it never
//! fails the other source or the caller.

use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{Result, SourceError, TrailError};
use crate::identity::ExerciseIdentity;

use super::record::{RawEvent, SourceKind};
use super::source::{EventSource, SourceQuery};

/// Ingestion tuning.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Per-source query timeout.
    pub source_timeout: Duration,
    /// Maximum records requested from each source.
    pub fetch_limit: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_timeout: Duration::from_secs(10),
            fetch_limit: 1000,
        }
    }
}

/// Counts of records that did not make it into a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropCounts {
    /// Missing timestamp or code.
    pub malformed: usize,
    /// Returned by a source but belonged to another exercise.
    pub unmatched: usize,
}

/// Result of one ingestion run.
#[derive(Debug, Clone, Default)]
pub struct IngestBatch {
    pub fine: Vec<RawEvent>,
    pub coarse: Vec<RawEvent>,
    pub source_errors: Vec<SourceError>,
    pub dropped: DropCounts,
}

impl IngestBatch {
    pub fn is_empty(&self) -> bool {
        self.fine.is_empty() && self.coarse.is_empty()
    }
}

/// Queries both event sources and normalizes what they return.
#[derive(Clone)]
pub struct EventIngestor {
    fine: Arc<dyn EventSource>,
    coarse: Arc<dyn EventSource>,
    config: IngestConfig,
}

impl EventIngestor {
    pub fn new(fine: Arc<dyn EventSource>, coarse: Arc<dyn EventSource>, config: IngestConfig) -> Self {
        Self { fine, coarse, config }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Fetch and normalize the events of one `(student, assignment, exercise)`.
    #[instrument(skip(self, exercise), fields(exercise = %exercise))]
    pub async fn fetch_events(
        &self,
        student_id: &str,
        assignment_id: &str,
        exercise: &ExerciseIdentity,
    ) -> IngestBatch {
        let query = SourceQuery {
            student_id: student_id.to_string(),
            assignment_id: assignment_id.to_string(),
            exercise: exercise.clone(),
            limit: self.config.fetch_limit,
        };

        let (fine_raw, coarse_raw) = tokio::join!(
            self.query_source(SourceKind::Fine, self.fine.as_ref(), &query),
            self.query_source(SourceKind::Coarse, self.coarse.as_ref(), &query),
        );

        let mut batch = IngestBatch::default();
        batch.fine = self.collect(SourceKind::Fine, fine_raw, exercise, &mut batch.source_errors, &mut batch.dropped);
        batch.coarse = self.collect(
            SourceKind::Coarse,
            coarse_raw,
            exercise,
            &mut batch.source_errors,
            &mut batch.dropped,
        );

        debug!(
            fine = batch.fine.len(),
            coarse = batch.coarse.len(),
            malformed = batch.dropped.malformed,
            unmatched = batch.dropped.unmatched,
            source_errors = batch.source_errors.len(),
            "Ingested events"
        );

        batch
    }

    async fn query_source(
        &self,
        kind: SourceKind,
        source: &dyn EventSource,
        query: &SourceQuery,
    ) -> Result<Vec<Value>> {
        match tokio::time::timeout(self.config.source_timeout, source.query(query)).await {
            Ok(Ok(records)) => Ok(records),
            Ok(Err(err)) => Err(TrailError::source_unavailable(kind, err.to_string())),
            Err(_) => Err(TrailError::source_unavailable(
                kind,
                format!(
                    "{} did not answer within {:?}",
                    source.name(),
                    self.config.source_timeout
                ),
            )),
        }
    }

    fn collect(
        &self,
        kind: SourceKind,
        raw: Result<Vec<Value>>,
        exercise: &ExerciseIdentity,
        source_errors: &mut Vec<SourceError>,
        dropped: &mut DropCounts,
    ) -> Vec<RawEvent> {
        let records = match raw {
            Ok(records) => records,
            Err(err) => {
                err.log();
                counter!("codetrail_source_failures_total", "source" => kind.as_str()).increment(1);
                source_errors.push(SourceError::from_error(kind, &err));
                return Vec::new();
            }
        };

        let mut events = Vec::with_capacity(records.len());
        for record in &records {
            if !exercise.matches_record(record) {
                dropped.unmatched += 1;
                continue;
            }
            match RawEvent::from_json(kind, record) {
                Ok(event) => events.push(event),
                Err(err) => {
                    warn!(source = %kind, reason = %err.user_message(), "Skipping malformed record");
                    counter!("codetrail_records_dropped_total", "source" => kind.as_str()).increment(1);
                    dropped.malformed += 1;
                }
            }
        }
        events
    }
}
