//! Timeline service.
//!
//! Runs the full pipeline (resolve, ingest, merge, build) per
//! `(student, assignment, exercise)` and owns the state that outlives a
//! single run: the typed report cache, per-key request generations, and
//! per-key playback cursors.
//!
//! Every run takes the next generation for its key. A run publishes its
//! result only if no newer run was started for that key in the meantime, so
//! a slow, superseded request can never overwrite newer data.
//!
//! Cursors live under the cache limits: one idle longer than the cache TTL
//! is dropped, and at most `max_entries` are kept, least recently used
//! first out. Generation state goes with the cursor once no run is in
//! flight for the key.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::cache::{CacheConfig, CacheStats, TimelineKey, TypedCache};
use crate::error::{Result, SourceError, TrailError};
use crate::events::{merge, DropCounts, EventIngestor, MergeStats};
use crate::identity::IdentityResolver;
use crate::timeline::{build_with, summarize, ActivityBucket, BuildOptions, CursorView, PlaybackCursor, Timeline};

// ═══════════════════════════════════════════════════════════════════════════════
// Reports
// ═══════════════════════════════════════════════════════════════════════════════

/// A built timeline together with the diagnostics of the run that built it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineReport {
    pub key: TimelineKey,
    pub timeline: Arc<Timeline>,
    /// SHA-256 of the timeline entries.
    pub fingerprint: String,
    /// Sources that failed during this run. Empty on full success.
    pub source_errors: Vec<SourceError>,
    pub dropped: DropCounts,
    pub merge: MergeStats,
    pub generation: u64,
    pub built_at: DateTime<Utc>,
}

/// Result of a pipeline request.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Fresh(Arc<TimelineReport>),
    /// A newer request for the same key was issued before this one finished.
    Superseded { generation: u64, latest: u64 },
}

impl PipelineOutcome {
    pub fn report(&self) -> Option<&Arc<TimelineReport>> {
        match self {
            Self::Fresh(report) => Some(report),
            Self::Superseded { .. } => None,
        }
    }

    pub fn into_report(self) -> Option<Arc<TimelineReport>> {
        match self {
            Self::Fresh(report) => Some(report),
            Self::Superseded { .. } => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded { .. })
    }
}

#[derive(Debug)]
struct GenerationState {
    latest: u64,
    published: u64,
    touched: Instant,
}

impl Default for GenerationState {
    fn default() -> Self {
        Self {
            latest: 0,
            published: 0,
            touched: Instant::now(),
        }
    }
}

impl GenerationState {
    fn in_flight(&self) -> bool {
        self.latest != self.published
    }
}

struct CursorSlot {
    cursor: PlaybackCursor,
    touched: Instant,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Entry point for timeline requests.
pub struct TimelineService {
    ingestor: EventIngestor,
    resolver: IdentityResolver,
    options: BuildOptions,
    cache: TypedCache<TimelineKey, Arc<TimelineReport>>,
    generations: DashMap<TimelineKey, GenerationState>,
    cursors: DashMap<TimelineKey, CursorSlot>,
}

impl TimelineService {
    pub fn new(ingestor: EventIngestor) -> Self {
        Self {
            ingestor,
            resolver: IdentityResolver::new(),
            options: BuildOptions::default(),
            cache: TypedCache::new(CacheConfig::default()),
            generations: DashMap::new(),
            cursors: DashMap::new(),
        }
    }

    pub fn with_build_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cache_config(mut self, config: CacheConfig) -> Self {
        self.cache = TypedCache::new(config);
        self
    }

    /// Build a key with the exercise in canonical form.
    pub fn key(&self, student_id: &str, assignment_id: &str, exercise: &str) -> Result<TimelineKey> {
        let identity = self.resolver.resolve_str(exercise);
        TimelineKey::for_identity(student_id, assignment_id, &identity)
    }

    /// Cached report if still fresh, otherwise a new pipeline run.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn get_timeline(&self, key: &TimelineKey) -> Result<PipelineOutcome> {
        key.validate()?;
        if let Some(report) = self.cache.get(key) {
            debug!(generation = report.generation, "Serving cached timeline");
            return Ok(PipelineOutcome::Fresh(report));
        }
        self.run_pipeline(key).await
    }

    /// Drop any cached report and re-run the pipeline. Supersedes in-flight
    /// runs for the same key.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn refresh(&self, key: &TimelineKey) -> Result<PipelineOutcome> {
        key.validate()?;
        self.cache.invalidate(key);
        self.run_pipeline(key).await
    }

    async fn run_pipeline(&self, key: &TimelineKey) -> Result<PipelineOutcome> {
        let generation = self.next_generation(key);
        let started = Instant::now();

        let identity = self.resolver.resolve_str(&key.exercise);
        let batch = self
            .ingestor
            .fetch_events(&key.student_id, &key.assignment_id, &identity)
            .await;

        let (merged, merge_stats) = merge(batch.fine, batch.coarse);
        let timeline = build_with(merged, &self.options);

        let elapsed = started.elapsed();
        counter!("codetrail_pipeline_runs_total").increment(1);
        histogram!("codetrail_pipeline_duration_seconds").record(elapsed.as_secs_f64());

        let report = TimelineReport {
            key: key.clone(),
            fingerprint: timeline.fingerprint(),
            timeline: Arc::new(timeline),
            source_errors: batch.source_errors,
            dropped: batch.dropped,
            merge: merge_stats,
            generation,
            built_at: Utc::now(),
        };

        Ok(self.publish(report, elapsed.as_millis()))
    }

    fn next_generation(&self, key: &TimelineKey) -> u64 {
        let mut state = self.generations.entry(key.clone()).or_default();
        state.latest += 1;
        state.touched = Instant::now();
        state.latest
    }

    /// Latest generation issued for `key`, 0 if none.
    pub fn generation(&self, key: &TimelineKey) -> u64 {
        self.generations.get(key).map(|state| state.latest).unwrap_or(0)
    }

    fn publish(&self, report: TimelineReport, elapsed_ms: u128) -> PipelineOutcome {
        let mut state = self.generations.entry(report.key.clone()).or_default();
        if report.generation != state.latest || report.generation <= state.published {
            counter!("codetrail_stale_results_total").increment(1);
            TrailError::stale_result(report.generation, state.latest).log();
            return PipelineOutcome::Superseded {
                generation: report.generation,
                latest: state.latest,
            };
        }
        state.published = report.generation;

        info!(
            entries = report.timeline.len(),
            source_errors = report.source_errors.len(),
            generation = report.generation,
            elapsed_ms = elapsed_ms as u64,
            "Timeline built"
        );

        let report = Arc::new(report);
        self.cursors.insert(
            report.key.clone(),
            CursorSlot {
                cursor: PlaybackCursor::new(report.timeline.clone()),
                touched: Instant::now(),
            },
        );
        self.cache.insert(report.key.clone(), report.clone());
        // release the entry lock before `prune` walks the generations map
        drop(state);
        self.prune();
        PipelineOutcome::Fresh(report)
    }

    /// Drop idle cursors, cap their number, then forget generation state
    /// that has neither a cursor nor a recent run behind it.
    fn prune(&self) {
        let config = self.cache.config();
        let ttl = config.ttl;
        let before = self.cursors.len();
        self.cursors.retain(|_, slot| slot.touched.elapsed() < ttl);

        while self.cursors.len() > config.max_entries.max(1) {
            let idle = self
                .cursors
                .iter()
                .min_by_key(|slot| slot.value().touched)
                .map(|slot| slot.key().clone());
            match idle {
                Some(key) => {
                    self.cursors.remove(&key);
                }
                None => break,
            }
        }

        self.generations.retain(|key, state| {
            self.cursors.contains_key(key) || (state.in_flight() && state.touched.elapsed() < ttl)
        });

        let released = before.saturating_sub(self.cursors.len());
        if released > 0 {
            debug!(released, cursors = self.cursors.len(), "Released playback cursors");
        }
    }

    /// Run `f` on a live cursor, refreshing its idle timer. An expired
    /// cursor is removed and reads as absent.
    fn with_cursor<F>(&self, key: &TimelineKey, f: F) -> Option<CursorView>
    where
        F: FnOnce(&mut PlaybackCursor),
    {
        let ttl = self.cache.config().ttl;
        let view = {
            let mut slot = self.cursors.get_mut(key)?;
            if slot.touched.elapsed() < ttl {
                slot.touched = Instant::now();
                f(&mut slot.cursor);
                Some(slot.cursor.view())
            } else {
                None
            }
        };
        if view.is_none() {
            self.cursors.remove_if(key, |_, slot| slot.touched.elapsed() >= ttl);
        }
        view
    }

    /// Number of live playback cursors.
    pub fn cursor_count(&self) -> usize {
        self.cursors.len()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cursor Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Cursor over the most recently built timeline, `None` if never built.
    pub fn cursor(&self, key: &TimelineKey) -> Option<CursorView> {
        self.with_cursor(key, |_| {})
    }

    pub fn seek(&self, key: &TimelineKey, position: usize) -> Option<CursorView> {
        self.with_cursor(key, |cursor| {
            cursor.seek(position);
        })
    }

    pub fn next(&self, key: &TimelineKey) -> Option<CursorView> {
        self.with_cursor(key, |cursor| {
            cursor.next();
        })
    }

    pub fn previous(&self, key: &TimelineKey) -> Option<CursorView> {
        self.with_cursor(key, |cursor| {
            cursor.previous();
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Activity
    // ─────────────────────────────────────────────────────────────────────────

    /// Per-day activity of the key's timeline over the last `days` days.
    /// `None` or `0` means no window.
    pub async fn activity(&self, key: &TimelineKey, days: Option<u32>) -> Result<Option<Vec<ActivityBucket>>> {
        let since = days
            .filter(|days| *days > 0)
            .map(|days| Utc::now() - chrono::Duration::days(i64::from(days)));
        Ok(self
            .get_timeline(key)
            .await?
            .report()
            .map(|report| summarize(&report.timeline, since)))
    }

    pub fn invalidate(&self, key: &TimelineKey) -> bool {
        self.cache.invalidate(key)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventSource, InMemoryEventSource, IngestConfig};
    use serde_json::json;

    fn service(fine: InMemoryEventSource) -> TimelineService {
        let fine: Arc<dyn EventSource> = Arc::new(fine);
        let coarse: Arc<dyn EventSource> = Arc::new(InMemoryEventSource::new("coarse"));
        TimelineService::new(EventIngestor::new(fine, coarse, IngestConfig::default()))
    }

    #[tokio::test]
    async fn test_get_timeline_caches() {
        let fine = InMemoryEventSource::with_records(
            "fine",
            vec![json!({"user_id": "s1", "timestamp": "2024-03-01T10:00:00Z", "exercise_id": 1, "code": "a"})],
        );
        let service = service(fine.clone());
        let key = service.key("s1", "a1", "1").unwrap();

        let first = service.get_timeline(&key).await.unwrap().into_report().unwrap();
        fine.push(json!({"user_id": "s1", "timestamp": "2024-03-01T10:00:05Z", "exercise_id": 1, "code": "b"}));
        let second = service.get_timeline(&key).await.unwrap().into_report().unwrap();

        assert_eq!(first.generation, second.generation);
        assert_eq!(second.timeline.len(), 1);

        let refreshed = service.refresh(&key).await.unwrap().into_report().unwrap();
        assert_eq!(refreshed.timeline.len(), 2);
        assert_eq!(refreshed.generation, 2);
    }

    #[tokio::test]
    async fn test_stale_publish_is_discarded() {
        let service = service(InMemoryEventSource::new("fine"));
        let key = service.key("s1", "a1", "1").unwrap();

        let stale_generation = service.next_generation(&key);
        let _newer = service.next_generation(&key);

        let report = TimelineReport {
            key: key.clone(),
            timeline: Arc::new(Timeline::empty()),
            fingerprint: Timeline::empty().fingerprint(),
            source_errors: Vec::new(),
            dropped: DropCounts::default(),
            merge: MergeStats::default(),
            generation: stale_generation,
            built_at: Utc::now(),
        };
        let outcome = service.publish(report, 0);

        assert!(outcome.is_superseded());
        assert!(service.cursor(&key).is_none());
        assert_eq!(service.cache_stats().entries, 0);
    }

    #[tokio::test]
    async fn test_cursor_requires_timeline() {
        let service = service(InMemoryEventSource::new("fine"));
        let key = service.key("s1", "a1", "1").unwrap();
        assert!(service.cursor(&key).is_none());
        assert!(service.next(&key).is_none());

        service.get_timeline(&key).await.unwrap();
        let view = service.cursor(&key).unwrap();
        assert_eq!(view.position, None);
        assert_eq!(view.len, 0);
    }
}
