//! Event ingestion and merging.
//!
//! - **`record`**: The normalized [`RawEvent`] shape and field parsing.
//! - **`source`**: The [`EventSource`] trait and the in-memory store.
//! - **`ingest`**: Concurrent dual-source fetching with per-source degradation.
//! - **`merge`**: Union of both streams with second-granularity de-duplication.

pub mod ingest;
pub mod merge;
pub mod record;
pub mod source;

pub use ingest::{DropCounts, EventIngestor, IngestBatch, IngestConfig};
pub use merge::{merge, promote_coarse, MergeStats};
pub use record::{parse_timestamp, ActionKind, LineChange, RawChanges, RawEvent, SourceKind};
pub use source::{EventSource, InMemoryEventSource, SeedData, SourceQuery};
