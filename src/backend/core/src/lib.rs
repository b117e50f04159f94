#![allow(clippy::result_large_err)]
//! # Codetrail Core
//!
//! Code evolution reconstruction and diff engine: rebuilds the history of a
//! student's code on one exercise from two inconsistently keyed event stores.
//!
//! ## Architecture
//!
//! - **Identity**: Resolves an exercise reference into all of its encodings
//! - **Events**: Concurrent dual-source ingestion, normalization and merging
//! - **Timeline**: Chronological build, positional diffs and playback cursors
//! - **Service**: Typed cache, request generations and per-key cursors
//! - **API**: Axum HTTP surface over the service
//! - **Telemetry**: Structured logging and Prometheus metrics

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod identity;
pub mod service;
pub mod telemetry;
pub mod timeline;

pub use error::{ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result, SourceError, TrailError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::TimelineKey;
    pub use crate::error::{ErrorCode, ErrorContext, Result, SourceError, TrailError};
    pub use crate::events::{
        merge, ActionKind, EventIngestor, EventSource, InMemoryEventSource, IngestBatch, IngestConfig,
        MergeStats, RawChanges, RawEvent, SourceKind,
    };
    pub use crate::identity::{ExerciseIdentity, ExerciseRef, IdentityResolver};
    pub use crate::service::{PipelineOutcome, TimelineReport, TimelineService};
    pub use crate::timeline::{
        build, diff, BuildOptions, CursorView, DiffResult, LineKind, LineOp, PlaybackCursor, Timeline,
        TimelineEntry,
    };
}
