//! Timeline construction, diffing and playback.
//!
//! - **`builder`**: Sorting merged events into a [`Timeline`].
//! - **`diff`**: The line-level [`DiffResult`] engine.
//! - **`cursor`**: A bounded [`PlaybackCursor`] for stepping through entries.
//! - **`activity`**: Per-day activity buckets.

pub mod activity;
pub mod builder;
pub mod cursor;
pub mod diff;

pub use activity::{summarize, ActivityBucket};
pub use builder::{build, build_with, BuildOptions, Timeline, TimelineEntry};
pub use cursor::{CursorView, PlaybackCursor};
pub use diff::{diff, positional_diff, DiffResult, DiffStats, LineKind, LineOp};
