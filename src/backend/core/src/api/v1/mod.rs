//! V1 API module: timelines, playback cursors and activity summaries.

pub mod routes;

pub use routes::{paths, v1_router, V1_PREFIX};
