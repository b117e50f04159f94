//! V1 API routes.

use axum::{
    routing::{get, post},
    Router,
};

use crate::api::{handlers, AppState};

/// V1 API prefix.
pub const V1_PREFIX: &str = "/api/v1";

/// Build the V1 API router.
///
/// All routes are mounted under `/api/v1/`.
///
/// # Endpoints
///
/// ## Timelines
/// - `GET /api/v1/timelines/:student/:assignment/:exercise` - Get (or build) a timeline
/// - `POST /api/v1/timelines/:student/:assignment/:exercise/refresh` - Rebuild a timeline
///
/// ## Playback
/// - `GET /api/v1/timelines/:student/:assignment/:exercise/cursor` - Current cursor
/// - `POST /api/v1/timelines/:student/:assignment/:exercise/cursor/seek` - Seek to `{ position }`
/// - `POST /api/v1/timelines/:student/:assignment/:exercise/cursor/next` - Step forward
/// - `POST /api/v1/timelines/:student/:assignment/:exercise/cursor/previous` - Step back
///
/// ## Activity
/// - `GET /api/v1/timelines/:student/:assignment/:exercise/activity?days=n` - Daily activity
pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/timelines/:student/:assignment/:exercise", get(handlers::get_timeline))
        .route(
            "/timelines/:student/:assignment/:exercise/refresh",
            post(handlers::refresh_timeline),
        )
        .route(
            "/timelines/:student/:assignment/:exercise/cursor",
            get(handlers::get_cursor),
        )
        .route(
            "/timelines/:student/:assignment/:exercise/cursor/seek",
            post(handlers::seek_cursor),
        )
        .route(
            "/timelines/:student/:assignment/:exercise/cursor/next",
            post(handlers::next_cursor),
        )
        .route(
            "/timelines/:student/:assignment/:exercise/cursor/previous",
            post(handlers::previous_cursor),
        )
        .route(
            "/timelines/:student/:assignment/:exercise/activity",
            get(handlers::get_activity),
        )
}

/// V1 API route constants for use in clients and documentation.
pub mod paths {
    pub const TIMELINE: &str = "/api/v1/timelines/:student/:assignment/:exercise";
    pub const TIMELINE_REFRESH: &str = "/api/v1/timelines/:student/:assignment/:exercise/refresh";
    pub const CURSOR: &str = "/api/v1/timelines/:student/:assignment/:exercise/cursor";
    pub const CURSOR_SEEK: &str = "/api/v1/timelines/:student/:assignment/:exercise/cursor/seek";
    pub const CURSOR_NEXT: &str = "/api/v1/timelines/:student/:assignment/:exercise/cursor/next";
    pub const CURSOR_PREVIOUS: &str = "/api/v1/timelines/:student/:assignment/:exercise/cursor/previous";
    pub const ACTIVITY: &str = "/api/v1/timelines/:student/:assignment/:exercise/activity";

    /// Substitute the path parameters of a route template.
    pub fn timeline_path(template: &str, student: &str, assignment: &str, exercise: &str) -> String {
        template
            .replace(":student", student)
            .replace(":assignment", assignment)
            .replace(":exercise", exercise)
    }
}

#[cfg(test)]
mod tests {
    use super::paths;

    #[test]
    fn test_timeline_path() {
        assert_eq!(
            paths::timeline_path(paths::CURSOR_SEEK, "s1", "a1", "3"),
            "/api/v1/timelines/s1/a1/3/cursor/seek"
        );
    }
}
