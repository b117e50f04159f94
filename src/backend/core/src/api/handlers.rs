//! API request handlers.
//!
//! All handlers return `Result<_, TrailError>` so that errors are converted
//! to HTTP responses by the `IntoResponse` implementation on `TrailError`.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::{ApiResponse, AppState};
use crate::cache::TimelineKey;
use crate::error::{Result, TrailError};
use crate::service::PipelineOutcome;
use crate::timeline::CursorView;

/// Default activity window, in days.
pub const DEFAULT_ACTIVITY_DAYS: u32 = 7;

// ═══════════════════════════════════════════════════════════════════════════════
// Health & Metrics
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (status, database) = match &state.db {
        None => (StatusCode::OK, "disabled"),
        Some(db) => match db.health_check().await {
            Ok(()) => (StatusCode::OK, "connected"),
            Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        },
    };

    let cache = state.service.cache_stats();
    (
        status,
        Json(serde_json::json!({
            "status": if status.is_success() { "healthy" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
            "database": database,
            "cached_timelines": cache.entries,
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

pub async fn prometheus_metrics() -> impl IntoResponse {
    let body = crate::telemetry::MetricsRegistry::global().render();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Timelines
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct TimelinePath {
    pub student: String,
    pub assignment: String,
    pub exercise: String,
}

impl TimelinePath {
    fn key(&self, state: &AppState) -> Result<TimelineKey> {
        state.service.key(&self.student, &self.assignment, &self.exercise)
    }
}

fn etag(fingerprint: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("\"{}\"", fingerprint)).ok()
}

/// Render a pipeline outcome. A superseded run answers 204 with no body.
fn outcome_response(outcome: PipelineOutcome, headers: Option<&HeaderMap>) -> Response {
    let report = match outcome {
        PipelineOutcome::Fresh(report) => report,
        PipelineOutcome::Superseded { .. } => return StatusCode::NO_CONTENT.into_response(),
    };

    let tag = etag(&report.fingerprint);
    let not_modified = match (headers.and_then(|h| h.get(header::IF_NONE_MATCH)), &tag) {
        (Some(seen), Some(tag)) => seen == tag,
        _ => false,
    };

    let mut response = if not_modified {
        StatusCode::NOT_MODIFIED.into_response()
    } else {
        Json(ApiResponse::success(&*report)).into_response()
    };
    if let Some(tag) = tag {
        response.headers_mut().insert(header::ETAG, tag);
    }
    response
}

pub async fn get_timeline(
    State(state): State<AppState>,
    Path(path): Path<TimelinePath>,
    headers: HeaderMap,
) -> Result<Response> {
    let key = path.key(&state)?;
    let outcome = state.service.get_timeline(&key).await?;
    Ok(outcome_response(outcome, Some(&headers)))
}

pub async fn refresh_timeline(
    State(state): State<AppState>,
    Path(path): Path<TimelinePath>,
) -> Result<Response> {
    let key = path.key(&state)?;
    let outcome = state.service.refresh(&key).await?;
    Ok(outcome_response(outcome, None))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Playback Cursor
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize, Deserialize)]
pub struct SeekRequest {
    pub position: usize,
}

fn cursor_response(key: &TimelineKey, view: Option<CursorView>) -> Result<Json<ApiResponse<CursorView>>> {
    view.map(|view| Json(ApiResponse::success(view)))
        .ok_or_else(|| TrailError::not_found("Timeline", key.to_string()))
}

pub async fn get_cursor(
    State(state): State<AppState>,
    Path(path): Path<TimelinePath>,
) -> Result<Json<ApiResponse<CursorView>>> {
    let key = path.key(&state)?;
    cursor_response(&key, state.service.cursor(&key))
}

pub async fn seek_cursor(
    State(state): State<AppState>,
    Path(path): Path<TimelinePath>,
    Json(req): Json<SeekRequest>,
) -> Result<Json<ApiResponse<CursorView>>> {
    let key = path.key(&state)?;
    cursor_response(&key, state.service.seek(&key, req.position))
}

pub async fn next_cursor(
    State(state): State<AppState>,
    Path(path): Path<TimelinePath>,
) -> Result<Json<ApiResponse<CursorView>>> {
    let key = path.key(&state)?;
    cursor_response(&key, state.service.next(&key))
}

pub async fn previous_cursor(
    State(state): State<AppState>,
    Path(path): Path<TimelinePath>,
) -> Result<Json<ApiResponse<CursorView>>> {
    let key = path.key(&state)?;
    cursor_response(&key, state.service.previous(&key))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Activity
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ActivityQuery {
    /// Window in days; `0` means all recorded activity.
    pub days: Option<u32>,
}

pub async fn get_activity(
    State(state): State<AppState>,
    Path(path): Path<TimelinePath>,
    Query(query): Query<ActivityQuery>,
) -> Result<Response> {
    let key = path.key(&state)?;
    let days = query.days.unwrap_or(DEFAULT_ACTIVITY_DAYS);
    match state.service.activity(&key, Some(days)).await? {
        Some(buckets) => Ok(Json(ApiResponse::success(buckets)).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}
