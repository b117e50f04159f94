//! HTTP tests for the API router.
//!
//! Tests cover:
//! - Health check and metrics endpoints
//! - Timeline retrieval, ETags and conditional requests
//! - Cursor navigation over a built timeline
//! - Activity summaries
//! - Error responses

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use codetrail_core::api::{build_router, AppState};
use codetrail_core::events::{EventIngestor, EventSource, InMemoryEventSource, IngestConfig};
use codetrail_core::service::TimelineService;
use serde_json::{json, Value};
use tower::ServiceExt;

// ============================================================================
// Helpers
// ============================================================================

const TIMELINE: &str = "/api/v1/timelines/s1/a1/2";

fn app() -> Router {
    let fine = InMemoryEventSource::with_records(
        "fine",
        vec![
            json!({"user_id": "s1", "exercise_id": 2, "timestamp": "2024-03-01T10:00:00Z", "code": "a=1"}),
            json!({"user_id": "s1", "exercise_id": 2, "timestamp": "2024-03-01T10:00:05Z", "code": "a=1\nb=2"}),
        ],
    );
    let coarse = InMemoryEventSource::with_records(
        "coarse",
        vec![json!({
            "user_id": "s1",
            "exercise_id": "2",
            "created_at": "2024-03-01T10:00:05Z",
            "code": "a=1\nb=2",
            "is_submission": true
        })],
    );
    let fine: Arc<dyn EventSource> = Arc::new(fine);
    let coarse: Arc<dyn EventSource> = Arc::new(coarse);
    let service = TimelineService::new(EventIngestor::new(fine, coarse, IngestConfig::default()));
    build_router(AppState::new(Arc::new(service)))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(Method::POST).uri(uri);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Health & Metrics
// ============================================================================

#[tokio::test]
async fn test_health_without_database() {
    let response = app().oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-api-version"], "1.0");
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "disabled");
    assert_eq!(body["cached_timelines"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint_is_plain_text() {
    let response = app().oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

// ============================================================================
// Timelines
// ============================================================================

#[tokio::test]
async fn test_get_timeline() {
    let response = app().oneshot(get(TIMELINE)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(header::ETAG));
    let body = body_json(response).await;
    assert_eq!(body["success"], true);

    let entries = body["data"]["timeline"]["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1]["action_kind"], "submission");
    assert_eq!(
        entries[1]["diff_from_previous"],
        json!([
            {"kind": "unchanged", "text": "a=1"},
            {"kind": "added", "text": "b=2"}
        ])
    );
    assert_eq!(body["data"]["generation"], 1);
}

#[tokio::test]
async fn test_matching_etag_is_not_modified() {
    let app = app();
    let first = app.clone().oneshot(get(TIMELINE)).await.unwrap();
    let etag = first.headers()[header::ETAG].clone();

    let request = Request::builder()
        .uri(TIMELINE)
        .header(header::IF_NONE_MATCH, etag.clone())
        .body(Body::empty())
        .unwrap();
    let second = app.oneshot(request).await.unwrap();

    assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(second.headers()[header::ETAG], etag);
}

#[tokio::test]
async fn test_refresh_issues_new_generation() {
    let app = app();
    app.clone().oneshot(get(TIMELINE)).await.unwrap();

    let response = app
        .oneshot(post(&format!("{}/refresh", TIMELINE), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["generation"], 2);
}

#[tokio::test]
async fn test_blank_student_is_rejected() {
    let response = app().oneshot(get("/api/v1/timelines/%20/a1/2")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
}

// ============================================================================
// Cursor
// ============================================================================

#[tokio::test]
async fn test_cursor_before_build_is_not_found() {
    let response = app()
        .oneshot(get(&format!("{}/cursor", TIMELINE)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "RECORD_NOT_FOUND");
}

#[tokio::test]
async fn test_cursor_navigation() {
    let app = app();
    app.clone().oneshot(get(TIMELINE)).await.unwrap();

    let response = app
        .clone()
        .oneshot(get(&format!("{}/cursor", TIMELINE)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["position"], 0);
    assert_eq!(body["data"]["len"], 2);
    assert!(body["data"]["entry"]["diff_from_previous"].is_null());

    let response = app
        .clone()
        .oneshot(post(&format!("{}/cursor/next", TIMELINE), None))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["position"], 1);
    assert_eq!(body["data"]["has_next"], false);

    let response = app
        .clone()
        .oneshot(post(&format!("{}/cursor/seek", TIMELINE), Some(json!({"position": 0}))))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["position"], 0);
    assert_eq!(body["data"]["entry"]["code"], "a=1");

    let response = app
        .oneshot(post(&format!("{}/cursor/previous", TIMELINE), None))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["position"], 0);
    assert_eq!(body["data"]["has_previous"], false);
}

// ============================================================================
// Activity
// ============================================================================

#[tokio::test]
async fn test_activity_all_time() {
    let response = app()
        .oneshot(get(&format!("{}/activity?days=0", TIMELINE)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let buckets = body["data"].as_array().unwrap();
    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0]["day"], "2024-03-01");
}

#[tokio::test]
async fn test_activity_default_window_excludes_old_records() {
    let response = app()
        .oneshot(get(&format!("{}/activity", TIMELINE)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}
