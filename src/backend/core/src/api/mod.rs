//! HTTP API for Codetrail Core.
//!
//! - `GET /health` and `GET /metrics` are unversioned.
//! - Timeline, cursor and activity routes live under `/api/v1/`.
//!
//! Successful responses use the [`ApiResponse`] envelope; errors are
//! rendered by the `IntoResponse` implementation on
//! [`TrailError`](crate::error::TrailError).

mod handlers;
pub mod middleware;
pub mod v1;

use axum::{middleware as axum_middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::db::Database;
use crate::service::TimelineService;

pub use handlers::{ActivityQuery, SeekRequest};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TimelineService>,
    /// Present when the event sources are backed by PostgreSQL.
    pub db: Option<Database>,
}

impl AppState {
    pub fn new(service: Arc<TimelineService>) -> Self {
        Self { service, db: None }
    }

    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([axum::http::header::ETAG]);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .nest(v1::V1_PREFIX, v1::v1_router())
        .route_layer(axum_middleware::from_fn(middleware::track_request_metrics))
        .layer(axum_middleware::from_fn(middleware::api_version_headers))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

/// API response wrapper.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            error_code: None,
        }
    }

    pub fn from_error(err: &crate::error::TrailError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.user_message().to_string()),
            error_code: Some(err.code().to_string()),
        }
    }
}
