//! API middleware for request metrics and standard response headers.

use axum::{
    extract::{MatchedPath, Request},
    http::header::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::telemetry::RequestDurationHistogram;

/// Version reported in the `x-api-version` header.
pub const API_VERSION: &str = "1.0";

/// Record request duration and count, labelled by the matched route so that
/// path parameters do not explode label cardinality.
pub async fn track_request_metrics(req: Request, next: Next) -> Response {
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let timer = RequestDurationHistogram::start(req.method().as_str(), &path);

    let response = next.run(req).await;
    timer.finish(response.status().as_u16());
    response
}

/// Middleware that adds standard API response headers.
pub async fn api_version_headers(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| HeaderValue::from_str(s).ok());

    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    let _ = headers.try_insert(
        HeaderName::from_static("x-api-version"),
        HeaderValue::from_static(API_VERSION),
    );
    if let Some(request_id) = request_id {
        let _ = headers.try_insert(HeaderName::from_static("x-request-id"), request_id);
    }
    let _ = headers.try_insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );

    response
}
