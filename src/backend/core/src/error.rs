//! Error handling for Codetrail Core.
//!
//! One error type, [`TrailError`], carries a stable [`ErrorCode`], a message
//! that is safe to show to API clients, optional internal detail for the
//! logs, and structured context. Every code maps to an HTTP status, a
//! category and a severity through a single table ([`ErrorCode::info`]).
//!
//! Most failures inside the reconstruction pipeline are *not* surfaced as
//! errors: a failing event source degrades to an empty stream and is reported
//! as a [`SourceError`] next to the timeline. `TrailError` is reserved for the
//! boundaries (configuration, storage adapters, HTTP input validation).
//!
//! # Usage
//!
//! ```rust,ignore
//! use codetrail_core::error::{ErrorContext, Result};
//!
//! fn load_seed(path: &str) -> Result<String> {
//!     std::fs::read_to_string(path).context("Failed to read seed file")
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::events::SourceKind;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TrailError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Stable, machine-readable error codes. Serialized in SCREAMING_SNAKE_CASE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Pipeline
    SourceUnavailable,
    MalformedRecord,
    StaleResult,

    // Lookup & input
    RecordNotFound,
    ValidationError,

    // Storage
    DatabaseError,
    DatabaseConnectionFailed,
    DatabaseQueryFailed,

    // Serialization
    SerializationError,
    DeserializationError,

    // Configuration
    ConfigurationError,
    MissingConfiguration,
    InvalidConfiguration,

    // Internal
    TimeLimitExceeded,
    InternalError,
}

/// Static facts about one error code.
#[derive(Debug, Clone, Copy)]
pub struct CodeInfo {
    pub numeric: u32,
    pub status: StatusCode,
    pub category: &'static str,
    pub severity: ErrorSeverity,
    pub retryable: bool,
}

const fn info(
    numeric: u32,
    status: StatusCode,
    category: &'static str,
    severity: ErrorSeverity,
    retryable: bool,
) -> CodeInfo {
    CodeInfo {
        numeric,
        status,
        category,
        severity,
        retryable,
    }
}

impl ErrorCode {
    pub const fn info(&self) -> CodeInfo {
        use ErrorSeverity::*;
        use StatusCode as S;
        match self {
            Self::SourceUnavailable => info(1000, S::SERVICE_UNAVAILABLE, "pipeline", Medium, true),
            Self::MalformedRecord => info(1001, S::UNPROCESSABLE_ENTITY, "pipeline", Low, false),
            Self::StaleResult => info(1002, S::CONFLICT, "pipeline", Low, true),

            Self::RecordNotFound => info(2004, S::NOT_FOUND, "lookup", Low, false),
            Self::ValidationError => info(4100, S::UNPROCESSABLE_ENTITY, "validation", Low, false),

            Self::DatabaseError => info(3000, S::INTERNAL_SERVER_ERROR, "database", High, false),
            Self::DatabaseConnectionFailed => info(3001, S::SERVICE_UNAVAILABLE, "database", Critical, true),
            Self::DatabaseQueryFailed => info(3002, S::INTERNAL_SERVER_ERROR, "database", High, true),

            Self::SerializationError => info(3200, S::INTERNAL_SERVER_ERROR, "serialization", High, false),
            Self::DeserializationError => info(3201, S::INTERNAL_SERVER_ERROR, "serialization", High, false),

            Self::ConfigurationError => info(5000, S::INTERNAL_SERVER_ERROR, "configuration", High, false),
            Self::MissingConfiguration => info(5001, S::INTERNAL_SERVER_ERROR, "configuration", High, false),
            Self::InvalidConfiguration => info(5002, S::INTERNAL_SERVER_ERROR, "configuration", High, false),

            Self::TimeLimitExceeded => info(9002, S::GATEWAY_TIMEOUT, "internal", Medium, true),
            Self::InternalError => info(9000, S::INTERNAL_SERVER_ERROR, "internal", Critical, false),
        }
    }

    pub const fn numeric_code(&self) -> u32 {
        self.info().numeric
    }

    pub const fn http_status(&self) -> StatusCode {
        self.info().status
    }

    pub const fn is_retryable(&self) -> bool {
        self.info().retryable
    }

    pub const fn category(&self) -> &'static str {
        self.info().category
    }

    pub const fn severity(&self) -> ErrorSeverity {
        self.info().severity
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// How loudly an error is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Bad input, skipped records, superseded results
    Low,
    /// One source down, timeouts
    Medium,
    /// Storage or serialization failures
    High,
    /// The service cannot answer at all
    Critical,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Structured context attached to an error and returned to clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,

    /// Kind of the entity involved (`Timeline`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl ErrorDetails {
    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.context.is_empty() && self.entity_type.is_none() && self.entity_id.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub struct TrailError {
    code: ErrorCode,
    /// Safe to expose to clients.
    user_message: Cow<'static, str>,
    /// Logged, never returned.
    internal_message: Option<String>,
    details: ErrorDetails,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for TrailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " ({})", internal)?;
        }
        Ok(())
    }
}

impl TrailError {
    /// Create an error and count it in `codetrail_errors_total`.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        counter!(
            "codetrail_errors_total",
            "code" => code.to_string(),
            "category" => code.category(),
        )
        .increment(1);

        Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        }
    }

    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        let details = ErrorDetails::default().with_entity(entity_type, entity_id);
        let message = format!(
            "{} not found: {}",
            details.entity_type.as_deref().unwrap_or_default(),
            details.entity_id.as_deref().unwrap_or_default()
        );
        Self::new(ErrorCode::RecordNotFound, message).with_details(details)
    }

    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// An event source could not be queried or did not answer in time.
    pub fn source_unavailable(source: SourceKind, message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::SourceUnavailable,
            format!("The {} event source is unavailable", source),
            message,
        )
        .with_context("source", source)
    }

    /// A raw record could not be normalized.
    pub fn malformed_record(source: SourceKind, reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::MalformedRecord,
            format!("Malformed {} record: {}", source, reason.into()),
        )
        .with_context("source", source)
    }

    /// A pipeline result that arrived after a newer request generation.
    pub fn stale_result(generation: u64, latest: u64) -> Self {
        Self::new(
            ErrorCode::StaleResult,
            format!("Result of generation {} superseded by generation {}", generation, latest),
        )
        .with_context("generation", generation)
        .with_context("latest", latest)
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.code.severity()
    }

    /// Log at a level matching the code's severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();
        match self.severity() {
            ErrorSeverity::Critical | ErrorSeverity::High => error!(
                error_code = %code,
                category,
                http_status = self.http_status().as_u16(),
                user_message = %self.user_message,
                internal_message = ?self.internal_message,
                source = ?self.source,
                "{}",
                if self.severity() == ErrorSeverity::Critical { "Critical error" } else { "Request failed" }
            ),
            ErrorSeverity::Medium => warn!(
                error_code = %code,
                category,
                user_message = %self.user_message,
                internal_message = ?self.internal_message,
                "Degraded operation"
            ),
            ErrorSeverity::Low => debug!(
                error_code = %code,
                category,
                user_message = %self.user_message,
                context = ?self.details.context,
                "Rejected or skipped"
            ),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Source Diagnostics
// ═══════════════════════════════════════════════════════════════════════════════

/// Serializable record of a source failure, carried next to a timeline.
///
/// Source failures never abort a pipeline run; they are collected here so the
/// caller can show why a timeline is shorter (or empty) than expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    pub source: SourceKind,
    pub code: ErrorCode,
    pub message: String,
}

impl SourceError {
    pub fn from_error(source: SourceKind, error: &TrailError) -> Self {
        let message = match error.internal_message() {
            Some(internal) => format!("{}: {}", error.user_message(), internal),
            None => error.user_message().to_string(),
        };
        Self {
            source,
            code: error.code(),
            message,
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} source [{}]: {}", self.source, self.code, self.message)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HTTP
// ═══════════════════════════════════════════════════════════════════════════════

/// Error body returned to API clients. Shares `success`, `error` and
/// `error_code` with the success envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: ErrorCode,
    pub numeric_code: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&TrailError> for ErrorResponse {
    fn from(error: &TrailError) -> Self {
        Self {
            success: false,
            error: error.user_message().to_string(),
            error_code: error.code,
            numeric_code: error.code.numeric_code(),
            details: Some(error.details.clone()).filter(|d| !d.is_empty()),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl IntoResponse for TrailError {
    fn into_response(self) -> Response {
        self.log();
        (self.http_status(), Json(ErrorResponse::from(&self))).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Context Extension
// ═══════════════════════════════════════════════════════════════════════════════

/// Attach a message or code while converting foreign errors.
pub trait ErrorContext<T> {
    fn context(self, message: impl Into<String>) -> Result<T>;

    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| TrailError::internal(message.into()).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| TrailError::new(code, e.to_string()).with_source(e))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| TrailError::new(ErrorCode::RecordNotFound, message.into()))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.ok_or_else(|| TrailError::new(code, "Value missing"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Conversions
// ═══════════════════════════════════════════════════════════════════════════════

impl From<sqlx::Error> for TrailError {
    fn from(error: sqlx::Error) -> Self {
        let (code, message) = match &error {
            sqlx::Error::RowNotFound => (ErrorCode::RecordNotFound, "The requested record was not found"),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                (ErrorCode::DatabaseConnectionFailed, "The event database is unreachable")
            }
            sqlx::Error::Database(_) => (ErrorCode::DatabaseQueryFailed, "An event query failed"),
            _ => (ErrorCode::DatabaseError, "A database error occurred"),
        };
        Self::with_internal(code, message, error.to_string()).with_source(error)
    }
}

impl From<sqlx::migrate::MigrateError> for TrailError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::with_internal(ErrorCode::DatabaseError, "Database migration failed", error.to_string())
            .with_source(error)
    }
}

impl From<serde_json::Error> for TrailError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_io() {
            ErrorCode::SerializationError
        } else {
            ErrorCode::DeserializationError
        };
        Self::with_internal(code, "Failed to process JSON data", error.to_string()).with_source(error)
    }
}

impl From<tokio::time::error::Elapsed> for TrailError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        Self::with_internal(ErrorCode::TimeLimitExceeded, "Operation timed out", error.to_string())
            .with_source(error)
    }
}

impl From<std::io::Error> for TrailError {
    fn from(error: std::io::Error) -> Self {
        let (code, message) = match error.kind() {
            std::io::ErrorKind::NotFound => (ErrorCode::RecordNotFound, "File not found"),
            std::io::ErrorKind::TimedOut => (ErrorCode::TimeLimitExceeded, "Operation timed out"),
            _ => (ErrorCode::InternalError, "An I/O error occurred"),
        };
        Self::with_internal(code, message, error.to_string()).with_source(error)
    }
}

impl From<anyhow::Error> for TrailError {
    fn from(error: anyhow::Error) -> Self {
        error
            .downcast::<TrailError>()
            .unwrap_or_else(|other| TrailError::internal(format!("{:#}", other)))
    }
}

impl From<config::ConfigError> for TrailError {
    fn from(error: config::ConfigError) -> Self {
        let (code, message) = match &error {
            config::ConfigError::NotFound(_) => (ErrorCode::MissingConfiguration, "Required configuration not found"),
            config::ConfigError::PathParse(_) | config::ConfigError::FileParse { .. } => {
                (ErrorCode::InvalidConfiguration, "Configuration file is invalid")
            }
            _ => (ErrorCode::ConfigurationError, "Configuration error"),
        };
        Self::with_internal(code, message, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_table() {
        assert_eq!(ErrorCode::RecordNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::SourceUnavailable.http_status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ErrorCode::ValidationError.category(), "validation");
        assert_eq!(ErrorCode::StaleResult.category(), "pipeline");
        assert_eq!(ErrorCode::ValidationError.numeric_code(), 4100);
        assert!(ErrorCode::SourceUnavailable.is_retryable());
        assert!(!ErrorCode::MalformedRecord.is_retryable());
    }

    #[test]
    fn test_serialized_code() {
        let json = serde_json::to_string(&ErrorCode::RecordNotFound).unwrap();
        assert_eq!(json, "\"RECORD_NOT_FOUND\"");
        assert_eq!(ErrorCode::RecordNotFound.to_string(), "RecordNotFound");
    }

    #[test]
    fn test_display_includes_internal_message() {
        let err = TrailError::source_unavailable(SourceKind::Coarse, "connection refused");
        let text = err.to_string();
        assert!(text.contains("SourceUnavailable"));
        assert!(text.contains("connection refused"));
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert_eq!(err.details().context["source"], "coarse");
    }

    #[test]
    fn test_source_error_from_trail_error() {
        let err = TrailError::source_unavailable(SourceKind::Fine, "timeout");
        let diag = SourceError::from_error(SourceKind::Fine, &err);
        assert_eq!(diag.code, ErrorCode::SourceUnavailable);
        assert!(diag.message.contains("timeout"));
    }

    #[test]
    fn test_error_response_details() {
        let response = ErrorResponse::from(&TrailError::validation("student_id must not be empty"));
        assert!(!response.success);
        assert!(response.details.is_none());

        let response = ErrorResponse::from(&TrailError::not_found("Timeline", "timeline:s1:a1:3"));
        let details = response.details.unwrap();
        assert_eq!(details.entity_type.as_deref(), Some("Timeline"));
        assert_eq!(response.error, "Timeline not found: timeline:s1:a1:3");
    }

    #[test]
    fn test_option_context() {
        let missing: Option<u32> = None;
        let err = missing.context("cursor").unwrap_err();
        assert_eq!(err.code(), ErrorCode::RecordNotFound);
    }

    #[test]
    fn test_anyhow_round_trip_keeps_code() {
        let original = TrailError::stale_result(1, 2);
        let back = TrailError::from(anyhow::Error::new(original));
        assert_eq!(back.code(), ErrorCode::StaleResult);
    }
}
