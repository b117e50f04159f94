//! Telemetry: structured logging and Prometheus metrics.
//!
//! Logging goes through `tracing` with either a pretty or a JSON formatter;
//! metrics are recorded with the `metrics` facade and exposed in Prometheus
//! text format at `GET /metrics`.
//!
//! ```rust,no_run
//! use codetrail_core::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let registry = init_telemetry(&TelemetryConfig::default()).unwrap();
//! println!("{}", registry.render());
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{init_metrics, MetricsConfig, MetricsRegistry, RequestDurationHistogram, RequestTimer};

use serde::Deserialize;

/// Logging and metrics settings, read from the `[telemetry]` config table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `service` label on every metric
    pub service_name: String,
    /// Selects the default log format
    pub environment: String,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "codetrail".into(),
            environment: "development".into(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// Install the log subscriber, then the Prometheus recorder.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<MetricsRegistry> {
    init_logging(&config.logging, &config.environment)?;
    init_metrics(&config.metrics, &config.service_name)
}
