//! Prometheus metrics.
//!
//! The recorder is installed once per process; [`MetricsRegistry::global`]
//! renders whatever has been recorded so far for the `/metrics` endpoint.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Instant;

/// Handle of the installed Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Histogram buckets for durations (in seconds)
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,

    /// Global labels to add to all metrics
    #[serde(default)]
    pub global_labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            duration_buckets: default_duration_buckets(),
            global_labels: HashMap::new(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_duration_buckets() -> Vec<f64> {
    vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
}

/// Access to the process-wide recorder.
#[derive(Debug, Clone, Copy)]
pub struct MetricsRegistry;

impl MetricsRegistry {
    pub fn global() -> Self {
        Self
    }

    pub fn is_installed(&self) -> bool {
        PROMETHEUS_HANDLE.get().is_some()
    }

    /// Render all metrics in Prometheus text format. Empty when no recorder
    /// was installed.
    pub fn render(&self) -> String {
        PROMETHEUS_HANDLE
            .get()
            .map(PrometheusHandle::render)
            .unwrap_or_default()
    }
}

/// Install the Prometheus recorder.
///
/// A second call is a no-op, so tests and embedded servers can call it
/// freely.
pub fn init_metrics(config: &MetricsConfig, service_name: &str) -> anyhow::Result<MetricsRegistry> {
    if !config.enabled || PROMETHEUS_HANDLE.get().is_some() {
        return Ok(MetricsRegistry);
    }

    let mut builder = PrometheusBuilder::new().add_global_label("service", service_name);
    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key, value);
    }
    builder = builder.set_buckets(&config.duration_buckets)?;

    let handle = builder.install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle);
    register_metric_descriptions();

    tracing::info!(service_name = %service_name, "Metrics initialized");
    Ok(MetricsRegistry)
}

fn register_metric_descriptions() {
    describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!("http_requests_total", "Total number of HTTP requests");

    describe_counter!("codetrail_errors_total", "Errors raised, by code and category");
    describe_counter!("codetrail_pipeline_runs_total", "Timeline pipeline runs");
    describe_histogram!(
        "codetrail_pipeline_duration_seconds",
        "Duration of one timeline pipeline run"
    );
    describe_counter!(
        "codetrail_source_failures_total",
        "Event source queries that failed or timed out"
    );
    describe_counter!(
        "codetrail_records_dropped_total",
        "Raw records skipped as malformed"
    );
    describe_counter!(
        "codetrail_dedup_discarded_total",
        "Duplicate records discarded while merging"
    );
    describe_counter!(
        "codetrail_stale_results_total",
        "Pipeline results discarded because a newer request superseded them"
    );
    describe_counter!("codetrail_cache_hits_total", "Timeline cache hits");
    describe_counter!("codetrail_cache_misses_total", "Timeline cache misses");
}

/// HTTP request duration recording.
pub struct RequestDurationHistogram;

impl RequestDurationHistogram {
    pub fn record(method: &str, path: &str, status: u16, duration_secs: f64) {
        histogram!(
            "http_request_duration_seconds",
            "method" => method.to_string(),
            "path" => path.to_string(),
            "status" => status.to_string(),
        )
        .record(duration_secs);

        counter!(
            "http_requests_total",
            "method" => method.to_string(),
            "path" => path.to_string(),
            "status" => status.to_string(),
        )
        .increment(1);
    }

    pub fn start(method: &str, path: &str) -> RequestTimer {
        RequestTimer {
            method: method.to_string(),
            path: path.to_string(),
            start: Instant::now(),
        }
    }
}

/// Timer that records a request duration when finished.
pub struct RequestTimer {
    method: String,
    path: String,
    start: Instant,
}

impl RequestTimer {
    pub fn finish(self, status: u16) {
        RequestDurationHistogram::record(
            &self.method,
            &self.path,
            status,
            self.start.elapsed().as_secs_f64(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_metrics_render_empty() {
        let config = MetricsConfig {
            enabled: false,
            ..MetricsConfig::default()
        };
        let registry = init_metrics(&config, "codetrail-test").unwrap();
        if !registry.is_installed() {
            assert!(registry.render().is_empty());
        }
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        RequestDurationHistogram::start("GET", "/health").finish(200);
    }
}
