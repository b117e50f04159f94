//! Configuration management.
//!
//! Values come from an optional file (path in `CODETRAIL_CONFIG`) overlaid
//! by environment variables such as `CODETRAIL__SERVER__PORT=9000`.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::events::IngestConfig;
use crate::telemetry::{LoggingConfig, MetricsConfig, TelemetryConfig};
use crate::timeline::BuildOptions;

/// Environment variable holding the config file path.
pub const CONFIG_PATH_ENV: &str = "CODETRAIL_CONFIG";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "CODETRAIL";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Event ingestion configuration
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Timeline build configuration
    #[serde(default)]
    pub timeline: TimelineConfig,

    /// Report cache configuration
    #[serde(default)]
    pub cache: CacheSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment name (development, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL. Without one the server runs on in-memory
    /// event sources.
    #[serde(default)]
    pub url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout
    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,

    /// Apply migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout: default_acquire_timeout(),
            run_migrations: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    /// Per-source query timeout
    #[serde(default = "default_source_timeout", with = "humantime_serde")]
    pub source_timeout: Duration,

    /// Maximum records fetched from each source
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,

    /// Query by student only when an assignment has no records
    #[serde(default = "default_true")]
    pub assignment_fallback: bool,

    /// JSON file `{ "fine": [...], "coarse": [...] }` for the in-memory sources
    #[serde(default)]
    pub seed_file: Option<PathBuf>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            source_timeout: default_source_timeout(),
            fetch_limit: default_fetch_limit(),
            assignment_fallback: true,
            seed_file: None,
        }
    }
}

impl IngestionConfig {
    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            source_timeout: self.source_timeout,
            fetch_limit: self.fetch_limit,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimelineConfig {
    /// Drop snapshots identical to their predecessor
    #[serde(default)]
    pub collapse_unchanged: bool,
}

impl TimelineConfig {
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions::default().with_collapse_unchanged(self.collapse_unchanged)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Lifetime of a cached timeline
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub ttl: Duration,

    /// Maximum cached timelines
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: default_cache_ttl(),
            max_entries: default_cache_max_entries(),
        }
    }
}

impl CacheSettings {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: self.ttl,
            max_entries: self.max_entries,
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_environment() -> String { "development".to_string() }
fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 1 }
fn default_acquire_timeout() -> Duration { Duration::from_secs(5) }
fn default_source_timeout() -> Duration { Duration::from_secs(10) }
fn default_fetch_limit() -> usize { 1000 }
fn default_cache_ttl() -> Duration { Duration::from_secs(60) }
fn default_cache_max_entries() -> usize { 1024 }
fn default_true() -> bool { true }

impl Config {
    /// Load configuration from `CODETRAIL_CONFIG` (if set) and environment.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim()),
            _ => Self::build(None),
        }
    }

    /// Load from a specific file path, still overlaid by environment.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        Self::build(Some(path))
    }

    fn build(path: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.ingestion.fetch_limit > 0, "ingestion.fetch_limit must be positive");
        anyhow::ensure!(
            !self.ingestion.source_timeout.is_zero(),
            "ingestion.source_timeout must be positive"
        );
        anyhow::ensure!(!self.cache.ttl.is_zero(), "cache.ttl must be positive");
        anyhow::ensure!(
            self.database.min_connections <= self.database.max_connections,
            "database.min_connections ({}) exceeds database.max_connections ({})",
            self.database.min_connections,
            self.database.max_connections
        );
        Ok(())
    }

    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            environment: self.server.environment.clone(),
            logging: self.logging.clone(),
            metrics: self.metrics.clone(),
            ..TelemetryConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert!(config.database.url.is_none());
        assert_eq!(config.ingestion.source_timeout, Duration::from_secs(10));
        assert_eq!(config.ingestion.fetch_limit, 1000);
        assert!(config.ingestion.assignment_fallback);
        assert!(!config.timeline.collapse_unchanged);
        assert_eq!(config.cache.ttl, Duration::from_secs(60));
        assert_eq!(config.cache.max_entries, 1024);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9100

[ingestion]
source_timeout = "250ms"
seed_file = "seed.json"

[timeline]
collapse_unchanged = true

[cache]
ttl = "5m"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.ingestion.source_timeout, Duration::from_millis(250));
        assert_eq!(config.ingestion.seed_file, Some(PathBuf::from("seed.json")));
        assert!(config.timeline.build_options().collapse_unchanged);
        assert_eq!(config.cache.cache_config().ttl, Duration::from_secs(300));
        assert_eq!(config.cache.max_entries, 1024);
    }

    #[test]
    fn test_rejects_unusable_settings() {
        assert!(Config::default().validate().is_ok());

        let mut config = Config::default();
        config.ingestion.fetch_limit = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.database.min_connections = 20;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("min_connections"));

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[cache]\nttl = \"0s\"").unwrap();
        assert!(Config::from_file(file.path().to_str().unwrap()).is_err());
    }
}
