//! Configuration management for the fare prediction pipeline
//!
//! One [`AppConfig`] is built at startup and handed to the trainer, the
//! model store, the stream source, the sink and the scheduler. Nothing
//! reads configuration from globals after that.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Where scoring results are written
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Table rows on stdout
    #[default]
    Console,
    /// One JSON object per line, appended to `sink.path`
    Jsonl,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub models: ModelsConfig,
    pub training: TrainingConfig,
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Raw event feed connection
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub host: String,
    pub port: u16,
    /// Longest a single poll waits for the first new record
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    /// Reconnect attempts after the link drops (0 = connection loss is fatal)
    #[serde(default)]
    pub reconnect_attempts: u32,
    /// Delay before the first reconnect attempt, doubled after each failure
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
}

fn default_poll_timeout_ms() -> u64 {
    500
}

fn default_reconnect_backoff_ms() -> u64 {
    250
}

/// Model storage
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Directory holding one subdirectory per named model
    pub store_dir: PathBuf,
    /// Name the trainer saves under and the service loads
    pub name: String,
}

/// Offline training input
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Header-delimited CSV with distance_km and fare_amount columns
    pub dataset_path: PathBuf,
}

/// Micro-batch scheduling
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Fixed trigger interval between batches
    pub trigger_interval_ms: u64,
    /// Upper bound on records drained per batch
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_max_batch_size() -> usize {
    1024
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SinkConfig {
    #[serde(default)]
    pub kind: SinkKind,
    /// Output file for the jsonl sink
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between metric summaries (0 disables reporting)
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 30,
        }
    }
}

impl SourceConfig {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

impl PipelineConfig {
    pub fn trigger_interval(&self) -> Duration {
        Duration::from_millis(self.trigger_interval_ms)
    }
}

impl AppConfig {
    /// Load configuration from the default file
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific path.
    ///
    /// `FARE_STREAM__<SECTION>__<KEY>` environment variables override file values.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("FARE_STREAM")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        let app: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app.validate()?;
        Ok(app)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.trigger_interval_ms == 0 {
            anyhow::bail!("pipeline.trigger_interval_ms must be greater than zero");
        }
        if self.pipeline.max_batch_size == 0 {
            anyhow::bail!("pipeline.max_batch_size must be greater than zero");
        }
        if self.source.poll_timeout_ms == 0 {
            anyhow::bail!("source.poll_timeout_ms must be greater than zero");
        }
        if self.sink.kind == SinkKind::Jsonl && self.sink.path.is_none() {
            anyhow::bail!("sink.path is required when sink.kind = \"jsonl\"");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig {
                host: "localhost".to_string(),
                port: 9999,
                poll_timeout_ms: default_poll_timeout_ms(),
                reconnect_attempts: 0,
                reconnect_backoff_ms: default_reconnect_backoff_ms(),
            },
            models: ModelsConfig {
                store_dir: PathBuf::from("models"),
                name: "fare_model".to_string(),
            },
            training: TrainingConfig {
                dataset_path: PathBuf::from("training-dataset.csv"),
            },
            pipeline: PipelineConfig {
                trigger_interval_ms: 1000,
                max_batch_size: default_max_batch_size(),
            },
            sink: SinkConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.source.endpoint(), "localhost:9999");
        assert_eq!(config.models.name, "fare_model");
        assert_eq!(config.source.reconnect_attempts, 0);
        assert_eq!(config.sink.kind, SinkKind::Console);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[source]
host = "127.0.0.1"
port = 7777

[models]
store_dir = "/var/lib/fare-stream"
name = "fare_model"

[training]
dataset_path = "data/training-dataset.csv"

[pipeline]
trigger_interval_ms = 250

[sink]
kind = "jsonl"
path = "out/results.jsonl"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(config.source.endpoint(), "127.0.0.1:7777");
        assert_eq!(config.source.poll_timeout_ms, 500);
        assert_eq!(config.pipeline.trigger_interval(), Duration::from_millis(250));
        assert_eq!(config.pipeline.max_batch_size, 1024);
        assert_eq!(config.sink.kind, SinkKind::Jsonl);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.pipeline.trigger_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.sink.kind = SinkKind::Jsonl;
        assert!(config.validate().is_err());
    }
}
