//! Fare Stream - Main Entry Point
//!
//! Trains the fare model from the historical dataset and scores ride events
//! streamed over TCP, printing each prediction and its deviation.
//!
//! Usage: `fare-stream [train|serve|run] [config-path]` (default mode: `run`)

use anyhow::{Context, Result};
use fare_stream::{
    config::{AppConfig, LoggingConfig, DEFAULT_CONFIG_PATH},
    consumer::TcpStreamSource,
    metrics::{MetricsReporter, PipelineMetrics},
    models::{ModelStore, ModelTrainer, ScoringEngine},
    producer::ConfiguredSink,
    scheduler::{MicroBatchScheduler, SchedulerSettings},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Train,
    Serve,
    Run,
}

impl Mode {
    fn parse(arg: Option<&str>) -> Result<Self> {
        match arg {
            None | Some("run") => Ok(Self::Run),
            Some("train") => Ok(Self::Train),
            Some("serve") => Ok(Self::Serve),
            Some(other) => anyhow::bail!("unknown mode `{other}` (expected train, serve or run)"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let mode = Mode::parse(args.get(1).map(String::as_str))?;
    let config_arg = args.get(2).map(String::as_str);
    let config = load_config(config_arg)?;

    init_logging(&config.logging)?;
    info!(
        mode = ?mode,
        config = %config_arg.unwrap_or(DEFAULT_CONFIG_PATH),
        "Starting fare stream"
    );

    if matches!(mode, Mode::Train | Mode::Run) {
        train(&config)?;
    }
    if matches!(mode, Mode::Serve | Mode::Run) {
        serve(&config).await?;
    }

    Ok(())
}

/// An explicit path must load; without one, a missing default file means defaults
fn load_config(path: Option<&str>) -> Result<AppConfig> {
    let path = match path {
        Some(path) => path,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => DEFAULT_CONFIG_PATH,
        None => return Ok(AppConfig::default()),
    };
    AppConfig::load_from_path(path)
        .with_context(|| format!("Failed to load configuration from {path}"))
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().or_else(|_| {
        tracing_subscriber::EnvFilter::try_new(format!("fare_stream={}", logging.level))
    })?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.init(),
    }
    Ok(())
}

fn train(config: &AppConfig) -> Result<()> {
    info!(dataset = %config.training.dataset_path.display(), "Training model");

    let model = ModelTrainer::new()
        .fit_file(&config.training.dataset_path)
        .context("Model training failed")?;

    let store = ModelStore::from_config(&config.models);
    let path = store
        .save(&config.models.name, &model)
        .context("Failed to save model")?;

    info!(
        coefficient = model.coefficient,
        intercept = model.intercept,
        path = %path.display(),
        "Model trained and saved"
    );
    Ok(())
}

fn load_engine(config: &AppConfig) -> Result<ScoringEngine> {
    let store = ModelStore::from_config(&config.models);
    let model = store
        .load(&config.models.name)
        .with_context(|| format!("Failed to load model `{}`", config.models.name))?;
    info!(model = %config.models.name, version = %model.version, "Model loaded");
    Ok(ScoringEngine::new(model))
}

async fn serve(config: &AppConfig) -> Result<()> {
    // The model must load before the feed is touched
    let engine = load_engine(config)?;

    info!(endpoint = %config.source.endpoint(), "Waiting for streaming data");
    let source = TcpStreamSource::from_config(config)
        .await
        .context("Failed to connect to ride event feed")?;
    let sink = ConfiguredSink::from_config(config)
        .await
        .context("Failed to open result sink")?;

    let metrics = Arc::new(PipelineMetrics::new());
    let scheduler = MicroBatchScheduler::new(source, sink, SchedulerSettings::from_config(config))
        .with_metrics(metrics.clone());

    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    // Ctrl-C finishes the in-flight batch, then stops
    let stop = scheduler.stop_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                stop.stop();
            }
            Err(e) => warn!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    let result = scheduler.serve(engine).await;
    metrics.log_summary();

    match result {
        Ok(summary) => {
            info!(
                batches = summary.batches,
                scored = summary.scored,
                dropped = summary.dropped,
                "Fare stream stopped"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Fare stream failed");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!(Mode::parse(None).unwrap(), Mode::Run);
        assert_eq!(Mode::parse(Some("train")).unwrap(), Mode::Train);
        assert_eq!(Mode::parse(Some("serve")).unwrap(), Mode::Serve);
        assert!(Mode::parse(Some("predict")).is_err());
    }

    #[test]
    fn test_explicit_config_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("typo.toml");
        assert!(load_config(missing.to_str()).is_err());
    }

    #[test]
    fn test_explicit_config_path_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fare.toml");
        let contents = include_str!("../config/config.toml").replace("port = 9999", "port = 7000");
        std::fs::write(&path, contents).unwrap();

        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.source.port, 7000);
    }

    #[test]
    fn test_missing_model_fails_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.models.store_dir = dir.path().to_path_buf();

        assert!(load_engine(&config).is_err());

        ModelStore::from_config(&config.models)
            .save(&config.models.name, &fare_stream::Model::new(2.0, 1.0))
            .unwrap();
        assert_eq!(load_engine(&config).unwrap().model().coefficient, 2.0);
    }
}
