//! Error types for the fare prediction pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Failure to fit a model from the historical dataset
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("training dataset is empty")]
    EmptyDataset,

    #[error("distance_km has zero variance across {rows} rows")]
    ZeroVariance { rows: usize },

    #[error("least-squares fit over {rows} rows overflowed to a non-finite value")]
    NonFiniteFit { rows: usize },

    #[error("failed to read dataset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("dataset header is missing column `{0}`")]
    MissingColumn(&'static str),

    #[error("dataset line {line}: {reason}")]
    InvalidRow { line: usize, reason: String },
}

/// Failure to persist or load a model
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("model `{0}` not found")]
    ModelNotFound(String),

    #[error("model `{name}` is corrupt: {reason}")]
    ModelCorrupt { name: String, reason: String },

    #[error("invalid model name `{0}`")]
    InvalidName(String),

    #[error("model store io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of the raw event feed
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("connection to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection to {endpoint} lost: {reason}")]
    ConnectionLost { endpoint: String, reason: String },
}

/// Failure to append results to the output
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Fatal error that ends a scheduler run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("vectorizer produces {vectorizer} features but model expects {model}")]
    FeatureDimension { vectorizer: usize, model: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = StoreError::ModelNotFound("fare_model".to_string());
        assert_eq!(err.to_string(), "model `fare_model` not found");

        let err = PipelineError::from(SourceError::ConnectionLost {
            endpoint: "localhost:9999".to_string(),
            reason: "eof".to_string(),
        });
        assert_eq!(err.to_string(), "connection to localhost:9999 lost: eof");
    }
}
