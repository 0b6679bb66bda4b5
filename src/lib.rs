//! Fare Stream Library
//!
//! Real-time fare prediction over a stream of ride events: a linear model
//! fitted offline scores each incoming ride in micro-batches, and every
//! prediction is emitted with its deviation from the reported fare.

pub mod config;
pub mod consumer;
pub mod error;
pub mod feature_extractor;
pub mod metrics;
pub mod models;
pub mod parser;
pub mod producer;
pub mod scheduler;
pub mod types;

pub use config::AppConfig;
pub use consumer::{StreamSource, TcpStreamSource};
pub use error::PipelineError;
pub use feature_extractor::{DistanceFeatures, FeatureVector, FeatureVectorizer};
pub use models::{Model, ModelStore, ModelTrainer, ScoringEngine};
pub use parser::{ParseFailure, RecordParser};
pub use producer::ResultSink;
pub use scheduler::{MicroBatchScheduler, PipelineState, StopHandle};
pub use types::{result::ScoringResult, ride::RideEvent};
