//! Fare model lifecycle: training, persistence and scoring

pub mod deviation;
pub mod inference;
pub mod linear;
pub mod store;
pub mod trainer;

pub use deviation::evaluate_deviation;
pub use inference::ScoringEngine;
pub use linear::Model;
pub use store::ModelStore;
pub use trainer::ModelTrainer;
