//! Linear fare model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fitted `fare = coefficient * distance_km + intercept` model.
///
/// Created once by training and never mutated afterwards; the serving side
/// shares one instance behind an `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub coefficient: f64,
    pub intercept: f64,
    /// Version tag assigned at training time
    pub version: String,
    pub trained_at: DateTime<Utc>,
    /// Rows the model was fitted on
    pub training_rows: usize,
}

impl Model {
    /// Number of input features the model consumes
    pub const FEATURE_COUNT: usize = 1;

    /// Build a model from known parameters with a fresh version tag
    pub fn new(coefficient: f64, intercept: f64) -> Self {
        Self {
            coefficient,
            intercept,
            version: uuid::Uuid::new_v4().to_string(),
            trained_at: Utc::now(),
            training_rows: 0,
        }
    }

    pub fn with_training_rows(mut self, rows: usize) -> Self {
        self.training_rows = rows;
        self
    }

    /// Apply the linear combination to one distance
    pub fn predict(&self, distance_km: f64) -> f64 {
        self.coefficient * distance_km + self.intercept
    }
}

/// Models are equal when their parameters and version tag match exactly
impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.coefficient.to_bits() == other.coefficient.to_bits()
            && self.intercept.to_bits() == other.intercept.to_bits()
            && self.version == other.version
    }
}
