//! Scoring output structures

use serde::{Deserialize, Serialize};

/// Prediction for one ride, emitted append-only to the result sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringResult {
    #[serde(rename = "ride_id")]
    pub id: String,
    pub distance_km: f64,
    pub fare_amount: f64,
    pub prediction: f64,
    /// Absolute difference between `fare_amount` and `prediction`
    pub deviation: f64,
}

/// Results of one micro-batch, in arrival order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub results: Vec<ScoringResult>,
    /// Records that failed parsing and were left out
    pub dropped: usize,
}

impl BatchOutcome {
    /// Number of raw records the batch consumed
    pub fn received(&self) -> usize {
        self.results.len() + self.dropped
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
