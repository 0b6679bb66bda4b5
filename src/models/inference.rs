//! Scoring of feature vectors against the loaded fare model

use crate::feature_extractor::FeatureVector;
use crate::models::deviation::evaluate_deviation;
use crate::models::linear::Model;
use crate::types::result::ScoringResult;
use crate::types::ride::RideEvent;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    #[error("feature vector has {actual} values, model expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Applies an immutable [`Model`] to feature vectors.
///
/// Cloning the engine shares the same model; nothing here is mutable, so
/// any number of callers may score concurrently without locking.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    model: Arc<Model>,
}

impl ScoringEngine {
    pub fn new(model: Model) -> Self {
        Self {
            model: Arc::new(model),
        }
    }

    pub fn from_shared(model: Arc<Model>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Number of features a vector must carry to be scored
    pub fn feature_count(&self) -> usize {
        Model::FEATURE_COUNT
    }

    /// Predicted fare: `coefficient * distance_km + intercept`
    pub fn score(&self, features: &FeatureVector) -> Result<f64, ScoringError> {
        match features.as_slice() {
            [distance_km] => Ok(self.model.predict(*distance_km)),
            other => Err(ScoringError::DimensionMismatch {
                expected: Model::FEATURE_COUNT,
                actual: other.len(),
            }),
        }
    }

    /// Score one ride and assemble its result row
    pub fn score_event(
        &self,
        event: &RideEvent,
        features: &FeatureVector,
    ) -> Result<ScoringResult, ScoringError> {
        let prediction = self.score(features)?;
        Ok(ScoringResult {
            id: event.id.clone(),
            distance_km: event.distance_km,
            fare_amount: event.fare_amount,
            prediction,
            deviation: evaluate_deviation(event.fare_amount, prediction),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_is_linear_combination() {
        let engine = ScoringEngine::new(Model::new(2.0, 1.0));

        for d in [0.0, 0.1, 3.0, 17.25, 1e6] {
            let features = FeatureVector::new(vec![d]);
            assert_eq!(engine.score(&features).unwrap(), 2.0 * d + 1.0);
        }

        let engine = ScoringEngine::new(Model::new(0.1, 0.7));
        let d = 0.3;
        assert_eq!(
            engine.score(&FeatureVector::new(vec![d])).unwrap(),
            0.1 * d + 0.7
        );
    }

    #[test]
    fn test_dimension_mismatch() {
        let engine = ScoringEngine::new(Model::new(2.0, 1.0));

        assert_eq!(
            engine.score(&FeatureVector::new(vec![])),
            Err(ScoringError::DimensionMismatch {
                expected: 1,
                actual: 0
            })
        );
        assert!(engine.score(&FeatureVector::new(vec![1.0, 2.0])).is_err());
    }

    #[test]
    fn test_score_event() {
        let engine = ScoringEngine::new(Model::new(2.0, 1.0));

        let a1 = RideEvent::new("A1", 3.0, 8.0);
        let result = engine
            .score_event(&a1, &FeatureVector::new(vec![3.0]))
            .unwrap();
        assert_eq!(result.id, "A1");
        assert_eq!(result.prediction, 7.0);
        assert_eq!(result.deviation, 1.0);

        let a2 = RideEvent::new("A2", 0.0, 1.0);
        let result = engine
            .score_event(&a2, &FeatureVector::new(vec![0.0]))
            .unwrap();
        assert_eq!(result.prediction, 1.0);
        assert_eq!(result.deviation, 0.0);
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let engine = ScoringEngine::new(Model::new(1.7, 2.3));
        let event = RideEvent::new("R1", 4.2, 9.9);
        let features = FeatureVector::new(vec![4.2]);

        let first = engine.score_event(&event, &features).unwrap();
        let second = engine.score_event(&event, &features).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_shared_model() {
        let model = Arc::new(Model::new(2.0, 1.0));
        let a = ScoringEngine::from_shared(model.clone());
        let b = a.clone();

        assert!(std::ptr::eq(a.model(), b.model()));
        assert_eq!(Arc::strong_count(&model), 3);
    }
}
