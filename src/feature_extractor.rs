//! Feature extraction for fare model inference.
//!
//! Turns validated ride events into the feature vectors the linear model
//! was trained on. The extractor is a trait so the scheduler can be handed
//! a different feature layout without touching the scoring code.

use crate::types::ride::RideEvent;
use std::sync::Arc;

/// Ordered model input, one value per feature
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// Maps a ride event to model input features.
///
/// Implementations must be deterministic and total over validated events.
pub trait FeatureVectorizer: Send + Sync {
    fn vectorize(&self, event: &RideEvent) -> FeatureVector;

    /// Number of features produced by [`FeatureVectorizer::vectorize`]
    fn dimension(&self) -> usize;

    /// Feature names in output order
    fn feature_names(&self) -> Vec<&'static str>;
}

impl<T: FeatureVectorizer + ?Sized> FeatureVectorizer for Arc<T> {
    fn vectorize(&self, event: &RideEvent) -> FeatureVector {
        (**self).vectorize(event)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn feature_names(&self) -> Vec<&'static str> {
        (**self).feature_names()
    }
}

/// Single-feature extractor: the ride distance in kilometres.
///
/// Matches the column used when the model was fitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceFeatures;

impl DistanceFeatures {
    pub fn new() -> Self {
        Self
    }
}

impl FeatureVectorizer for DistanceFeatures {
    fn vectorize(&self, event: &RideEvent) -> FeatureVector {
        FeatureVector(vec![event.distance_km])
    }

    fn dimension(&self) -> usize {
        1
    }

    fn feature_names(&self) -> Vec<&'static str> {
        vec!["distance_km"]
    }
}
