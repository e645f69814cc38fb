//! Matching Engine - distance scoring and threshold decisions.

use thiserror::Error;

use hellou_types::{Embedding, MatchDecision, Tolerance};

/// Distance between two embeddings in the extractor's space.
///
/// Implementations must be symmetric and return `0.0` for identical inputs.
pub trait DistanceMetric: Send + Sync {
    fn distance(&self, sample: &Embedding, reference: &Embedding) -> f64;
}

/// L2 distance, the metric face descriptors are trained against.
#[derive(Debug, Default, Clone, Copy)]
pub struct Euclidean;

impl DistanceMetric for Euclidean {
    fn distance(&self, sample: &Embedding, reference: &Embedding) -> f64 {
        sample
            .as_slice()
            .iter()
            .zip(reference.as_slice())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }
}

/// A frame that cannot be scored: no face, or more than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("expected exactly one face, detected {detected}")]
pub struct NoSample {
    pub detected: usize,
}

#[derive(Debug, Default, Clone)]
pub struct MatchingEngine<M = Euclidean> {
    metric: M,
}

impl MatchingEngine<Euclidean> {
    #[must_use]
    pub fn new() -> Self {
        Self { metric: Euclidean }
    }
}

impl<M: DistanceMetric> MatchingEngine<M> {
    pub fn with_metric(metric: M) -> Self {
        Self { metric }
    }

    pub fn score(&self, sample: &Embedding, reference: &Embedding) -> f64 {
        self.metric.distance(sample, reference)
    }

    /// `Match` iff `distance <= tolerance`. A non-finite distance never matches.
    #[must_use]
    pub fn decide(&self, distance: f64, tolerance: Tolerance) -> MatchDecision {
        if distance.is_finite() && distance <= tolerance.value() {
            MatchDecision::Match
        } else {
            MatchDecision::NoMatch
        }
    }

    /// Pick the single scorable embedding out of an extraction result.
    pub fn select(&self, mut embeddings: Vec<Embedding>) -> Result<Embedding, NoSample> {
        match embeddings.len() {
            1 => Ok(embeddings.swap_remove(0)),
            detected => Err(NoSample { detected }),
        }
    }
}
