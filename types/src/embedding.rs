//! Embedding and tolerance invariant types.
//!
//! These types guarantee a well-shaped reference vector and a usable match
//! threshold by construction, so nothing downstream re-checks them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of every embedding vector in the system.
///
/// Matches the 128-dimensional face descriptor produced by the extraction helper.
pub const EMBEDDING_DIM: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmbeddingError {
    #[error("embedding must have {EMBEDDING_DIM} components (got {0})")]
    WrongLength(usize),
    #[error("embedding component {index} is not finite")]
    NonFinite { index: usize },
    #[error("cannot average an empty set of embeddings")]
    NoSamples,
}

/// Fixed-length numeric representation of one biometric sample.
///
/// Invariant: exactly [`EMBEDDING_DIM`] finite `f64` components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Embedding(Vec<f64>);

impl Embedding {
    pub fn new(values: Vec<f64>) -> Result<Self, EmbeddingError> {
        if values.len() != EMBEDDING_DIM {
            return Err(EmbeddingError::WrongLength(values.len()));
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(EmbeddingError::NonFinite { index });
        }
        Ok(Self(values))
    }

    /// Component-wise mean of several samples of the same face.
    pub fn mean(samples: &[Embedding]) -> Result<Self, EmbeddingError> {
        if samples.is_empty() {
            return Err(EmbeddingError::NoSamples);
        }
        let n = samples.len() as f64;
        let mut acc = vec![0.0; EMBEDDING_DIM];
        for sample in samples {
            for (slot, v) in acc.iter_mut().zip(sample.as_slice()) {
                *slot += v;
            }
        }
        for slot in &mut acc {
            *slot /= n;
        }
        Self::new(acc)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<f64> {
        self.0
    }
}

impl TryFrom<Vec<f64>> for Embedding {
    type Error = EmbeddingError;

    fn try_from(value: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Embedding> for Vec<f64> {
    fn from(value: Embedding) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToleranceError {
    #[error("tolerance must be finite and non-negative (got {0})")]
    OutOfRange(f64),
}

/// Maximum accepted distance between a sample and the enrolled reference.
///
/// Lower is stricter. No `Default`: callers name the threshold they match under.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Tolerance(f64);

impl Tolerance {
    pub fn new(value: f64) -> Result<Self, ToleranceError> {
        if value.is_finite() && value >= 0.0 {
            Ok(Self(value))
        } else {
            Err(ToleranceError::OutOfRange(value))
        }
    }

    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Tolerance {
    type Error = ToleranceError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Tolerance> for f64 {
    fn from(value: Tolerance) -> Self {
        value.0
    }
}

/// Result of comparing one distance against a tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    Match,
    NoMatch,
}
