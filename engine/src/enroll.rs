//! Multi-sample enrollment from live capture.
//!
//! Frames are captured until the requested number of single-face samples has
//! been collected or the time budget runs out. The stored reference is the
//! component-wise mean of the accepted samples.

use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep, timeout_at};

use hellou_types::{Embedding, EmbeddingError};

use crate::capture::{CaptureError, Sensor};
use crate::matching::{DistanceMetric, MatchingEngine, NoSample};

/// Pause after a transient device error before trying again.
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum EnrollError {
    #[error("collected {collected} of {wanted} samples before the time limit")]
    TimedOut { collected: usize, wanted: usize },
    #[error(transparent)]
    Device(CaptureError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Per-frame feedback for the enrolling user.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrollProgress {
    Accepted { collected: usize, wanted: usize },
    Rejected(NoSample),
    Retrying(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrollPlan {
    pub samples: usize,
    pub timeout: Duration,
}

/// Capture `plan.samples` single-face embeddings and average them.
pub async fn collect_reference<M: DistanceMetric>(
    sensor: &Sensor,
    matcher: &MatchingEngine<M>,
    plan: EnrollPlan,
    mut on_progress: impl FnMut(&EnrollProgress),
) -> Result<Embedding, EnrollError> {
    let wanted = plan.samples.max(1);
    let deadline = Instant::now() + plan.timeout;
    let mut samples = Vec::with_capacity(wanted);

    while samples.len() < wanted {
        let timed_out = EnrollError::TimedOut {
            collected: samples.len(),
            wanted,
        };

        let raw = match timeout_at(deadline, sensor.capture()).await {
            Err(_) => return Err(timed_out),
            Ok(Err(e)) if e.is_fatal() => return Err(EnrollError::Device(e)),
            Ok(Err(e)) => {
                on_progress(&EnrollProgress::Retrying(e.to_string()));
                if timeout_at(deadline, sleep(RETRY_BACKOFF)).await.is_err() {
                    return Err(timed_out);
                }
                continue;
            }
            Ok(Ok(raw)) => raw,
        };

        let faces = match timeout_at(deadline, sensor.extract(raw)).await {
            Err(_) => return Err(timed_out),
            Ok(Err(e)) => {
                on_progress(&EnrollProgress::Retrying(e.to_string()));
                continue;
            }
            Ok(Ok(faces)) => faces,
        };

        match matcher.select(faces) {
            Ok(face) => {
                samples.push(face);
                on_progress(&EnrollProgress::Accepted {
                    collected: samples.len(),
                    wanted,
                });
            }
            Err(rejected) => on_progress(&EnrollProgress::Rejected(rejected)),
        }
    }

    tracing::debug!(samples = samples.len(), "Averaging enrollment samples");
    Ok(Embedding::mean(&samples)?)
}
