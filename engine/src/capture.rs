//! Capture and feature-extraction collaborators.
//!
//! The engine never touches a camera or a model directly. It drives two
//! boundaries, [`Capture`] and [`Extractor`], and serializes device access
//! through a [`DeviceGate`]. Concrete implementations live in [`crate::helper`];
//! tests script them.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use hellou_types::{DevicePolicy, Embedding};
use hellou_utils::{FileLock, LockKind};

/// How often a queued session re-checks a device lock held by another process.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Raw bytes of one captured frame, opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSample(Vec<u8>);

impl RawSample {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("capture device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture device is busy")]
    DeviceBusy,
    #[error("capture helper unavailable: {0}")]
    HelperUnavailable(String),
    #[error("capture device lock unusable: {0}")]
    DeviceLock(String),
    #[error("capture failed: {0}")]
    Failed(String),
}

impl CaptureError {
    /// Configuration faults that no retry will fix.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DeviceNotFound(_) | Self::HelperUnavailable(_) | Self::DeviceLock(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("feature extraction failed: {0}")]
    Failed(String),
    #[error("feature extractor returned malformed output: {0}")]
    Malformed(String),
}

pub type CaptureFut<'a> = Pin<Box<dyn Future<Output = Result<RawSample, CaptureError>> + Send + 'a>>;
pub type ExtractFut<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<Embedding>, ExtractError>> + Send + 'a>>;

/// Produces one raw frame per call.
///
/// Dropping the returned future must abandon the capture.
pub trait Capture: Send + Sync {
    fn capture(&self) -> CaptureFut<'_>;
}

/// Turns a raw frame into zero or more embeddings, one per detected face.
pub trait Extractor: Send + Sync {
    fn extract(&self, sample: RawSample) -> ExtractFut<'_>;
}

/// Exclusive access to the capture device.
///
/// Sessions in one process share the in-memory lock. With a lock file set,
/// sessions in other processes (one per `pam_exec` invocation) contend on an
/// exclusive `flock` of that file as well.
#[derive(Debug, Clone)]
pub struct DeviceGate {
    lock: Arc<Mutex<()>>,
    lock_file: Option<PathBuf>,
    policy: DevicePolicy,
}

/// Held for exactly one capture call.
#[derive(Debug)]
pub struct DevicePermit {
    _guard: OwnedMutexGuard<()>,
    _file: Option<FileLock>,
}

impl DeviceGate {
    #[must_use]
    pub fn new(policy: DevicePolicy) -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            lock_file: None,
            policy,
        }
    }

    /// Also take an exclusive lock on `path` for every capture.
    #[must_use]
    pub fn with_lock_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn policy(&self) -> DevicePolicy {
        self.policy
    }

    /// Under [`DevicePolicy::Queue`] this waits; callers bound it with the
    /// session deadline. Dropping the future gives up the wait.
    pub async fn acquire(&self) -> Result<DevicePermit, CaptureError> {
        let guard = match self.policy {
            DevicePolicy::Queue => Arc::clone(&self.lock).lock_owned().await,
            DevicePolicy::FailFast => Arc::clone(&self.lock)
                .try_lock_owned()
                .map_err(|_| CaptureError::DeviceBusy)?,
        };
        let file = match &self.lock_file {
            Some(path) => Some(self.lock_device(path).await?),
            None => None,
        };
        Ok(DevicePermit {
            _guard: guard,
            _file: file,
        })
    }

    async fn lock_device(&self, path: &Path) -> Result<FileLock, CaptureError> {
        loop {
            match FileLock::try_acquire(path, LockKind::Exclusive) {
                Ok(Some(lock)) => return Ok(lock),
                Ok(None) if self.policy == DevicePolicy::FailFast => {
                    tracing::debug!(
                        policy = self.policy.as_str(),
                        path = %path.display(),
                        "Capture device held by another process"
                    );
                    return Err(CaptureError::DeviceBusy);
                }
                Ok(None) => tokio::time::sleep(LOCK_POLL_INTERVAL).await,
                Err(e) => {
                    return Err(CaptureError::DeviceLock(format!("{}: {e}", path.display())));
                }
            }
        }
    }
}

/// Capture and extraction collaborators plus the gate guarding the device.
pub struct Sensor {
    capture: Box<dyn Capture>,
    extractor: Box<dyn Extractor>,
    gate: DeviceGate,
}

impl Sensor {
    pub fn new(capture: Box<dyn Capture>, extractor: Box<dyn Extractor>, gate: DeviceGate) -> Self {
        Self {
            capture,
            extractor,
            gate,
        }
    }

    #[must_use]
    pub fn gate(&self) -> &DeviceGate {
        &self.gate
    }

    /// One frame. The device permit is released before this returns.
    pub async fn capture(&self) -> Result<RawSample, CaptureError> {
        let _permit = self.gate.acquire().await?;
        self.capture.capture().await
    }

    pub async fn extract(&self, sample: RawSample) -> Result<Vec<Embedding>, ExtractError> {
        self.extractor.extract(sample).await
    }
}

impl std::fmt::Debug for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sensor")
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}
