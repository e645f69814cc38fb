//! Enrollment Store - durable per-identity reference embeddings.
//!
//! One JSON document per identity under the store root:
//!
//! ```text
//! <root>/alice.json          record (0600, written via temp + rename)
//! <root>/.locks/alice.lock   flock sidecar
//! ```
//!
//! Writers (`enroll`, `remove`) take the identity's lock exclusively; readers
//! (`lookup`, authentication leases) take it shared. Conflicts fail fast with
//! [`StoreError::Busy`] instead of waiting, so an authentication attempt never
//! reads a half-replaced reference and an enrollment never races a live session.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hellou_types::{Embedding, EmbeddingError, Identity};
use hellou_utils::{
    AtomicWriteOptions, FileLock, LockKind, PersistMode, atomic_write_with_options, remove_durable,
};

const RECORD_EXTENSION: &str = "json";
const LOCK_DIR: &str = ".locks";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid embedding: {0}")]
    InvalidEmbedding(#[from] EmbeddingError),
    #[error("identity {0} is busy (enrollment or authentication in progress)")]
    Busy(Identity),
    #[error("enrollment record for {identity} is corrupt: {reason}")]
    CorruptRecord { identity: Identity, reason: String },
    #[error("I/O error during {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Concurrency conflicts are worth retrying; everything else is not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

/// Persisted enrollment for one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub version: u32,
    pub identity: Identity,
    pub embedding: Embedding,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EnrollmentRecord {
    /// Current schema version.
    pub const CURRENT_VERSION: u32 = 1;
}

/// Shared hold on an identity for the length of an authentication session.
///
/// While a lease is alive, `enroll` and `remove` for the same identity fail
/// with [`StoreError::Busy`].
#[derive(Debug)]
pub struct IdentityLease {
    _lock: FileLock,
}

#[derive(Debug, Clone)]
pub struct EnrollmentStore {
    root: PathBuf,
}

impl EnrollmentStore {
    /// Open (and create if needed) the store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        create_private_dir(&root)?;
        create_private_dir(&root.join(LOCK_DIR))?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, identity: &Identity) -> PathBuf {
        self.root
            .join(format!("{}.{RECORD_EXTENSION}", identity.as_str()))
    }

    fn lock_path(&self, identity: &Identity) -> PathBuf {
        self.root
            .join(LOCK_DIR)
            .join(format!("{}.lock", identity.as_str()))
    }

    fn try_lock(&self, identity: &Identity, kind: LockKind) -> Result<FileLock, StoreError> {
        let path = self.lock_path(identity);
        FileLock::try_acquire(&path, kind)
            .map_err(|e| StoreError::io(format!("locking {}", path.display()), e))?
            .ok_or_else(|| StoreError::Busy(identity.clone()))
    }

    /// Store `embedding` as the reference for `identity`, replacing any
    /// existing record. `created_at` survives re-enrollment.
    pub fn enroll(&self, identity: &Identity, embedding: &Embedding) -> Result<(), StoreError> {
        let _lock = self.try_lock(identity, LockKind::Exclusive)?;

        let now = Utc::now();
        let created_at = match self.read_record(identity) {
            Ok(Some(existing)) => existing.created_at,
            Ok(None) => now,
            Err(StoreError::CorruptRecord { reason, .. }) => {
                tracing::warn!(identity = %identity, %reason, "Replacing corrupt enrollment record");
                now
            }
            Err(e) => return Err(e),
        };

        let record = EnrollmentRecord {
            version: EnrollmentRecord::CURRENT_VERSION,
            identity: identity.clone(),
            embedding: embedding.clone(),
            created_at,
            updated_at: now,
        };
        let bytes = serde_json::to_vec_pretty(&record).map_err(|e| {
            StoreError::io("serializing enrollment record", io::Error::other(e))
        })?;

        let path = self.record_path(identity);
        atomic_write_with_options(
            &path,
            &bytes,
            AtomicWriteOptions {
                mode: PersistMode::SensitiveOwnerOnly,
                ..AtomicWriteOptions::default()
            },
        )
        .map_err(|e| StoreError::io(format!("writing {}", path.display()), e))?;

        tracing::info!(identity = %identity, "Saved enrollment");
        Ok(())
    }

    /// Validate raw components and enroll them.
    pub fn enroll_values(&self, identity: &Identity, values: Vec<f64>) -> Result<(), StoreError> {
        let embedding = Embedding::new(values)?;
        self.enroll(identity, &embedding)
    }

    /// Reference embedding for `identity`; `Ok(None)` when not enrolled.
    pub fn lookup(&self, identity: &Identity) -> Result<Option<Embedding>, StoreError> {
        Ok(self.record(identity)?.map(|record| record.embedding))
    }

    /// Full record including timestamps.
    pub fn record(&self, identity: &Identity) -> Result<Option<EnrollmentRecord>, StoreError> {
        let _lock = self.try_lock(identity, LockKind::Shared)?;
        self.read_record(identity)
    }

    /// Delete the record for `identity`. Returns whether one existed.
    pub fn remove(&self, identity: &Identity) -> Result<bool, StoreError> {
        let _lock = self.try_lock(identity, LockKind::Exclusive)?;
        let path = self.record_path(identity);
        let removed = remove_durable(&path)
            .map_err(|e| StoreError::io(format!("removing {}", path.display()), e))?;
        if removed {
            tracing::info!(identity = %identity, "Removed enrollment");
        } else {
            tracing::debug!(identity = %identity, "No enrollment to remove");
        }
        Ok(removed)
    }

    /// Hold `identity` for reading until the lease is dropped.
    pub fn lease(&self, identity: &Identity) -> Result<IdentityLease, StoreError> {
        let lock = self.try_lock(identity, LockKind::Shared)?;
        Ok(IdentityLease { _lock: lock })
    }

    /// Enrolled identities, sorted.
    pub fn identities(&self) -> Result<Vec<Identity>, StoreError> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| StoreError::io(format!("listing {}", self.root.display()), e))?;

        let mut identities = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| StoreError::io(format!("listing {}", self.root.display()), e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match Identity::new(stem) {
                Ok(identity) => identities.push(identity),
                Err(e) => {
                    tracing::debug!(path = %path.display(), "Skipping foreign file in store: {e}");
                }
            }
        }
        identities.sort();
        Ok(identities)
    }

    fn read_record(&self, identity: &Identity) -> Result<Option<EnrollmentRecord>, StoreError> {
        let path = self.record_path(identity);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(format!("reading {}", path.display()), e)),
        };

        let record: EnrollmentRecord =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::CorruptRecord {
                identity: identity.clone(),
                reason: e.to_string(),
            })?;

        if record.identity != *identity {
            return Err(StoreError::CorruptRecord {
                identity: identity.clone(),
                reason: format!("record belongs to {}", record.identity),
            });
        }
        if record.version > EnrollmentRecord::CURRENT_VERSION {
            return Err(StoreError::CorruptRecord {
                identity: identity.clone(),
                reason: format!("unsupported record version {}", record.version),
            });
        }
        Ok(Some(record))
    }
}

fn create_private_dir(path: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(path)
        .map_err(|e| StoreError::io(format!("creating {}", path.display()), e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o700)) {
            tracing::warn!(path = %path.display(), "Failed to restrict store directory: {e}");
        }
    }
    Ok(())
}
