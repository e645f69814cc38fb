//! Pre-install snapshots of directive chains.
//!
//! A snapshot is taken once, at the first install into a service, and is the
//! only source used to restore that chain byte-for-byte. It is never updated
//! and never deleted except by a completed restore.

use std::fs;
use std::io;
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use hellou_types::{DirectiveLine, ServiceName};
use hellou_utils::{AtomicWriteOptions, PersistMode, atomic_write_with_options};

use crate::ChainError;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub service: ServiceName,
    pub directive: DirectiveLine,
    pub captured_at: DateTime<Utc>,
    pub original: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    service: ServiceName,
    directive: DirectiveLine,
    captured_at: DateTime<Utc>,
    /// Hex SHA-256 of the decoded original bytes.
    checksum: String,
    /// Base64 of the original chain bytes.
    original: String,
}

impl Snapshot {
    #[must_use]
    pub fn capture(service: ServiceName, directive: DirectiveLine, original: Vec<u8>) -> Self {
        Self {
            service,
            directive,
            captured_at: Utc::now(),
            original,
        }
    }

    /// Load the snapshot at `path`. `Ok(None)` when none exists.
    ///
    /// Anything present but unreadable, unparsable or failing its checksum is
    /// [`ChainError::CorruptBackup`]; the file is left where it is.
    pub fn load(path: &Path, service: &ServiceName) -> Result<Option<Self>, ChainError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                return Err(ChainError::permission(path, e));
            }
            Err(e) => return Err(ChainError::corrupt(path, format!("unreadable: {e}"))),
        };

        let file: SnapshotFile = serde_json::from_slice(&bytes)
            .map_err(|e| ChainError::corrupt(path, format!("unparsable: {e}")))?;
        if file.version != SNAPSHOT_VERSION {
            return Err(ChainError::corrupt(
                path,
                format!("unsupported version {}", file.version),
            ));
        }
        if file.service != *service {
            return Err(ChainError::corrupt(
                path,
                format!("snapshot belongs to service {}", file.service),
            ));
        }
        let original = STANDARD
            .decode(file.original.as_bytes())
            .map_err(|e| ChainError::corrupt(path, format!("bad encoding: {e}")))?;
        if checksum(&original) != file.checksum {
            return Err(ChainError::corrupt(path, "checksum mismatch"));
        }

        Ok(Some(Self {
            service: file.service,
            directive: file.directive,
            captured_at: file.captured_at,
            original,
        }))
    }

    /// Write the snapshot to `path`. Refuses to replace an existing one.
    pub fn save(&self, path: &Path) -> Result<(), ChainError> {
        if path.exists() {
            return Err(ChainError::corrupt(
                path,
                "refusing to overwrite an existing snapshot",
            ));
        }

        let file = SnapshotFile {
            version: SNAPSHOT_VERSION,
            service: self.service.clone(),
            directive: self.directive.clone(),
            captured_at: self.captured_at,
            checksum: checksum(&self.original),
            original: STANDARD.encode(&self.original),
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| ChainError::io("serializing snapshot", io::Error::other(e)))?;

        atomic_write_with_options(
            path,
            &json,
            AtomicWriteOptions {
                mode: PersistMode::SensitiveOwnerOnly,
                ..AtomicWriteOptions::default()
            },
        )
        .map_err(|e| ChainError::from_io(path, "writing snapshot", e))
    }
}

fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
