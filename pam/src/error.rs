use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use hellou_types::{NameError, ServiceName};

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("no directive chain for service {service} at {}", path.display())]
    ServiceChainNotFound { service: ServiceName, path: PathBuf },
    #[error("permission denied: {}", path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("backup {} is corrupt ({reason}); inspect it manually", path.display())]
    CorruptBackup { path: PathBuf, reason: String },
    #[error("invalid service: {0}")]
    InvalidService(String),
    #[error("I/O error during {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl ChainError {
    pub(crate) fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        Self::CorruptBackup {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub(crate) fn permission(path: &Path, source: io::Error) -> Self {
        Self::PermissionDenied {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Classify an IO failure on `path`.
    pub(crate) fn from_io(path: &Path, action: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::PermissionDenied {
            Self::permission(path, source)
        } else {
            Self::io(format!("{action} {}", path.display()), source)
        }
    }
}

impl From<NameError> for ChainError {
    fn from(err: NameError) -> Self {
        Self::InvalidService(err.to_string())
    }
}
