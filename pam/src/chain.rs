//! Directive-Chain Mutator.
//!
//! Layout for a service `sudo`:
//!
//! ```text
//! <chain_dir>/sudo                        live chain, edited in place via temp + rename
//! <backup_dir>/sudo.snapshot.json         pre-install bytes, written once
//! <backup_dir>/sudo.pre-restore           live chain saved before a restore overwrote local edits
//! <backup_dir>/sudo.lock                  per-service flock, serializes mutations
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use hellou_types::{DirectiveLine, ServiceName};
use hellou_utils::{
    AtomicWriteOptions, FileLock, LockKind, PersistMode, atomic_write_with_options, remove_durable,
};

use crate::ChainError;
use crate::lines::{count_directive, insert_directive, remove_directive};
use crate::snapshot::Snapshot;

/// Mode given to a chain file that somehow has none to preserve.
const DEFAULT_CHAIN_MODE: u32 = 0o644;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    Installed,
    AlreadyInstalled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallStatus {
    /// Restored from the snapshot. `preserved` names the copy of the live
    /// chain saved first when it carried edits beyond the directive.
    Restored { preserved: Option<PathBuf> },
    /// No snapshot; this many exact directive lines were removed.
    Removed { lines: usize },
    NotInstalled,
}

/// Per-service results of a batch operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub changed: Vec<ServiceName>,
    pub unchanged: Vec<ServiceName>,
    /// Services without a chain file on this host.
    pub skipped: Vec<ServiceName>,
}

#[derive(Debug, Clone)]
pub struct ChainMutator {
    chain_dir: PathBuf,
    backup_dir: PathBuf,
    entry_point: String,
}

impl ChainMutator {
    pub fn new(
        chain_dir: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
        entry_point: impl Into<String>,
    ) -> Self {
        Self {
            chain_dir: chain_dir.into(),
            backup_dir: backup_dir.into(),
            entry_point: entry_point.into(),
        }
    }

    #[must_use]
    pub fn chain_dir(&self) -> &Path {
        &self.chain_dir
    }

    #[must_use]
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    fn snapshot_path(&self, service: &ServiceName) -> PathBuf {
        self.backup_dir.join(format!("{service}.snapshot.json"))
    }

    fn pre_restore_path(&self, service: &ServiceName) -> PathBuf {
        self.backup_dir.join(format!("{service}.pre-restore"))
    }

    fn lock(&self, service: &ServiceName) -> Result<FileLock, ChainError> {
        fs::create_dir_all(&self.backup_dir)
            .map_err(|e| ChainError::from_io(&self.backup_dir, "creating", e))?;
        let path = self.backup_dir.join(format!("{service}.lock"));
        FileLock::acquire(&path, LockKind::Exclusive)
            .map_err(|e| ChainError::from_io(&path, "locking", e))
    }

    /// Path of the live chain, which must be an existing regular file.
    fn chain_path(&self, service: &ServiceName) -> Result<PathBuf, ChainError> {
        let path = self.chain_dir.join(service.as_str());
        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_symlink() => Err(ChainError::InvalidService(format!(
                "{} is a symlink; edit its target instead",
                path.display()
            ))),
            Ok(meta) if !meta.is_file() => Err(ChainError::InvalidService(format!(
                "{} is not a regular file",
                path.display()
            ))),
            Ok(_) => Ok(path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ChainError::ServiceChainNotFound {
                service: service.clone(),
                path,
            }),
            Err(e) => Err(ChainError::from_io(&path, "inspecting", e)),
        }
    }

    fn read_chain(&self, service: &ServiceName) -> Result<(PathBuf, Vec<u8>), ChainError> {
        let path = self.chain_path(service)?;
        let content = fs::read(&path).map_err(|e| ChainError::from_io(&path, "reading", e))?;
        Ok((path, content))
    }

    /// Insert `directive` into the service's chain.
    ///
    /// A chain that already carries the directive is left alone. The first
    /// install snapshots the chain before writing.
    pub fn install(
        &self,
        service: &ServiceName,
        directive: &DirectiveLine,
    ) -> Result<InstallStatus, ChainError> {
        let _lock = self.lock(service)?;
        let (path, current) = self.read_chain(service)?;

        let present = count_directive(&current, directive.as_bytes());
        if present > 0 {
            if present > 1 {
                tracing::warn!(service = %service, count = present, "Directive appears more than once");
            }
            tracing::debug!(service = %service, "Directive already present");
            return Ok(InstallStatus::AlreadyInstalled);
        }

        let snapshot_path = self.snapshot_path(service);
        if Snapshot::load(&snapshot_path, service)?.is_some() {
            tracing::info!(service = %service, "Keeping snapshot from an earlier install");
        } else {
            Snapshot::capture(service.clone(), directive.clone(), current.clone())
                .save(&snapshot_path)?;
        }

        let updated = insert_directive(&current, directive.as_bytes(), &self.entry_point);
        write_chain(&path, &updated)?;
        tracing::info!(service = %service, "Installed directive");
        Ok(InstallStatus::Installed)
    }

    /// Remove the directive, restoring the snapshot byte-for-byte when there
    /// is one.
    pub fn uninstall(
        &self,
        service: &ServiceName,
        directive: &DirectiveLine,
    ) -> Result<UninstallStatus, ChainError> {
        let _lock = self.lock(service)?;
        let (path, current) = self.read_chain(service)?;
        let snapshot_path = self.snapshot_path(service);

        let Some(snapshot) = Snapshot::load(&snapshot_path, service)? else {
            let (stripped, lines) = remove_directive(&current, directive.as_bytes());
            if lines == 0 {
                return Ok(UninstallStatus::NotInstalled);
            }
            write_chain(&path, &stripped)?;
            tracing::info!(service = %service, lines, "Removed directive without snapshot");
            return Ok(UninstallStatus::Removed { lines });
        };

        if snapshot.directive != *directive {
            tracing::warn!(
                service = %service,
                recorded = %snapshot.directive,
                requested = %directive,
                "Snapshot was taken for a different directive"
            );
        }

        let mut preserved = None;
        if current != snapshot.original {
            if self.has_local_edits(&current, &snapshot) {
                let keep = self.pre_restore_path(service);
                atomic_write_with_options(
                    &keep,
                    &current,
                    AtomicWriteOptions {
                        mode: PersistMode::SensitiveOwnerOnly,
                        ..AtomicWriteOptions::default()
                    },
                )
                .map_err(|e| ChainError::from_io(&keep, "writing", e))?;
                tracing::warn!(
                    service = %service,
                    saved = %keep.display(),
                    "Chain was edited after install; saved live copy before restoring"
                );
                preserved = Some(keep);
            }
            write_chain(&path, &snapshot.original)?;
        }

        remove_durable(&snapshot_path)
            .map_err(|e| ChainError::from_io(&snapshot_path, "removing", e))?;
        tracing::info!(service = %service, "Restored chain from snapshot");
        Ok(UninstallStatus::Restored { preserved })
    }

    /// Whether the live chain differs from what install would have produced.
    fn has_local_edits(&self, current: &[u8], snapshot: &Snapshot) -> bool {
        let directive = snapshot.directive.as_bytes();
        let expected = insert_directive(&snapshot.original, directive, &self.entry_point);
        if current == expected.as_slice() {
            return false;
        }
        let (stripped, _) = remove_directive(current, directive);
        stripped != snapshot.original
    }

    /// True iff the directive appears exactly once in the live chain.
    pub fn is_installed(
        &self,
        service: &ServiceName,
        directive: &DirectiveLine,
    ) -> Result<bool, ChainError> {
        let (_, current) = self.read_chain(service)?;
        Ok(count_directive(&current, directive.as_bytes()) == 1)
    }

    #[must_use]
    pub fn has_snapshot(&self, service: &ServiceName) -> bool {
        self.snapshot_path(service).exists()
    }

    /// Install into every service that has a chain; missing chains are
    /// reported as skipped.
    pub fn install_all(
        &self,
        services: &[ServiceName],
        directive: &DirectiveLine,
    ) -> Result<InstallReport, ChainError> {
        let mut report = InstallReport::default();
        for service in services {
            match self.install(service, directive) {
                Ok(InstallStatus::Installed) => report.changed.push(service.clone()),
                Ok(InstallStatus::AlreadyInstalled) => report.unchanged.push(service.clone()),
                Err(ChainError::ServiceChainNotFound { .. }) => {
                    tracing::debug!(service = %service, "No chain on this host; skipping");
                    report.skipped.push(service.clone());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    pub fn uninstall_all(
        &self,
        services: &[ServiceName],
        directive: &DirectiveLine,
    ) -> Result<InstallReport, ChainError> {
        let mut report = InstallReport::default();
        for service in services {
            match self.uninstall(service, directive) {
                Ok(UninstallStatus::NotInstalled) => report.unchanged.push(service.clone()),
                Ok(_) => report.changed.push(service.clone()),
                Err(ChainError::ServiceChainNotFound { .. }) => {
                    report.skipped.push(service.clone());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }
}

fn write_chain(path: &Path, content: &[u8]) -> Result<(), ChainError> {
    let mode = PersistMode::preserve_from(path, PersistMode::Preserve(DEFAULT_CHAIN_MODE));
    atomic_write_with_options(
        path,
        content,
        AtomicWriteOptions {
            mode,
            ..AtomicWriteOptions::default()
        },
    )
    .map_err(|e| ChainError::from_io(path, "writing", e))
}
