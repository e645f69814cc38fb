//! Advisory `flock(2)` locks on sidecar lock files.
//!
//! Locks are tied to the open file description, so two handles opened by the
//! same process contend exactly like two processes would. Dropping the guard
//! closes the file and releases the lock.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    /// Any number of shared holders may coexist.
    Shared,
    /// Excludes every other holder, shared or exclusive.
    Exclusive,
}

/// RAII guard for a held lock.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
}

impl FileLock {
    /// Try to take the lock without waiting.
    ///
    /// Returns `Ok(None)` if a conflicting holder exists.
    pub fn try_acquire(path: impl AsRef<Path>, kind: LockKind) -> io::Result<Option<Self>> {
        let path = path.as_ref();
        let file = open_lock_file(path)?;
        if flock(&file, kind, false)? {
            Ok(Some(Self { _file: file }))
        } else {
            Ok(None)
        }
    }

    /// Take the lock, blocking until every conflicting holder has released it.
    pub fn acquire(path: impl AsRef<Path>, kind: LockKind) -> io::Result<Self> {
        let path = path.as_ref();
        let file = open_lock_file(path)?;
        flock(&file, kind, true)?;
        Ok(Self { _file: file })
    }
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            tracing::warn!(path = %path.display(), err = %e, "failed to set lock file permissions");
        }
    }

    Ok(file)
}

/// Returns `Ok(false)` only for a non-blocking attempt that found the lock held.
fn flock(file: &File, kind: LockKind, blocking: bool) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;

        let mut op = match kind {
            LockKind::Shared => libc::LOCK_SH,
            LockKind::Exclusive => libc::LOCK_EX,
        };
        if !blocking {
            op |= libc::LOCK_NB;
        }

        let fd = file.as_raw_fd();
        loop {
            // SAFETY: flock is a standard POSIX call and `fd` stays valid for the
            // lifetime of `file`.
            let result = unsafe { libc::flock(fd, op) };
            if result == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::Interrupted => {}
                io::ErrorKind::WouldBlock => return Ok(false),
                _ if err.raw_os_error() == Some(libc::EWOULDBLOCK) => return Ok(false),
                _ => return Err(err),
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (file, kind, blocking);
        Ok(true)
    }
}
