//! Shared infrastructure utilities for hellou.
//!
//! This crate provides cross-cutting utilities that multiple hellou crates need
//! but that don't belong in the domain-pure `hellou-types` crate:
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`file_lock`**: Advisory `flock` guards for per-key mutual exclusion

pub mod atomic_write;
pub mod file_lock;

pub use atomic_write::{
    AtomicWriteOptions, FileSyncPolicy, ParentDirSyncPolicy, PersistMode,
    atomic_write_with_options, remove_durable,
};
pub use file_lock::{FileLock, LockKind};
