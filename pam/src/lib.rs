//! Directive-chain management for hellou.
//!
//! Inserts and removes a single authentication directive in per-service PAM
//! chains. Every mutation is idempotent, atomic on disk and reversible: the
//! first install snapshots the chain, and uninstall restores those exact bytes.

#![allow(clippy::missing_errors_doc)]

mod chain;
mod error;
mod lines;
mod snapshot;

pub use chain::{ChainMutator, InstallReport, InstallStatus, UninstallStatus};
pub use error::ChainError;
pub use snapshot::Snapshot;
