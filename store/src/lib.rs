//! Enrollment persistence for hellou.
//!
//! Records are keyed by [`hellou_types::Identity`] and guarded by per-identity
//! advisory locks so the CLI and concurrent PAM invocations can share the store.

#![allow(clippy::missing_errors_doc)]

mod enrollment;

pub use enrollment::{EnrollmentRecord, EnrollmentStore, IdentityLease, StoreError};
