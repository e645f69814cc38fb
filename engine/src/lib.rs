//! Authentication engine for hellou.
//!
//! This crate owns the decision path: the [`MatchingEngine`] compares
//! embeddings, the [`SessionController`] drives capture/extract/score under a
//! deadline and attempt budget, and [`collect_reference`] builds enrollment
//! references from live capture. Hardware and models sit behind the
//! [`Capture`] and [`Extractor`] traits.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Error types carry their own docs

mod audit;
mod capture;
mod enroll;
mod helper;
mod matching;
mod session;

// ============================================================================
// Matching
// ============================================================================

pub use matching::{DistanceMetric, Euclidean, MatchingEngine, NoSample};

// ============================================================================
// Collaborators
// ============================================================================

pub use capture::{
    Capture, CaptureError, CaptureFut, DeviceGate, DevicePermit, ExtractError, ExtractFut,
    Extractor, RawSample, Sensor,
};
pub use helper::{
    CaptureTarget, EXIT_DEVICE_BUSY, EXIT_DEVICE_NOT_FOUND, HelperCapture, HelperExtractor,
};

// ============================================================================
// Sessions
// ============================================================================

pub use audit::{AuditRecord, AuditSink, FileAuditSink, TracingAuditSink};
pub use session::{
    AttemptFailure, NoopObserver, Resolution, SessionController, SessionError, SessionObserver,
    SessionPolicy, SessionReport,
};

// ============================================================================
// Enrollment
// ============================================================================

pub use enroll::{EnrollError, EnrollPlan, EnrollProgress, collect_reference};
