//! Core domain types for hellou.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod device;
mod directive;
mod embedding;
mod ids;
mod outcome;

// ============================================================================
// Names
// ============================================================================

pub use ids::{Identity, MAX_NAME_BYTES, NameError, ServiceName};

// ============================================================================
// Biometric Types
// ============================================================================

pub use embedding::{
    EMBEDDING_DIM, Embedding, EmbeddingError, MatchDecision, Tolerance, ToleranceError,
};

// ============================================================================
// Outcomes
// ============================================================================

pub use device::DevicePolicy;
pub use outcome::{Outcome, PAM_AUTH_ERR, PAM_IGNORE, PAM_SUCCESS, SessionPhase};

// ============================================================================
// Directive Chains
// ============================================================================

pub use directive::{DirectiveError, DirectiveLine};
