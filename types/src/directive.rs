use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectiveError {
    #[error("directive line must not be empty")]
    Empty,
    #[error("directive line must be a single line")]
    MultiLine,
    #[error("directive line must not have leading or trailing whitespace")]
    Padded,
    #[error("directive line must not be a comment")]
    Comment,
}

/// The single line this system inserts into a directive chain.
///
/// Matching against a chain is verbatim, so the line is kept exactly as given
/// and padded or multi-line values are rejected up front.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DirectiveLine(String);

impl DirectiveLine {
    pub fn new(value: impl Into<String>) -> Result<Self, DirectiveError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DirectiveError::Empty);
        }
        if value.contains(['\n', '\r']) {
            return Err(DirectiveError::MultiLine);
        }
        if value.trim() != value {
            return Err(DirectiveError::Padded);
        }
        if value.starts_with('#') {
            return Err(DirectiveError::Comment);
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// True when the line hands control to `pam_exec`, which reports every
    /// non-zero exit status as `PAM_SYSTEM_ERR`.
    #[must_use]
    pub fn runs_through_pam_exec(&self) -> bool {
        self.0
            .split_whitespace()
            .any(|token| token.rsplit('/').next() == Some("pam_exec.so"))
    }
}

impl TryFrom<String> for DirectiveLine {
    type Error = DirectiveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for DirectiveLine {
    type Error = DirectiveError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DirectiveLine> for String {
    fn from(value: DirectiveLine) -> Self {
        value.0
    }
}

impl fmt::Display for DirectiveLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
