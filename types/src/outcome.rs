use std::fmt;

use serde::{Deserialize, Serialize};

/// `PAM_SUCCESS` from `<security/_pam_types.h>`.
pub const PAM_SUCCESS: i32 = 0;
/// `PAM_AUTH_ERR` from `<security/_pam_types.h>`.
pub const PAM_AUTH_ERR: i32 = 7;
/// `PAM_IGNORE` from `<security/_pam_types.h>`.
pub const PAM_IGNORE: i32 = 25;

/// Terminal result of one authentication request.
///
/// `Ignore` means "this mechanism has no opinion": the host must defer to its
/// next factor and never read it as a denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Deny,
    Ignore,
}

impl Outcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Deny => "deny",
            Self::Ignore => "ignore",
        }
    }

    /// Status code handed to the host stack.
    ///
    /// With `disclose_ignore == false` an abstention is reported exactly like a
    /// denial, so outside observers cannot tell "not enrolled" from "wrong face".
    #[must_use]
    pub const fn pam_code(self, disclose_ignore: bool) -> i32 {
        match self {
            Self::Success => PAM_SUCCESS,
            Self::Deny => PAM_AUTH_ERR,
            Self::Ignore if disclose_ignore => PAM_IGNORE,
            Self::Ignore => PAM_AUTH_ERR,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an authentication session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    Pending,
    Capturing,
    Scoring,
    Resolved(Outcome),
}

impl SessionPhase {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Capturing => "capturing",
            Self::Scoring => "scoring",
            Self::Resolved(outcome) => outcome.as_str(),
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
