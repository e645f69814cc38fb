use serde::{Deserialize, Serialize};

/// What a session does when the capture device is held by another session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePolicy {
    /// Wait for the device, bounded by the session deadline.
    #[default]
    Queue,
    /// Report `DeviceBusy` immediately; the attempt is spent and retried within budget.
    FailFast,
}

impl DevicePolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::FailFast => "fail_fast",
        }
    }
}
