//! One-time-passcode gate with a persisted failed-attempt lockout.
//!
//! States: `AwaitingCode → Verifying → Verified`, or
//! `AwaitingCode → LockedOut → (expiry) → AwaitingCode`.

pub mod countdown;
pub mod gate;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use countdown::{ResendCooldown, spawn_lockout_countdown};
pub use gate::OtpGate;

/// Where the gate is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OtpState {
    AwaitingCode,
    /// A verification call is in flight.
    Verifying,
    Verified,
    LockedOut { until: DateTime<Utc> },
}

impl OtpState {
    pub fn is_locked_out(&self) -> bool {
        matches!(self, Self::LockedOut { .. })
    }
}

impl std::fmt::Display for OtpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingCode => "awaiting_code",
            Self::Verifying => "verifying",
            Self::Verified => "verified",
            Self::LockedOut { .. } => "locked_out",
        };
        write!(f, "{s}")
    }
}

/// Per-email counters, mirrored in the key-value store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpSession {
    pub email: String,
    pub failed_attempts: u32,
    pub lockout_until: Option<DateTime<Utc>>,
}

impl OtpSession {
    pub fn new(email: &str) -> Self {
        Self {
            email: email.to_string(),
            failed_attempts: 0,
            lockout_until: None,
        }
    }
}

/// Outcome of a send or resend request that did not fail in transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CodeRequest {
    Sent,
    /// Locked out; nothing was sent.
    SkippedLockedOut { remaining_secs: u64 },
    /// Resend cooldown still running; nothing was sent.
    CoolingDown { remaining_secs: u64 },
}

/// Snapshot for status endpoints and UIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OtpStatus {
    pub email: String,
    #[serde(flatten)]
    pub state: OtpState,
    pub failed_attempts: u32,
    pub remaining_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lockout_remaining_secs: Option<u64>,
    /// `m:ss` countdown while locked out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lockout_timer: Option<String>,
    pub resend_available_in_secs: u64,
}

/// Render a remaining duration as `m:ss`, rounding partial seconds up.
pub fn format_countdown(remaining: Duration) -> String {
    let total = ceil_secs(remaining);
    format!("{}:{:02}", total / 60, total % 60)
}

/// Whole seconds, rounding any fraction up.
pub(crate) fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_format() {
        assert_eq!(format_countdown(Duration::from_secs(900)), "15:00");
        assert_eq!(format_countdown(Duration::from_secs(61)), "1:01");
        assert_eq!(format_countdown(Duration::from_millis(59_200)), "1:00");
        assert_eq!(format_countdown(Duration::from_millis(1)), "0:01");
        assert_eq!(format_countdown(Duration::ZERO), "0:00");
    }

    #[test]
    fn state_serializes_with_tag() {
        let json = serde_json::to_value(OtpState::AwaitingCode).unwrap();
        assert_eq!(json["state"], "awaiting_code");
    }
}
