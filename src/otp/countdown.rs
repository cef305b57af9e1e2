//! Timers around the OTP gate: the one-second lockout tick and the resend cooldown.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{OtpGate, OtpState};

/// Spawn the cooperative lockout countdown for `gate`.
///
/// Ticks once per second while the gate is locked out and exits as soon as
/// the gate is in any other state.
pub fn spawn_lockout_countdown(gate: Arc<OtpGate>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            match gate.tick().await {
                OtpState::LockedOut { .. } => {
                    if let Some(remaining) = gate.remaining_lockout().await {
                        debug!(timer = %super::format_countdown(remaining), "Lockout countdown");
                    }
                }
                state => {
                    debug!(state = %state, "Lockout countdown finished");
                    break;
                }
            }
        }
    })
}

/// Minimum spacing between resend requests.
#[derive(Debug, Clone)]
pub struct ResendCooldown {
    period: Duration,
    available_at: Option<DateTime<Utc>>,
}

impl ResendCooldown {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            available_at: None,
        }
    }

    /// Start (or restart) the cooldown at `now`.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.available_at =
            Some(now + chrono::Duration::from_std(self.period).unwrap_or_else(|_| chrono::Duration::zero()));
    }

    /// Time left before a resend is allowed, `None` when allowed now.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let at = self.available_at?;
        (at > now).then(|| (at - now).to_std().unwrap_or_default())
    }
}
