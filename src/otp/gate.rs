//! `OtpGate` — code issuance, verification and failed-attempt lockout for one email.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::countdown::ResendCooldown;
use super::{CodeRequest, OtpSession, OtpState, OtpStatus, ceil_secs, format_countdown};
use crate::clock::Clock;
use crate::config::OtpConfig;
use crate::error::OnboardingError;
use crate::services::OtpService;
use crate::store::{KeyValueStore, keys};

struct GateState {
    session: OtpSession,
    state: OtpState,
    resend: ResendCooldown,
}

pub struct OtpGate {
    otp: Arc<dyn OtpService>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: OtpConfig,
    inner: Mutex<GateState>,
    /// Serializes `submit_code` so only one remote verification runs at a time.
    verifying: Mutex<()>,
}

impl OtpGate {
    /// Enter the OTP step for `email`.
    ///
    /// Restores persisted counters. An expired lockout is cleared; an active one
    /// puts the gate straight into `LockedOut` and no code is sent. Otherwise a
    /// code is sent automatically; a send failure is logged, not returned, so the
    /// user can still resend.
    pub async fn enter(
        email: &str,
        otp: Arc<dyn OtpService>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: OtpConfig,
    ) -> Self {
        let resend = ResendCooldown::new(config.resend_cooldown);
        let gate = Self {
            otp,
            store,
            clock,
            config,
            inner: Mutex::new(GateState {
                session: OtpSession::new(email),
                state: OtpState::AwaitingCode,
                resend,
            }),
            verifying: Mutex::new(()),
        };

        gate.restore().await;

        let locked = gate.inner.lock().await.state.is_locked_out();
        if locked {
            info!(email = %email, "OTP step entered while locked out");
        } else if let Err(e) = gate.request_code().await {
            warn!(email = %email, error = %e, "Initial OTP send failed");
        }
        gate
    }

    async fn restore(&self) {
        let mut inner = self.inner.lock().await;
        let email = inner.session.email.clone();

        inner.session.failed_attempts = match self.store.get(&keys::otp_attempts(&email)).await {
            Ok(Some(raw)) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(email = %email, value = %raw, "Ignoring malformed OTP attempt counter");
                0
            }),
            Ok(None) => 0,
            Err(e) => {
                warn!(email = %email, error = %e, "Failed to read OTP attempt counter");
                0
            }
        };

        let lockout = match self.store.get(&keys::otp_lockout(&email)).await {
            Ok(Some(raw)) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .and_then(DateTime::<Utc>::from_timestamp_millis),
            Ok(None) => None,
            Err(e) => {
                warn!(email = %email, error = %e, "Failed to read OTP lockout");
                None
            }
        };

        match lockout {
            Some(until) if until > self.clock.now() => {
                inner.session.lockout_until = Some(until);
                inner.state = OtpState::LockedOut { until };
            }
            Some(_) => {
                self.clear(&mut inner).await;
            }
            None => {}
        }
    }

    /// Send a code. Skipped while locked out.
    pub async fn request_code(&self) -> Result<CodeRequest, OnboardingError> {
        let mut inner = self.inner.lock().await;
        self.expire_lockout(&mut inner).await;
        if let Some(remaining) = self.locked_for(&inner) {
            return Ok(CodeRequest::SkippedLockedOut {
                remaining_secs: ceil_secs(remaining),
            });
        }
        self.send(&mut inner).await
    }

    /// Resend a code. Gated by lockout and by the resend cooldown.
    pub async fn resend_code(&self) -> Result<CodeRequest, OnboardingError> {
        let mut inner = self.inner.lock().await;
        self.expire_lockout(&mut inner).await;
        if let Some(remaining) = self.locked_for(&inner) {
            return Ok(CodeRequest::SkippedLockedOut {
                remaining_secs: ceil_secs(remaining),
            });
        }
        if let Some(remaining) = inner.resend.remaining(self.clock.now()) {
            return Ok(CodeRequest::CoolingDown {
                remaining_secs: ceil_secs(remaining),
            });
        }
        self.send(&mut inner).await
    }

    async fn send(&self, inner: &mut GateState) -> Result<CodeRequest, OnboardingError> {
        match self.otp.send_code(&inner.session.email).await {
            Ok(()) => {
                inner.resend.start(self.clock.now());
                info!(email = %inner.session.email, "OTP sent");
                Ok(CodeRequest::Sent)
            }
            Err(e) => {
                warn!(email = %inner.session.email, error = %e, "OTP send failed");
                Err(OnboardingError::ServiceUnavailable)
            }
        }
    }

    /// Verify a code. `Ok(())` means the gate is now `Verified`.
    ///
    /// The code must be exactly `code_length` characters as given; anything else
    /// is rejected without calling the remote verifier. The state lock is not
    /// held during the remote call, so `status()` reports `Verifying` meanwhile.
    pub async fn submit_code(&self, code: &str) -> Result<(), OnboardingError> {
        let _verifying = self.verifying.lock().await;

        let email = {
            let mut inner = self.inner.lock().await;
            if inner.state == OtpState::Verified {
                return Ok(());
            }

            self.expire_lockout(&mut inner).await;
            if let Some(remaining) = self.locked_for(&inner) {
                return Err(OnboardingError::LockedOut { remaining });
            }

            if code.chars().count() != self.config.code_length {
                return Err(OnboardingError::InvalidCodeFormat);
            }

            inner.state = OtpState::Verifying;
            inner.session.email.clone()
        };

        let response = self.otp.verify_code(&email, code).await;

        let mut inner = self.inner.lock().await;
        match response {
            Ok(r) if r.success => {
                self.clear(&mut inner).await;
                inner.state = OtpState::Verified;
                info!(email = %email, "OTP verified");
                Ok(())
            }
            Ok(_) => self.record_failure(&mut inner).await,
            Err(e) => {
                inner.state = OtpState::AwaitingCode;
                warn!(email = %email, error = %e, "OTP verification call failed");
                Err(OnboardingError::ServiceUnavailable)
            }
        }
    }

    async fn record_failure(&self, inner: &mut GateState) -> Result<(), OnboardingError> {
        let email = inner.session.email.clone();
        inner.session.failed_attempts += 1;
        let attempts = inner.session.failed_attempts;
        self.persist(&keys::otp_attempts(&email), &attempts.to_string())
            .await;

        if attempts >= self.config.max_attempts {
            let until = self.clock.now()
                + chrono::Duration::from_std(self.config.lockout_duration)
                    .unwrap_or_else(|_| chrono::Duration::zero());
            inner.session.lockout_until = Some(until);
            inner.state = OtpState::LockedOut { until };
            self.persist(
                &keys::otp_lockout(&email),
                &until.timestamp_millis().to_string(),
            )
            .await;
            warn!(email = %email, attempts, "OTP locked out");
            return Err(OnboardingError::LockedOut {
                remaining: self.config.lockout_duration,
            });
        }

        inner.state = OtpState::AwaitingCode;
        info!(email = %email, attempts, "OTP verification failed");
        Err(OnboardingError::VerificationFailed)
    }

    /// One countdown step: clears the lockout once it has expired.
    pub async fn tick(&self) -> OtpState {
        let mut inner = self.inner.lock().await;
        self.expire_lockout(&mut inner).await;
        inner.state
    }

    /// Time left on the lockout, if locked out.
    pub async fn remaining_lockout(&self) -> Option<Duration> {
        let inner = self.inner.lock().await;
        self.locked_for(&inner)
    }

    pub async fn state(&self) -> OtpState {
        self.inner.lock().await.state
    }

    pub async fn is_verified(&self) -> bool {
        self.state().await == OtpState::Verified
    }

    pub async fn status(&self) -> OtpStatus {
        let inner = self.inner.lock().await;
        let now = self.clock.now();
        let lockout = self.locked_for(&inner);
        OtpStatus {
            email: inner.session.email.clone(),
            state: inner.state,
            failed_attempts: inner.session.failed_attempts,
            remaining_attempts: self
                .config
                .max_attempts
                .saturating_sub(inner.session.failed_attempts),
            lockout_remaining_secs: lockout.map(ceil_secs),
            lockout_timer: lockout.map(format_countdown),
            resend_available_in_secs: inner.resend.remaining(now).map(ceil_secs).unwrap_or(0),
        }
    }

    fn locked_for(&self, inner: &GateState) -> Option<Duration> {
        match inner.state {
            OtpState::LockedOut { until } => {
                let now = self.clock.now();
                Some((until - now).to_std().unwrap_or_default())
            }
            _ => None,
        }
    }

    async fn expire_lockout(&self, inner: &mut GateState) {
        if let OtpState::LockedOut { until } = inner.state {
            if self.clock.now() >= until {
                self.clear(inner).await;
                inner.state = OtpState::AwaitingCode;
                info!(email = %inner.session.email, "OTP lockout expired");
            }
        }
    }

    /// Reset counters in memory and in the store.
    async fn clear(&self, inner: &mut GateState) {
        inner.session.failed_attempts = 0;
        inner.session.lockout_until = None;
        let email = inner.session.email.clone();
        for key in [keys::otp_attempts(&email), keys::otp_lockout(&email)] {
            if let Err(e) = self.store.delete(&key).await {
                warn!(key = %key, error = %e, "Failed to clear OTP state");
            }
        }
    }

    async fn persist(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value).await {
            warn!(key = %key, error = %e, "Failed to persist OTP state");
        }
    }
}
