//! OnboardingManager — owns wizard sessions and drives each step through the
//! OTP gate, subdomain validator and tenant provisioner.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use super::autosave::{AutosaveStatus, ProfileAutosaver, load_draft};
use super::model::{
    AdminAccountForm, OnboardingSession, OrgProfile, is_public_domain, validate_email,
};
use super::state::WizardStep;
use crate::clock::Clock;
use crate::config::OnboardingConfig;
use crate::error::{OnboardingError, ServiceError};
use crate::i18n::safe_locale;
use crate::otp::{CodeRequest, OtpGate, OtpStatus, spawn_lockout_countdown};
use crate::provisioning::{CreateTenantOutcome, TenantProvisioner};
use crate::services::{
    AdminAccount, AdminService, CreateAdminRequest, CreateTenantPayload, OrgProfileService,
    OtpService, TenantService,
};
use crate::store::{KeyValueStore, keys};
use crate::subdomain::{SubdomainCandidate, SubdomainPipeline, SubdomainValidator};

/// Remote collaborators the wizard talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub otp: Arc<dyn OtpService>,
    pub tenants: Arc<dyn TenantService>,
    pub admins: Arc<dyn AdminService>,
    pub profiles: Arc<dyn OrgProfileService>,
}

impl Collaborators {
    /// Use one backend for every concern.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: OtpService + TenantService + AdminService + OrgProfileService + 'static,
    {
        Self {
            otp: backend.clone(),
            tenants: backend.clone(),
            admins: backend.clone(),
            profiles: backend,
        }
    }
}

/// Organization step submission.
#[derive(Debug, Clone, Deserialize)]
pub struct OrganizationRequest {
    pub organization_name: String,
    #[serde(default)]
    pub country: String,
}

/// Everything a client needs to render the current step.
#[derive(Debug, Clone, Serialize)]
pub struct WizardStatus {
    pub session: OnboardingSession,
    pub step_index: usize,
    pub step_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<OtpStatus>,
    pub subdomain: SubdomainCandidate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autosave: Option<AutosaveStatus>,
}

/// Per-session runtime state next to the serializable session.
struct SessionSlot {
    session: OnboardingSession,
    otp: Option<Arc<OtpGate>>,
    countdown: Option<JoinHandle<()>>,
    /// Debounced subdomain checks; its latest candidate is the session's.
    subdomain: SubdomainPipeline,
    autosaver: Option<ProfileAutosaver>,
    last_seen: DateTime<Utc>,
}

impl SessionSlot {
    /// Whether the slot should be evicted at `now`.
    fn is_expired(&self, now: DateTime<Utc>, config: &OnboardingConfig) -> bool {
        let elapsed = |since: DateTime<Utc>| (now - since).to_std().unwrap_or_default();
        match self.session.completed_at {
            Some(done) => elapsed(done) >= config.completed_session_ttl,
            None => elapsed(self.last_seen) >= config.session_ttl,
        }
    }

    fn gate(&self) -> Result<Arc<OtpGate>, OnboardingError> {
        self.otp.clone().ok_or_else(|| OnboardingError::WrongStep {
            step: self.session.step,
            action: "otp".to_string(),
        })
    }

    /// Start the lockout countdown unless one is already running.
    async fn ensure_countdown(&mut self) {
        let Some(gate) = self.otp.clone() else {
            return;
        };
        if !gate.state().await.is_locked_out() {
            return;
        }
        if self.countdown.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        self.countdown = Some(spawn_lockout_countdown(gate));
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.countdown.take() {
            handle.abort();
        }
    }
}

/// Coordinates the wizard: step order, collaborators and per-session state.
pub struct OnboardingManager {
    config: OnboardingConfig,
    services: Collaborators,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    validator: Arc<SubdomainValidator>,
    provisioner: TenantProvisioner,
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<SessionSlot>>>>,
}

impl OnboardingManager {
    pub fn new(
        config: OnboardingConfig,
        services: Collaborators,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let validator = Arc::new(SubdomainValidator::new(
            services.tenants.clone(),
            config.reserved_subdomains.clone(),
            &config.domain_suffix,
        ));
        let provisioner = TenantProvisioner::new(services.tenants.clone());
        Self {
            config,
            services,
            store,
            clock,
            validator,
            provisioner,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &OnboardingConfig {
        &self.config
    }

    /// Start a new wizard run.
    pub async fn create_session(&self, locale: Option<&str>) -> OnboardingSession {
        let now = self.clock.now();
        let session = OnboardingSession::new(safe_locale(locale), now);
        let slot = SessionSlot {
            session: session.clone(),
            otp: None,
            countdown: None,
            subdomain: SubdomainPipeline::new(
                Arc::clone(&self.validator),
                self.config.subdomain.clone(),
            ),
            autosaver: None,
            last_seen: now,
        };
        self.sessions
            .write()
            .await
            .insert(session.id, Arc::new(Mutex::new(slot)));
        info!(session_id = %session.id, locale = %session.locale, "Onboarding session created");
        session
    }

    async fn slot(&self, id: Uuid) -> Result<Arc<Mutex<SessionSlot>>, OnboardingError> {
        let slot = self
            .sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(OnboardingError::SessionNotFound(id))?;
        slot.lock().await.last_seen = self.clock.now();
        Ok(slot)
    }

    pub async fn get_session(&self, id: Uuid) -> Result<OnboardingSession, OnboardingError> {
        let slot = self.slot(id).await?;
        let slot = slot.lock().await;
        Ok(slot.session.clone())
    }

    /// Drop a session and stop its background tasks.
    pub async fn remove_session(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Evict idle sessions and completed ones past their retention.
    /// Sessions with a request in progress are left for the next sweep.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, slot| match slot.try_lock() {
            Ok(slot) => !slot.is_expired(now, &self.config),
            Err(_) => true,
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, remaining = sessions.len(), "Expired onboarding sessions evicted");
        }
        evicted
    }

    /// Email entry: validate, move to OTP verification and send the first code.
    pub async fn submit_email(
        &self,
        id: Uuid,
        email: &str,
    ) -> Result<WizardStatus, OnboardingError> {
        let slot = self.slot(id).await?;
        let mut slot = slot.lock().await;
        slot.session.require_step(WizardStep::EmailEntry, "submit_email")?;

        let email = validate_email(email)?;
        let gate = OtpGate::enter(
            &email,
            self.services.otp.clone(),
            self.store.clone(),
            self.clock.clone(),
            self.config.otp.clone(),
        )
        .await;

        slot.session.public_domain_warning = is_public_domain(&email);
        slot.session.email = Some(email);
        slot.otp = Some(Arc::new(gate));
        slot.session.advance(self.clock.now())?;
        slot.ensure_countdown().await;

        info!(session_id = %id, "Email accepted");
        Ok(self.status_of(&slot).await)
    }

    pub async fn resend_code(&self, id: Uuid) -> Result<CodeRequest, OnboardingError> {
        let slot = self.slot(id).await?;
        let slot = slot.lock().await;
        slot.session.require_step(WizardStep::OtpVerification, "resend_code")?;
        slot.gate()?.resend_code().await
    }

    /// Verify a code; success moves on to organization setup.
    pub async fn verify_code(
        &self,
        id: Uuid,
        code: &str,
    ) -> Result<OnboardingSession, OnboardingError> {
        let entry = self.slot(id).await?;
        let gate = {
            let slot = entry.lock().await;
            slot.session.require_step(WizardStep::OtpVerification, "verify_code")?;
            slot.gate()?
        };

        // Unlocked during the remote call so status reads stay responsive.
        let result = gate.submit_code(code).await;

        let mut slot = entry.lock().await;
        if let Err(e) = result {
            if matches!(e, OnboardingError::LockedOut { .. }) {
                slot.ensure_countdown().await;
            }
            return Err(e);
        }

        // A concurrent submit may already have advanced the session.
        if slot.session.step == WizardStep::OtpVerification {
            slot.session.advance(self.clock.now())?;
            info!(session_id = %id, "Email verified");
        }
        Ok(slot.session.clone())
    }

    pub async fn otp_status(&self, id: Uuid) -> Result<OtpStatus, OnboardingError> {
        let entry = self.slot(id).await?;
        let gate = entry.lock().await.gate()?;
        Ok(gate.status().await)
    }

    /// One-shot subdomain check for the organization step.
    pub async fn check_subdomain(
        &self,
        id: Uuid,
        organization_name: &str,
    ) -> Result<SubdomainCandidate, OnboardingError> {
        let slot = self.slot(id).await?;
        let slot = slot.lock().await;
        slot.session
            .require_step(WizardStep::OrganizationSetup, "check_subdomain")?;

        let previous = slot.subdomain.current();
        let candidate = self.validator.validate(organization_name, &previous).await;
        slot.subdomain.record(candidate.clone());
        Ok(candidate)
    }

    /// Keystroke-level input: feeds the session's debounced pipeline and
    /// returns the candidate published so far. Poll `status` for the result.
    pub async fn subdomain_input(
        &self,
        id: Uuid,
        organization_name: &str,
    ) -> Result<SubdomainCandidate, OnboardingError> {
        let slot = self.slot(id).await?;
        let slot = slot.lock().await;
        slot.session
            .require_step(WizardStep::OrganizationSetup, "subdomain_input")?;

        slot.subdomain.on_input(organization_name);
        Ok(slot.subdomain.current())
    }

    /// Organization step: re-validate the subdomain, then create the tenant.
    pub async fn submit_organization(
        &self,
        id: Uuid,
        request: &OrganizationRequest,
    ) -> Result<WizardStatus, OnboardingError> {
        let slot = self.slot(id).await?;
        let mut slot = slot.lock().await;
        slot.session
            .require_step(WizardStep::OrganizationSetup, "submit_organization")?;

        let organization_name = request.organization_name.trim();
        if organization_name.is_empty() {
            return Err(OnboardingError::InvalidOrganizationName);
        }
        let country = request.country.trim();
        if country.is_empty() {
            return Err(OnboardingError::CountryRequired);
        }

        let previous = slot.subdomain.current();
        let candidate = self.validator.validate(organization_name, &previous).await;
        slot.subdomain.record(candidate.clone());
        if let Some(err) = candidate.onboarding_error() {
            info!(session_id = %id, subdomain = %candidate.normalized, error = %err, "Organization rejected");
            return Err(err);
        }

        let admin_email = slot.session.email.clone().unwrap_or_default();
        let payload = CreateTenantPayload {
            organization_name: organization_name.to_string(),
            country: country.to_string(),
            requested_subdomain: candidate.normalized.clone(),
            admin_email,
        };

        let tenant = match self
            .provisioner
            .create_with_retry(&payload, self.config.provisioning.max_retries)
            .await
        {
            CreateTenantOutcome::Success(tenant) => tenant,
            CreateTenantOutcome::CircuitBreakerTripped { message, .. } => {
                warn!(session_id = %id, message = %message, "Tenant creation gave up");
                return Err(OnboardingError::CircuitBreakerTripped);
            }
        };

        slot.session.organization_name = Some(payload.organization_name);
        slot.session.subdomain = Some(candidate.normalized);
        slot.session.tenant = Some(tenant);
        slot.session.advance(self.clock.now())?;
        Ok(self.status_of(&slot).await)
    }

    /// Admin step: validate the form, create the admin, start profile autosave.
    pub async fn create_admin(
        &self,
        id: Uuid,
        form: AdminAccountForm,
    ) -> Result<AdminAccount, OnboardingError> {
        let slot = self.slot(id).await?;
        let mut slot = slot.lock().await;
        slot.session.require_step(WizardStep::AdminAccount, "create_admin")?;

        let full_name = form.validate()?;
        let tenant_id = slot
            .session
            .tenant
            .as_ref()
            .map(|t| t.tenant_id.clone())
            .unwrap_or_default();
        let request = CreateAdminRequest {
            tenant_id,
            full_name,
            email: slot.session.email.clone().unwrap_or_default(),
            password: form.password,
        };

        let admin = self
            .services
            .admins
            .create_admin(&request)
            .await
            .map_err(|e| match e {
                ServiceError::AlreadyExists { .. } => OnboardingError::AdminAlreadyExists,
                ServiceError::Rejected { reason, .. } => OnboardingError::field("password", reason),
                other => {
                    warn!(session_id = %id, error = %other, "Admin creation failed");
                    OnboardingError::ServiceUnavailable
                }
            })?;

        let draft_key = keys::org_profile_draft(&request.email);
        slot.session.admin = Some(admin.clone());
        slot.session.advance(self.clock.now())?;
        if slot.session.profile.is_none() {
            slot.session.profile = load_draft(self.store.as_ref(), &draft_key).await;
        }
        slot.autosaver = Some(ProfileAutosaver::new(
            self.services.profiles.clone(),
            self.store.clone(),
            draft_key,
            self.config.autosave.clone(),
        ));
        info!(session_id = %id, admin_id = %admin.id, "Admin account created");
        Ok(admin)
    }

    /// Record a profile draft; the autosaver persists it after the debounce.
    pub async fn save_profile_draft(
        &self,
        id: Uuid,
        profile: OrgProfile,
    ) -> Result<AutosaveStatus, OnboardingError> {
        let slot = self.slot(id).await?;
        let mut slot = slot.lock().await;
        slot.session
            .require_step(WizardStep::OrganizationProfile, "save_profile_draft")?;

        slot.session.profile = Some(profile.clone());
        let autosaver = slot.autosaver.as_ref().ok_or_else(|| OnboardingError::WrongStep {
            step: slot.session.step,
            action: "save_profile_draft".to_string(),
        })?;
        autosaver.update_draft(profile);
        Ok(autosaver.status())
    }

    /// Toggle offline mode for a session's autosave. Going back online
    /// flushes a draft that was kept locally.
    pub async fn set_offline(
        &self,
        id: Uuid,
        offline: bool,
    ) -> Result<AutosaveStatus, OnboardingError> {
        let slot = self.slot(id).await?;
        let slot = slot.lock().await;
        slot.session
            .require_step(WizardStep::OrganizationProfile, "set_offline")?;

        let autosaver = slot.autosaver.as_ref().ok_or_else(|| OnboardingError::WrongStep {
            step: slot.session.step,
            action: "set_offline".to_string(),
        })?;
        autosaver.set_offline(offline);
        info!(session_id = %id, offline, "Autosave connectivity changed");
        Ok(autosaver.status())
    }

    /// Final profile submission completes the wizard.
    pub async fn submit_profile(
        &self,
        id: Uuid,
        profile: OrgProfile,
    ) -> Result<OnboardingSession, OnboardingError> {
        let slot = self.slot(id).await?;
        let mut slot = slot.lock().await;
        slot.session
            .require_step(WizardStep::OrganizationProfile, "submit_profile")?;

        profile.validate()?;
        if let Some(autosaver) = slot.autosaver.as_ref() {
            autosaver.cancel();
        }

        if let Err(e) = self.services.profiles.save_profile(&profile).await {
            warn!(session_id = %id, error = %e, "Profile save failed");
            return Err(OnboardingError::ServiceUnavailable);
        }

        let email = slot.session.email.clone().unwrap_or_default();
        if let Err(e) = self.store.delete(&keys::org_profile_draft(&email)).await {
            warn!(session_id = %id, error = %e, "Failed to clear profile draft");
        }

        slot.autosaver = None;
        slot.session.profile = Some(profile);
        slot.session.advance(self.clock.now())?;
        info!(session_id = %id, "Onboarding complete");
        Ok(slot.session.clone())
    }

    pub async fn status(&self, id: Uuid) -> Result<WizardStatus, OnboardingError> {
        let slot = self.slot(id).await?;
        let slot = slot.lock().await;
        Ok(self.status_of(&slot).await)
    }

    async fn status_of(&self, slot: &SessionSlot) -> WizardStatus {
        let otp = match slot.otp.as_ref() {
            Some(gate) => Some(gate.status().await),
            None => None,
        };
        WizardStatus {
            session: slot.session.clone(),
            step_index: slot.session.step.index(),
            step_count: WizardStep::COUNT,
            otp,
            subdomain: slot.subdomain.current(),
            autosave: slot.autosaver.as_ref().map(|a| a.status()),
        }
    }
}

/// Periodically evict expired sessions.
pub fn spawn_session_sweeper(
    manager: Arc<OnboardingManager>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            manager.sweep_expired().await;
        }
    })
}
