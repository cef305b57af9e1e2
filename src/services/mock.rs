//! In-process mock backend for local development and demos.
//!
//! - `123456` is the only accepted OTP.
//! - Subdomains containing `taken` are unavailable.
//! - Subdomains containing `fail` make tenant creation fail.
//! - A second admin for the same tenant is rejected as a duplicate.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rand::distributions::Alphanumeric;
use secrecy::ExposeSecret;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    AdminAccount, AdminService, AvailabilityResponse, CreateAdminRequest, CreateTenantPayload,
    CreatedTenant, OrgProfileService, OtpService, TenantService, VerifyResponse,
};
use crate::error::ServiceError;
use crate::onboarding::model::{OrgProfile, PasswordStrength};

/// The code the mock accepts.
pub const MOCK_VALID_CODE: &str = "123456";

pub struct MockBackend {
    domain_suffix: String,
    latency: Duration,
    /// Probability that a profile save answers with a server error.
    profile_failure_rate: f64,
    admins: Mutex<HashSet<String>>,
}

impl MockBackend {
    pub fn new(domain_suffix: &str) -> Self {
        Self {
            domain_suffix: domain_suffix.to_string(),
            latency: Duration::ZERO,
            profile_failure_rate: 0.0,
            admins: Mutex::new(HashSet::new()),
        }
    }

    /// Add a fixed delay to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make a share of profile saves fail with a server error.
    pub fn with_profile_failure_rate(mut self, rate: f64) -> Self {
        self.profile_failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

fn random_id(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(13)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("{prefix}_{suffix}")
}

#[async_trait]
impl OtpService for MockBackend {
    async fn send_code(&self, email: &str) -> Result<(), ServiceError> {
        self.simulate_latency().await;
        info!(email = %email, "Mock OTP sent");
        Ok(())
    }

    async fn verify_code(&self, _email: &str, code: &str) -> Result<VerifyResponse, ServiceError> {
        self.simulate_latency().await;
        Ok(VerifyResponse {
            success: code == MOCK_VALID_CODE,
        })
    }
}

#[async_trait]
impl TenantService for MockBackend {
    async fn check_subdomain_availability(
        &self,
        subdomain: &str,
    ) -> Result<AvailabilityResponse, ServiceError> {
        self.simulate_latency().await;
        Ok(AvailabilityResponse {
            available: !subdomain.contains("taken"),
        })
    }

    async fn create_tenant(
        &self,
        payload: &CreateTenantPayload,
    ) -> Result<CreatedTenant, ServiceError> {
        self.simulate_latency().await;
        if payload.requested_subdomain.contains("fail") {
            return Err(ServiceError::transport(
                "tenant",
                "simulated failure for testing retry logic",
            ));
        }
        Ok(CreatedTenant {
            tenant_id: random_id("tenant"),
            realm_url: format!(
                "https://{}.{}",
                payload.requested_subdomain, self.domain_suffix
            ),
            admin_user_id: random_id("user"),
        })
    }
}

#[async_trait]
impl AdminService for MockBackend {
    async fn create_admin(
        &self,
        request: &CreateAdminRequest,
    ) -> Result<AdminAccount, ServiceError> {
        self.simulate_latency().await;

        if PasswordStrength::of(request.password.expose_secret()) == PasswordStrength::Weak {
            return Err(ServiceError::Rejected {
                service: "admin".to_string(),
                reason: "password too weak".to_string(),
            });
        }

        let mut admins = self.admins.lock().await;
        if !admins.insert(request.tenant_id.clone()) {
            return Err(ServiceError::AlreadyExists {
                resource: "admin account".to_string(),
            });
        }

        Ok(AdminAccount {
            id: random_id("admin"),
            full_name: request.full_name.trim().to_string(),
            email: request.email.clone(),
            tenant_id: request.tenant_id.clone(),
        })
    }
}

#[async_trait]
impl OrgProfileService for MockBackend {
    async fn save_profile(&self, profile: &OrgProfile) -> Result<(), ServiceError> {
        self.simulate_latency().await;
        if self.profile_failure_rate > 0.0
            && rand::thread_rng().gen_bool(self.profile_failure_rate)
        {
            debug!("Mock profile save failing with server error");
            return Err(ServiceError::ServerError {
                service: "org-profile".to_string(),
            });
        }
        debug!(org = %profile.org_name, "Mock profile saved");
        Ok(())
    }
}
