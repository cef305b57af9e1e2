//! Remote collaborators consumed by the onboarding flow.
//!
//! Each concern is a small async trait so the flow can run against the bundled
//! [`MockBackend`], the reqwest-backed [`HttpBackend`], or a test stub.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::onboarding::model::OrgProfile;

pub use http::HttpBackend;
pub use mock::MockBackend;

/// Response to a code verification. `success: false` is a business rejection,
/// not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub success: bool,
}

/// Response to a subdomain availability lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub available: bool,
}

/// Tenant creation request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTenantPayload {
    pub organization_name: String,
    pub country: String,
    pub requested_subdomain: String,
    pub admin_email: String,
}

/// A tenant the backend has created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedTenant {
    pub tenant_id: String,
    pub realm_url: String,
    pub admin_user_id: String,
}

/// Admin account creation request.
#[derive(Debug)]
pub struct CreateAdminRequest {
    pub tenant_id: String,
    pub full_name: String,
    pub email: String,
    pub password: SecretString,
}

/// An admin account the backend has created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminAccount {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub tenant_id: String,
}

/// One-time passcode delivery and verification.
#[async_trait]
pub trait OtpService: Send + Sync {
    async fn send_code(&self, email: &str) -> Result<(), ServiceError>;

    async fn verify_code(&self, email: &str, code: &str) -> Result<VerifyResponse, ServiceError>;
}

/// Tenant directory: subdomain lookups and tenant creation.
#[async_trait]
pub trait TenantService: Send + Sync {
    async fn check_subdomain_availability(
        &self,
        subdomain: &str,
    ) -> Result<AvailabilityResponse, ServiceError>;

    async fn create_tenant(
        &self,
        payload: &CreateTenantPayload,
    ) -> Result<CreatedTenant, ServiceError>;
}

/// Admin account creation.
#[async_trait]
pub trait AdminService: Send + Sync {
    async fn create_admin(&self, request: &CreateAdminRequest)
    -> Result<AdminAccount, ServiceError>;
}

/// Organization profile persistence.
#[async_trait]
pub trait OrgProfileService: Send + Sync {
    async fn save_profile(&self, profile: &OrgProfile) -> Result<(), ServiceError>;
}
