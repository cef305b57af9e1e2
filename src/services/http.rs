//! reqwest-backed collaborator for a real onboarding backend.
//!
//! Endpoints, relative to the configured base URL:
//! - `POST otp/send`, `POST otp/verify`
//! - `GET tenants/subdomains/{subdomain}/availability`, `POST tenants`
//! - `POST admins`
//! - `PUT org-profile`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::{
    AdminAccount, AdminService, AvailabilityResponse, CreateAdminRequest, CreateTenantPayload,
    CreatedTenant, OrgProfileService, OtpService, TenantService, VerifyResponse,
};
use crate::error::ServiceError;
use crate::onboarding::model::OrgProfile;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ServiceError::transport("http", format!("client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Map a non-success status to a `ServiceError`.
    async fn check_status(
        service: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(service, status = %status, "Backend call failed");
        Err(match status {
            StatusCode::CONFLICT => ServiceError::AlreadyExists {
                resource: service.to_string(),
            },
            s if s.is_server_error() => ServiceError::ServerError {
                service: service.to_string(),
            },
            _ => ServiceError::Rejected {
                service: service.to_string(),
                reason: format!("{status}: {body}"),
            },
        })
    }

    async fn decode<T: DeserializeOwned>(
        service: &str,
        response: reqwest::Response,
    ) -> Result<T, ServiceError> {
        response.json::<T>().await.map_err(|e| ServiceError::InvalidResponse {
            service: service.to_string(),
            reason: e.to_string(),
        })
    }
}

fn transport(service: &str) -> impl FnOnce(reqwest::Error) -> ServiceError + '_ {
    move |e| ServiceError::transport(service, e.to_string())
}

#[async_trait]
impl OtpService for HttpBackend {
    async fn send_code(&self, email: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .post(self.url("otp/send"))
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await
            .map_err(transport("otp"))?;
        Self::check_status("otp", response).await?;
        Ok(())
    }

    async fn verify_code(&self, email: &str, code: &str) -> Result<VerifyResponse, ServiceError> {
        let response = self
            .client
            .post(self.url("otp/verify"))
            .json(&serde_json::json!({ "email": email, "otp": code }))
            .send()
            .await
            .map_err(transport("otp"))?;
        let response = Self::check_status("otp", response).await?;
        Self::decode("otp", response).await
    }
}

#[async_trait]
impl TenantService for HttpBackend {
    async fn check_subdomain_availability(
        &self,
        subdomain: &str,
    ) -> Result<AvailabilityResponse, ServiceError> {
        let response = self
            .client
            .get(self.url(&format!("tenants/subdomains/{subdomain}/availability")))
            .send()
            .await
            .map_err(transport("tenant"))?;
        let response = Self::check_status("tenant", response).await?;
        Self::decode("tenant", response).await
    }

    async fn create_tenant(
        &self,
        payload: &CreateTenantPayload,
    ) -> Result<CreatedTenant, ServiceError> {
        let response = self
            .client
            .post(self.url("tenants"))
            .json(payload)
            .send()
            .await
            .map_err(transport("tenant"))?;
        let response = Self::check_status("tenant", response).await?;
        Self::decode("tenant", response).await
    }
}

#[async_trait]
impl AdminService for HttpBackend {
    async fn create_admin(
        &self,
        request: &CreateAdminRequest,
    ) -> Result<AdminAccount, ServiceError> {
        let body = serde_json::json!({
            "tenant_id": request.tenant_id,
            "full_name": request.full_name,
            "email": request.email,
            "password": request.password.expose_secret(),
        });
        let response = self
            .client
            .post(self.url("admins"))
            .json(&body)
            .send()
            .await
            .map_err(transport("admin"))?;
        let response = Self::check_status("admin", response).await?;
        Self::decode("admin", response).await
    }
}

#[async_trait]
impl OrgProfileService for HttpBackend {
    async fn save_profile(&self, profile: &OrgProfile) -> Result<(), ServiceError> {
        let response = self
            .client
            .put(self.url("org-profile"))
            .json(profile)
            .send()
            .await
            .map_err(transport("org-profile"))?;
        Self::check_status("org-profile", response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let backend = HttpBackend::new("http://localhost:9000/api/").unwrap();
        assert_eq!(backend.url("otp/send"), "http://localhost:9000/api/otp/send");
    }

    #[tokio::test]
    async fn unreachable_backend_is_transport_error() {
        let backend = HttpBackend::new("http://127.0.0.1:1").unwrap();
        let err = backend.send_code("a@b.co").await.unwrap_err();
        assert!(matches!(err, ServiceError::Transport { .. }));
    }
}
