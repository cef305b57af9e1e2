//! REST endpoints for the onboarding wizard.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use secrecy::SecretString;
use serde::Deserialize;
use uuid::Uuid;

use super::manager::{OnboardingManager, OrganizationRequest};
use super::model::{AdminAccountForm, OrgProfile};
use crate::error::OnboardingError;
use crate::otp::ceil_secs;

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub manager: Arc<OnboardingManager>,
}

impl OnboardingError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidEmail
            | Self::InvalidCodeFormat
            | Self::InvalidOrganizationName
            | Self::CountryRequired
            | Self::Field { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::VerificationFailed => StatusCode::UNAUTHORIZED,
            Self::LockedOut { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::ReservedSubdomain
            | Self::SubdomainTaken
            | Self::SubdomainNotConfirmed
            | Self::AdminAlreadyExists
            | Self::WrongStep { .. } => StatusCode::CONFLICT,
            Self::SubdomainCheckFailed => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable | Self::CircuitBreakerTripped => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for OnboardingError {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({
            "error": self.to_string(),
            "message_key": self.message_key(),
        });
        match &self {
            Self::LockedOut { remaining } => {
                body["retry_after_secs"] = ceil_secs(*remaining).into();
            }
            Self::CircuitBreakerTripped => {
                body["circuit_breaker"] = true.into();
            }
            Self::Field { field, .. } => {
                body["field"] = field.clone().into();
            }
            _ => {}
        }
        (self.status_code(), Json(body)).into_response()
    }
}

fn parse_id(id: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(id).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Invalid session ID"})),
        )
            .into_response()
    })
}

/// Run a manager call against a path id and render the result as JSON.
macro_rules! respond {
    ($id:expr, |$uuid:ident| $call:expr) => {
        match parse_id(&$id) {
            Ok($uuid) => match $call.await {
                Ok(value) => Json(value).into_response(),
                Err(e) => e.into_response(),
            },
            Err(resp) => resp,
        }
    };
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

#[derive(Deserialize, Default)]
struct CreateSessionRequest {
    #[serde(default)]
    locale: Option<String>,
}

/// POST /api/onboarding/sessions
async fn create_session(
    State(state): State<OnboardingRouteState>,
    Json(body): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    let session = state.manager.create_session(body.locale.as_deref()).await;
    (StatusCode::CREATED, Json(session))
}

async fn get_session(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> Response {
    respond!(id, |id| state.manager.get_session(id))
}

#[derive(Deserialize)]
struct EmailRequest {
    email: String,
}

async fn submit_email(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
    Json(body): Json<EmailRequest>,
) -> Response {
    respond!(id, |id| state.manager.submit_email(id, &body.email))
}

async fn resend_code(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> Response {
    respond!(id, |id| state.manager.resend_code(id))
}

#[derive(Deserialize)]
struct VerifyRequest {
    code: String,
}

async fn verify_code(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
    Json(body): Json<VerifyRequest>,
) -> Response {
    respond!(id, |id| state.manager.verify_code(id, &body.code))
}

async fn otp_status(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> Response {
    respond!(id, |id| state.manager.otp_status(id))
}

#[derive(Deserialize)]
struct SubdomainCheckRequest {
    organization_name: String,
}

async fn check_subdomain(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
    Json(body): Json<SubdomainCheckRequest>,
) -> Response {
    respond!(id, |id| state
        .manager
        .check_subdomain(id, &body.organization_name))
}

async fn subdomain_input(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
    Json(body): Json<SubdomainCheckRequest>,
) -> Response {
    match parse_id(&id) {
        Ok(id) => match state
            .manager
            .subdomain_input(id, &body.organization_name)
            .await
        {
            Ok(candidate) => (StatusCode::ACCEPTED, Json(candidate)).into_response(),
            Err(e) => e.into_response(),
        },
        Err(resp) => resp,
    }
}

async fn submit_organization(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
    Json(body): Json<OrganizationRequest>,
) -> Response {
    respond!(id, |id| state.manager.submit_organization(id, &body))
}

#[derive(Deserialize)]
struct AdminRequest {
    full_name: String,
    password: String,
    confirm_password: String,
}

async fn create_admin(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
    Json(body): Json<AdminRequest>,
) -> Response {
    let form = AdminAccountForm {
        full_name: body.full_name,
        password: SecretString::from(body.password),
        confirm_password: SecretString::from(body.confirm_password),
    };
    match parse_id(&id) {
        Ok(id) => match state.manager.create_admin(id, form).await {
            Ok(admin) => (StatusCode::CREATED, Json(admin)).into_response(),
            Err(e) => e.into_response(),
        },
        Err(resp) => resp,
    }
}

async fn save_profile_draft(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
    Json(body): Json<OrgProfile>,
) -> Response {
    respond!(id, |id| state.manager.save_profile_draft(id, body))
}

#[derive(Deserialize)]
struct ConnectivityRequest {
    offline: bool,
}

async fn set_connectivity(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
    Json(body): Json<ConnectivityRequest>,
) -> Response {
    respond!(id, |id| state.manager.set_offline(id, body.offline))
}

async fn submit_profile(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
    Json(body): Json<OrgProfile>,
) -> Response {
    respond!(id, |id| state.manager.submit_profile(id, body))
}

async fn get_status(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> Response {
    respond!(id, |id| state.manager.status(id))
}

/// Build the onboarding REST routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/onboarding/sessions", post(create_session))
        .route("/api/onboarding/sessions/{id}", get(get_session))
        .route("/api/onboarding/sessions/{id}/email", post(submit_email))
        .route("/api/onboarding/sessions/{id}/otp/resend", post(resend_code))
        .route("/api/onboarding/sessions/{id}/otp/verify", post(verify_code))
        .route("/api/onboarding/sessions/{id}/otp/status", get(otp_status))
        .route(
            "/api/onboarding/sessions/{id}/subdomain/check",
            post(check_subdomain),
        )
        .route(
            "/api/onboarding/sessions/{id}/subdomain/input",
            post(subdomain_input),
        )
        .route(
            "/api/onboarding/sessions/{id}/organization",
            post(submit_organization),
        )
        .route("/api/onboarding/sessions/{id}/admin", post(create_admin))
        .route(
            "/api/onboarding/sessions/{id}/profile/draft",
            put(save_profile_draft),
        )
        .route(
            "/api/onboarding/sessions/{id}/profile/connectivity",
            put(set_connectivity),
        )
        .route("/api/onboarding/sessions/{id}/profile", post(submit_profile))
        .route("/api/onboarding/sessions/{id}/status", get(get_status))
        .with_state(state)
}
