//! Error types for the onboarding service.

use std::time::Duration;

use crate::onboarding::WizardStep;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Onboarding error: {0}")]
    Onboarding(#[from] OnboardingError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Key-value store errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors returned by remote collaborators (OTP, tenant, admin, profile APIs).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Transport error calling {service}: {reason}")]
    Transport { service: String, reason: String },

    #[error("Invalid response from {service}: {reason}")]
    InvalidResponse { service: String, reason: String },

    #[error("Rejected by {service}: {reason}")]
    Rejected { service: String, reason: String },

    #[error("{resource} already exists")]
    AlreadyExists { resource: String },

    #[error("Server error from {service}")]
    ServerError { service: String },
}

impl ServiceError {
    /// Shorthand for a transport failure.
    pub fn transport(service: &str, reason: impl Into<String>) -> Self {
        Self::Transport {
            service: service.to_string(),
            reason: reason.into(),
        }
    }
}

/// User-facing onboarding errors. Each maps to a stable message key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OnboardingError {
    #[error("Please enter a valid email address")]
    InvalidEmail,

    #[error("Please enter the 6-digit code")]
    InvalidCodeFormat,

    #[error("Verification failed. Please try again.")]
    VerificationFailed,

    #[error("Too many failed attempts. Try again in {remaining:?}")]
    LockedOut { remaining: Duration },

    #[error("Unable to reach the verification service. Please try again.")]
    ServiceUnavailable,

    #[error("Invalid organization name format")]
    InvalidOrganizationName,

    #[error("Reserved subdomain")]
    ReservedSubdomain,

    #[error("Subdomain already in use")]
    SubdomainTaken,

    #[error("Failed to check subdomain availability")]
    SubdomainCheckFailed,

    #[error("Subdomain availability has not been confirmed")]
    SubdomainNotConfirmed,

    #[error("Country is required")]
    CountryRequired,

    #[error("Failed to create tenant after maximum retries")]
    CircuitBreakerTripped,

    #[error("{field}: {message}")]
    Field { field: String, message: String },

    #[error("Admin account already exists")]
    AdminAlreadyExists,

    #[error("Cannot perform {action} during step {step}")]
    WrongStep { step: WizardStep, action: String },

    #[error("Session {0} not found")]
    SessionNotFound(uuid::Uuid),
}

impl OnboardingError {
    /// Stable i18n key for this error.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::InvalidEmail => "email-entry.email-error",
            Self::InvalidCodeFormat => "otp.otp-error",
            Self::VerificationFailed | Self::ServiceUnavailable => "otp.verification-failed",
            Self::LockedOut { .. } => "otp.lockout-error",
            Self::InvalidOrganizationName => "org-setup.org-name-error",
            Self::ReservedSubdomain => "org-setup.subdomain-reserved",
            Self::SubdomainTaken => "org-setup.subdomain-taken",
            Self::SubdomainCheckFailed => "org-setup.subdomain-check-failed",
            Self::SubdomainNotConfirmed => "org-setup.subdomain-checking",
            Self::CountryRequired => "org-setup.country-error",
            Self::CircuitBreakerTripped => "org-setup.circuit-breaker",
            Self::Field { .. } => "form.field-error",
            Self::AdminAlreadyExists => "admin-account.already-exists",
            Self::WrongStep { .. } => "onboarding.wrong-step",
            Self::SessionNotFound(_) => "onboarding.session-not-found",
        }
    }

    /// Shorthand for a single-field validation error.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        Self::Field {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
