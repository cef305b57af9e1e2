//! Wizard data models and client-side validation rules.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::WizardStep;
use crate::error::OnboardingError;
use crate::i18n::Locale;
use crate::services::{AdminAccount, CreatedTenant};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static regex"));

/// Consumer mail providers that trigger a "use your work email" warning.
pub const PUBLIC_EMAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "yahoo.com",
    "outlook.com",
    "hotmail.com",
    "icloud.com",
    "aol.com",
];

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_ORG_NAME_LEN: usize = 100;

/// Check an email address. Surrounding whitespace is ignored.
pub fn validate_email(email: &str) -> Result<String, OnboardingError> {
    let email = email.trim();
    if EMAIL_RE.is_match(email) {
        Ok(email.to_string())
    } else {
        Err(OnboardingError::InvalidEmail)
    }
}

/// Whether the address belongs to a consumer mail provider.
pub fn is_public_domain(email: &str) -> bool {
    email
        .rsplit_once('@')
        .map(|(_, domain)| {
            let domain = domain.trim().to_lowercase();
            PUBLIC_EMAIL_DOMAINS.contains(&domain.as_str())
        })
        .unwrap_or(false)
}

/// Password strength as shown under the admin password field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordStrength {
    Weak,
    Medium,
    Strong,
}

impl PasswordStrength {
    /// One point each for an uppercase letter, a digit and a symbol.
    /// Passwords under the minimum length are always weak.
    pub fn of(password: &str) -> Self {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Self::Weak;
        }
        let score = [
            password.chars().any(|c| c.is_ascii_uppercase()),
            password.chars().any(|c| c.is_ascii_digit()),
            password.chars().any(|c| !c.is_alphanumeric()),
        ]
        .into_iter()
        .filter(|hit| *hit)
        .count();

        match score {
            0 | 1 => Self::Weak,
            2 => Self::Medium,
            _ => Self::Strong,
        }
    }
}

/// Admin account form as submitted.
#[derive(Debug)]
pub struct AdminAccountForm {
    pub full_name: String,
    pub password: SecretString,
    pub confirm_password: SecretString,
}

impl AdminAccountForm {
    /// Validate the form and return the trimmed full name.
    pub fn validate(&self) -> Result<String, OnboardingError> {
        use secrecy::ExposeSecret;

        let full_name = self.full_name.trim();
        if full_name.chars().count() < 2 {
            return Err(OnboardingError::field(
                "full_name",
                "Full name must be at least 2 characters",
            ));
        }

        let password = self.password.expose_secret();
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(OnboardingError::field(
                "password",
                format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
            ));
        }
        if PasswordStrength::of(password) == PasswordStrength::Weak {
            return Err(OnboardingError::field("password", "Password is too weak"));
        }
        if password != self.confirm_password.expose_secret() {
            return Err(OnboardingError::field(
                "confirm_password",
                "Passwords do not match",
            ));
        }
        Ok(full_name.to_string())
    }
}

/// Organization profile collected on the last form step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgProfile {
    pub org_name: String,
    pub industry: String,
    pub company_size: String,
    pub country: String,
    pub timezone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_email: Option<String>,
    /// Only meaningful when `industry` is `government`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agency_type: Option<String>,
}

impl OrgProfile {
    /// Validate for final submission. Drafts are saved without validation.
    pub fn validate(&self) -> Result<(), OnboardingError> {
        let org_name = self.org_name.trim();
        if org_name.is_empty() {
            return Err(OnboardingError::field("org_name", "Organization name is required"));
        }
        if org_name.chars().count() > MAX_ORG_NAME_LEN {
            return Err(OnboardingError::field(
                "org_name",
                format!("Organization name must be {MAX_ORG_NAME_LEN} characters or less"),
            ));
        }

        let required = [
            ("industry", &self.industry, "Industry is required"),
            ("company_size", &self.company_size, "Company size is required"),
            ("country", &self.country, "Country is required"),
            ("timezone", &self.timezone, "Timezone is required"),
        ];
        for (field, value, message) in required {
            if value.trim().is_empty() {
                return Err(OnboardingError::field(field, message));
            }
        }

        if let Some(email) = self.security_email.as_deref().filter(|e| !e.trim().is_empty()) {
            if validate_email(email).is_err() {
                return Err(OnboardingError::field(
                    "security_email",
                    "Please enter a valid email address",
                ));
            }
        }
        Ok(())
    }
}

/// One wizard run, held in memory by the manager.
#[derive(Debug, Clone, Serialize)]
pub struct OnboardingSession {
    pub id: Uuid,
    pub step: WizardStep,
    pub locale: Locale,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Set when the email is on a consumer domain.
    pub public_domain_warning: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<CreatedTenant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<AdminAccount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<OrgProfile>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl OnboardingSession {
    pub fn new(locale: Locale, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            step: WizardStep::default(),
            locale,
            email: None,
            public_domain_warning: false,
            organization_name: None,
            subdomain: None,
            tenant: None,
            admin: None,
            profile: None,
            created_at: now,
            completed_at: None,
        }
    }

    /// Fail unless the session is on `step`.
    pub fn require_step(&self, step: WizardStep, action: &str) -> Result<(), OnboardingError> {
        if self.step == step {
            Ok(())
        } else {
            Err(OnboardingError::WrongStep {
                step: self.step,
                action: action.to_string(),
            })
        }
    }

    /// Move to the next step.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Result<WizardStep, OnboardingError> {
        let next = self
            .step
            .next()
            .filter(|next| self.step.can_transition_to(*next))
            .ok_or_else(|| OnboardingError::WrongStep {
                step: self.step,
                action: "advance".to_string(),
            })?;
        self.step = next;
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(next)
    }
}
