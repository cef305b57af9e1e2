//! Subdomain derivation: normalization, reserved prefixes, and availability state.
//!
//! [`SubdomainValidator`] validates a single organization name;
//! [`SubdomainPipeline`] drives it from keystrokes with debounce and cancellation.

pub mod pipeline;
pub mod validator;

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::OnboardingError;

pub use pipeline::SubdomainPipeline;
pub use validator::SubdomainValidator;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Turn a free-text organization name into a DNS-label-safe string.
///
/// The result only contains `[a-z0-9-]`, never starts or ends with `-`, and
/// never contains `--`. It may be empty.
pub fn normalize(org_name: &str) -> String {
    let lowered = org_name.to_lowercase();
    let hyphenated = WHITESPACE_RUN.replace_all(lowered.trim(), "-");

    let mut out = String::with_capacity(hyphenated.len());
    for c in hyphenated.chars() {
        match c {
            'a'..='z' | '0'..='9' => out.push(c),
            '-' if !out.ends_with('-') => out.push('-'),
            _ => {}
        }
    }

    out.trim_matches('-').to_string()
}

/// Whether `subdomain` starts with any reserved word (case-insensitive).
///
/// Prefix match: `admin-team` is reserved when `admin` is, `myadmin` is not.
pub fn is_reserved<S: AsRef<str>>(subdomain: &str, reserved_words: &[S]) -> bool {
    let clean = subdomain.trim().to_lowercase();
    reserved_words.iter().any(|word| {
        let word = word.as_ref().trim().to_lowercase();
        !word.is_empty() && clean.starts_with(&word)
    })
}

/// `acme` → `acme.<suffix>`.
pub fn format_subdomain(subdomain: &str, suffix: &str) -> String {
    format!("{subdomain}.{suffix}")
}

/// Remote availability of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    #[default]
    Idle,
    Checking,
    Available,
    Unavailable,
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Available => "available",
            Self::Unavailable => "unavailable",
        };
        write!(f, "{s}")
    }
}

/// Why a candidate cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubdomainError {
    /// Input had content but nothing survived normalization.
    InvalidFormat,
    Reserved,
    Taken,
    /// The availability lookup itself failed.
    CheckFailed,
}

impl From<SubdomainError> for OnboardingError {
    fn from(err: SubdomainError) -> Self {
        match err {
            SubdomainError::InvalidFormat => OnboardingError::InvalidOrganizationName,
            SubdomainError::Reserved => OnboardingError::ReservedSubdomain,
            SubdomainError::Taken => OnboardingError::SubdomainTaken,
            SubdomainError::CheckFailed => OnboardingError::SubdomainCheckFailed,
        }
    }
}

/// Validation state derived from one organization-name input.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubdomainCandidate {
    pub raw_input: String,
    pub normalized: String,
    /// `normalized` plus the domain suffix, empty when `normalized` is.
    pub full_domain: String,
    pub is_reserved: bool,
    pub availability: Availability,
    pub error: Option<SubdomainError>,
}

impl SubdomainCandidate {
    /// Whether the candidate can be submitted for tenant creation.
    pub fn is_valid(&self) -> bool {
        !self.normalized.is_empty()
            && !self.is_reserved
            && self.error.is_none()
            && self.availability == Availability::Available
    }

    /// The blocking error, if any, as a user-facing onboarding error.
    pub fn onboarding_error(&self) -> Option<OnboardingError> {
        if let Some(err) = self.error {
            return Some(err.into());
        }
        match self.availability {
            Availability::Available => None,
            _ if self.normalized.is_empty() => Some(OnboardingError::InvalidOrganizationName),
            _ => Some(OnboardingError::SubdomainNotConfirmed),
        }
    }
}
