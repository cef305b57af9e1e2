//! Configuration types.

use std::time::Duration;

/// Reserved subdomain prefixes used when `ONBOARD_RESERVED_SUBDOMAINS` is unset.
pub const DEFAULT_RESERVED_SUBDOMAINS: &[&str] = &[
    "admin", "api", "app", "auth", "billing", "blog", "cdn", "dashboard", "dev", "docs",
    "ftp", "help", "login", "mail", "portal", "root", "smtp", "staging", "status", "support",
    "system", "test", "www",
];

/// Onboarding service configuration.
#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    /// HTTP port for the REST server.
    pub port: u16,
    /// libSQL database path. `None` keeps all state in memory.
    pub db_path: Option<String>,
    /// Base URL of the real onboarding backend. `None` uses the mock backend.
    pub backend_url: Option<String>,
    /// Suffix appended to normalized subdomains, e.g. `acme.onkeypriv.com`.
    pub domain_suffix: String,
    /// Subdomain prefixes that may not be claimed.
    pub reserved_subdomains: Vec<String>,
    pub subdomain: SubdomainConfig,
    pub otp: OtpConfig,
    pub provisioning: ProvisioningConfig,
    pub autosave: AutosaveConfig,
    /// Idle time after which an unfinished session is evicted.
    pub session_ttl: Duration,
    /// How long a completed session stays readable.
    pub completed_session_ttl: Duration,
}

/// Debounce timings for subdomain validation.
#[derive(Debug, Clone)]
pub struct SubdomainConfig {
    /// Quiet period after the last keystroke before normalizing.
    pub debounce: Duration,
    /// Extra delay between normalization and the remote availability check.
    pub check_delay: Duration,
}

impl Default for SubdomainConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(400),
            check_delay: Duration::from_millis(100),
        }
    }
}

/// OTP lockout policy.
#[derive(Debug, Clone)]
pub struct OtpConfig {
    /// Failed verifications allowed before lockout.
    pub max_attempts: u32,
    /// How long a lockout lasts.
    pub lockout_duration: Duration,
    /// Cooldown between resend requests.
    pub resend_cooldown: Duration,
    /// Required code length.
    pub code_length: usize,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_duration: Duration::from_secs(15 * 60),
            resend_cooldown: Duration::from_secs(20),
            code_length: 6,
        }
    }
}

/// Tenant creation retry policy.
#[derive(Debug, Clone)]
pub struct ProvisioningConfig {
    /// Total attempts, including the first.
    pub max_retries: u32,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// Organization profile autosave policy.
#[derive(Debug, Clone)]
pub struct AutosaveConfig {
    pub debounce: Duration,
    /// Retries after a server error; backoff is `2^n` seconds.
    pub max_retries: u32,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(1),
            max_retries: 3,
        }
    }
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: None,
            backend_url: None,
            domain_suffix: "onkeypriv.com".to_string(),
            reserved_subdomains: DEFAULT_RESERVED_SUBDOMAINS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            subdomain: SubdomainConfig::default(),
            otp: OtpConfig::default(),
            provisioning: ProvisioningConfig::default(),
            autosave: AutosaveConfig::default(),
            session_ttl: Duration::from_secs(60 * 60),
            completed_session_ttl: Duration::from_secs(5 * 60),
        }
    }
}

impl OnboardingConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = env_parse("ONBOARD_PORT").unwrap_or(defaults.port);
        let db_path = std::env::var("ONBOARD_DB_PATH").ok().filter(|s| !s.is_empty());
        let backend_url = std::env::var("ONBOARD_BACKEND_URL")
            .ok()
            .filter(|s| !s.is_empty());
        let domain_suffix =
            std::env::var("ONBOARD_DOMAIN_SUFFIX").unwrap_or(defaults.domain_suffix);

        let reserved_subdomains = match std::env::var("ONBOARD_RESERVED_SUBDOMAINS") {
            Ok(list) => parse_list(&list),
            Err(_) => defaults.reserved_subdomains,
        };

        let otp = OtpConfig {
            max_attempts: env_parse("ONBOARD_OTP_MAX_ATTEMPTS")
                .unwrap_or(defaults.otp.max_attempts),
            lockout_duration: env_parse("ONBOARD_OTP_LOCKOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.otp.lockout_duration),
            ..defaults.otp
        };

        let provisioning = ProvisioningConfig {
            max_retries: env_parse("ONBOARD_TENANT_MAX_RETRIES")
                .unwrap_or(defaults.provisioning.max_retries),
        };

        let session_ttl = env_parse("ONBOARD_SESSION_TTL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.session_ttl);

        Self {
            port,
            db_path,
            backend_url,
            domain_suffix,
            reserved_subdomains,
            otp,
            provisioning,
            session_ttl,
            ..defaults
        }
    }
}

/// Parse an env var, warning and returning `None` when it is malformed.
fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring invalid configuration value");
            None
        }
    }
}

/// Split a comma-separated list, lowercasing and dropping blanks.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
