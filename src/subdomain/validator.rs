//! Single-shot subdomain validation against reserved words and the tenant directory.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{
    Availability, SubdomainCandidate, SubdomainError, format_subdomain, is_reserved, normalize,
};
use crate::services::TenantService;

/// Result of the local (non-remote) part of validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub candidate: SubdomainCandidate,
    /// Whether a remote availability lookup should follow.
    pub needs_check: bool,
}

pub struct SubdomainValidator {
    tenants: Arc<dyn TenantService>,
    reserved_words: Vec<String>,
    domain_suffix: String,
}

impl SubdomainValidator {
    pub fn new(
        tenants: Arc<dyn TenantService>,
        reserved_words: Vec<String>,
        domain_suffix: &str,
    ) -> Self {
        Self {
            tenants,
            reserved_words,
            domain_suffix: domain_suffix.to_string(),
        }
    }

    /// Derive everything that does not need the network.
    ///
    /// A reserved result keeps `previous.availability`; callers must not read
    /// availability on its own as "usable".
    pub fn evaluate(&self, input: &str, previous: &SubdomainCandidate) -> Evaluation {
        if input.trim().is_empty() {
            return Evaluation {
                candidate: SubdomainCandidate::default(),
                needs_check: false,
            };
        }

        let normalized = normalize(input);
        if normalized.is_empty() {
            return Evaluation {
                candidate: SubdomainCandidate {
                    raw_input: input.to_string(),
                    error: Some(SubdomainError::InvalidFormat),
                    ..previous.clone()
                }
                .with_normalized(String::new(), &self.domain_suffix),
                needs_check: false,
            };
        }

        let reserved = is_reserved(&normalized, &self.reserved_words);
        let candidate = SubdomainCandidate {
            raw_input: input.to_string(),
            is_reserved: reserved,
            availability: if reserved {
                previous.availability
            } else {
                Availability::Checking
            },
            error: reserved.then_some(SubdomainError::Reserved),
            ..SubdomainCandidate::default()
        }
        .with_normalized(normalized, &self.domain_suffix);

        Evaluation {
            candidate,
            needs_check: !reserved,
        }
    }

    /// Query the tenant directory and fold the answer into `candidate`.
    ///
    /// Transport failures resolve to `Unavailable` so the caller is never left
    /// in `Checking`.
    pub async fn check_availability(&self, mut candidate: SubdomainCandidate) -> SubdomainCandidate {
        match self
            .tenants
            .check_subdomain_availability(&candidate.normalized)
            .await
        {
            Ok(response) if response.available => {
                candidate.availability = Availability::Available;
                candidate.error = None;
            }
            Ok(_) => {
                candidate.availability = Availability::Unavailable;
                candidate.error = Some(SubdomainError::Taken);
            }
            Err(e) => {
                warn!(subdomain = %candidate.normalized, error = %e, "Subdomain availability check failed");
                candidate.availability = Availability::Unavailable;
                candidate.error = Some(SubdomainError::CheckFailed);
            }
        }
        debug!(
            subdomain = %candidate.normalized,
            availability = %candidate.availability,
            "Subdomain checked"
        );
        candidate
    }

    /// Full validation of one input, without debounce.
    pub async fn validate(&self, input: &str, previous: &SubdomainCandidate) -> SubdomainCandidate {
        let evaluation = self.evaluate(input, previous);
        if evaluation.needs_check {
            self.check_availability(evaluation.candidate).await
        } else {
            evaluation.candidate
        }
    }
}

impl SubdomainCandidate {
    fn with_normalized(mut self, normalized: String, suffix: &str) -> Self {
        self.full_domain = if normalized.is_empty() {
            String::new()
        } else {
            format_subdomain(&normalized, suffix)
        };
        self.normalized = normalized;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::ServiceError;
    use crate::services::{AvailabilityResponse, CreateTenantPayload, CreatedTenant};

    /// Counts lookups; `taken` is unavailable, `down` fails in transport.
    #[derive(Default)]
    struct StubTenants {
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl TenantService for StubTenants {
        async fn check_subdomain_availability(
            &self,
            subdomain: &str,
        ) -> Result<AvailabilityResponse, ServiceError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if subdomain.contains("down") {
                return Err(ServiceError::transport("tenant", "unreachable"));
            }
            Ok(AvailabilityResponse {
                available: !subdomain.contains("taken"),
            })
        }

        async fn create_tenant(
            &self,
            _payload: &CreateTenantPayload,
        ) -> Result<CreatedTenant, ServiceError> {
            unimplemented!("not used in validator tests")
        }
    }

    fn validator() -> (SubdomainValidator, Arc<StubTenants>) {
        let stub = Arc::new(StubTenants::default());
        let v = SubdomainValidator::new(stub.clone(), vec!["admin".into()], "onkeypriv.com");
        (v, stub)
    }

    #[tokio::test]
    async fn empty_input_is_idle_without_error() {
        let (v, stub) = validator();
        let c = v.validate("   ", &SubdomainCandidate::default()).await;
        assert_eq!(c, SubdomainCandidate::default());
        assert_eq!(stub.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn symbols_only_is_format_error_without_lookup() {
        let (v, stub) = validator();
        let c = v.validate("!!!", &SubdomainCandidate::default()).await;
        assert_eq!(c.error, Some(SubdomainError::InvalidFormat));
        assert!(c.normalized.is_empty());
        assert!(c.full_domain.is_empty());
        assert_eq!(stub.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn available_name() {
        let (v, _) = validator();
        let c = v.validate("  Acme   Corp!! ", &SubdomainCandidate::default()).await;
        assert_eq!(c.normalized, "acme-corp");
        assert_eq!(c.full_domain, "acme-corp.onkeypriv.com");
        assert_eq!(c.availability, Availability::Available);
        assert!(c.is_valid());
    }

    #[tokio::test]
    async fn taken_name_is_unavailable() {
        let (v, _) = validator();
        let c = v.validate("Taken Co", &SubdomainCandidate::default()).await;
        assert_eq!(c.normalized, "taken-co");
        assert_eq!(c.availability, Availability::Unavailable);
        assert_eq!(c.error, Some(SubdomainError::Taken));
        assert!(!c.is_valid());
    }

    #[tokio::test]
    async fn reserved_skips_lookup_and_keeps_previous_availability() {
        let (v, stub) = validator();
        let previous = v.validate("Acme", &SubdomainCandidate::default()).await;
        assert_eq!(stub.lookups.load(Ordering::SeqCst), 1);

        let c = v.validate("Admin Team", &previous).await;
        assert!(c.is_reserved);
        assert_eq!(c.error, Some(SubdomainError::Reserved));
        assert_eq!(c.availability, Availability::Available);
        assert!(!c.is_valid());
        assert_eq!(stub.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_failure_resolves_unavailable() {
        let (v, _) = validator();
        let c = v.validate("Down Inc", &SubdomainCandidate::default()).await;
        assert_eq!(c.availability, Availability::Unavailable);
        assert_eq!(c.error, Some(SubdomainError::CheckFailed));
    }
}
