//! Tenant creation with a fixed backoff table and a terminal circuit breaker.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::services::{CreateTenantPayload, CreatedTenant, TenantService};

/// Wait before retry `i` (1-indexed) is `BACKOFF_DELAYS_MS[i - 1]`.
pub const BACKOFF_DELAYS_MS: [u64; 3] = [100, 300, 900];

pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub const EXHAUSTED_MESSAGE: &str = "Failed to create tenant after maximum retries";
pub const UNEXPECTED_MESSAGE: &str = "Unexpected error during tenant creation";

/// The `circuit_breaker: true` marker. Only `true` deserializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CircuitBreaker;

impl Serialize for CircuitBreaker {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(true)
    }
}

impl<'de> Deserialize<'de> for CircuitBreaker {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if bool::deserialize(deserializer)? {
            Ok(Self)
        } else {
            Err(serde::de::Error::custom("circuit_breaker marker must be true"))
        }
    }
}

/// Result of [`TenantProvisioner::create_with_retry`].
///
/// Serializes either as the created tenant or as
/// `{ "circuit_breaker": true, "message": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CreateTenantOutcome {
    CircuitBreakerTripped {
        circuit_breaker: CircuitBreaker,
        message: String,
    },
    Success(CreatedTenant),
}

impl CreateTenantOutcome {
    fn tripped(message: &str) -> Self {
        Self::CircuitBreakerTripped {
            circuit_breaker: CircuitBreaker,
            message: message.to_string(),
        }
    }

    pub fn is_circuit_breaker(&self) -> bool {
        matches!(self, Self::CircuitBreakerTripped { .. })
    }

    pub fn tenant(&self) -> Option<&CreatedTenant> {
        match self {
            Self::Success(tenant) => Some(tenant),
            Self::CircuitBreakerTripped { .. } => None,
        }
    }
}

pub struct TenantProvisioner {
    tenants: Arc<dyn TenantService>,
}

impl TenantProvisioner {
    pub fn new(tenants: Arc<dyn TenantService>) -> Self {
        Self { tenants }
    }

    /// Create a tenant, making up to `max_retries` attempts in total.
    ///
    /// The table only has delays for four attempts; larger values are capped.
    /// Never fails: every error ends in `CircuitBreakerTripped`.
    pub async fn create_with_retry(
        &self,
        payload: &CreateTenantPayload,
        max_retries: u32,
    ) -> CreateTenantOutcome {
        if max_retries == 0 {
            warn!("Tenant creation requested with zero attempts");
            return CreateTenantOutcome::tripped(UNEXPECTED_MESSAGE);
        }

        let limit = BACKOFF_DELAYS_MS.len() as u32 + 1;
        let attempts = if max_retries > limit {
            warn!(
                requested = max_retries,
                limit, "Tenant creation retries capped at backoff table size"
            );
            limit
        } else {
            max_retries
        };

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = BACKOFF_DELAYS_MS[attempt as usize - 1];
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self.tenants.create_tenant(payload).await {
                Ok(tenant) => {
                    info!(
                        tenant_id = %tenant.tenant_id,
                        subdomain = %payload.requested_subdomain,
                        attempt,
                        "Tenant created"
                    );
                    return CreateTenantOutcome::Success(tenant);
                }
                Err(e) => {
                    warn!(
                        subdomain = %payload.requested_subdomain,
                        attempt,
                        error = %e,
                        "Tenant creation attempt failed"
                    );
                }
            }
        }

        warn!(
            subdomain = %payload.requested_subdomain,
            attempts, "Tenant creation circuit breaker tripped"
        );
        CreateTenantOutcome::tripped(EXHAUSTED_MESSAGE)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::error::ServiceError;
    use crate::services::AvailabilityResponse;

    /// Fails the first `failures` calls, recording when each call arrived.
    struct FlakyTenants {
        failures: usize,
        calls: Mutex<Vec<Instant>>,
    }

    impl FlakyTenants {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn gaps_ms(&self) -> Vec<u128> {
            let calls = self.calls.lock().unwrap();
            calls.windows(2).map(|w| (w[1] - w[0]).as_millis()).collect()
        }

        fn count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TenantService for FlakyTenants {
        async fn check_subdomain_availability(
            &self,
            _subdomain: &str,
        ) -> Result<AvailabilityResponse, ServiceError> {
            Ok(AvailabilityResponse { available: true })
        }

        async fn create_tenant(
            &self,
            payload: &CreateTenantPayload,
        ) -> Result<CreatedTenant, ServiceError> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(Instant::now());
                calls.len()
            };
            if n <= self.failures {
                return Err(ServiceError::ServerError {
                    service: "tenant".into(),
                });
            }
            Ok(CreatedTenant {
                tenant_id: "tenant_1".into(),
                realm_url: format!("https://{}.onkeypriv.com", payload.requested_subdomain),
                admin_user_id: "user_1".into(),
            })
        }
    }

    fn payload() -> CreateTenantPayload {
        CreateTenantPayload {
            organization_name: "Acme Corp".into(),
            country: "US".into(),
            requested_subdomain: "acme-corp".into(),
            admin_email: "founder@acme.com".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_with_table_delays() {
        let stub = FlakyTenants::new(2);
        let provisioner = TenantProvisioner::new(stub.clone());

        let outcome = provisioner.create_with_retry(&payload(), 3).await;

        assert_eq!(outcome.tenant().unwrap().tenant_id, "tenant_1");
        assert_eq!(stub.count(), 3);
        assert_eq!(stub.gaps_ms(), vec![100, 300]);
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_short_circuits() {
        let stub = FlakyTenants::new(0);
        let provisioner = TenantProvisioner::new(stub.clone());
        let start = Instant::now();

        let outcome = provisioner.create_with_retry(&payload(), 3).await;

        assert!(!outcome.is_circuit_breaker());
        assert_eq!(stub.count(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_trips_after_three_calls() {
        let stub = FlakyTenants::new(usize::MAX);
        let provisioner = TenantProvisioner::new(stub.clone());

        let outcome = provisioner.create_with_retry(&payload(), 3).await;

        assert_eq!(
            outcome,
            CreateTenantOutcome::CircuitBreakerTripped {
                circuit_breaker: CircuitBreaker,
                message: EXHAUSTED_MESSAGE.into(),
            }
        );
        assert_eq!(stub.count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn large_retry_counts_are_capped() {
        let stub = FlakyTenants::new(usize::MAX);
        let provisioner = TenantProvisioner::new(stub.clone());

        let outcome = provisioner.create_with_retry(&payload(), 10).await;

        assert!(outcome.is_circuit_breaker());
        assert_eq!(stub.count(), 4);
        assert_eq!(stub.gaps_ms(), vec![100, 300, 900]);
    }

    #[tokio::test]
    async fn zero_retries_trips_without_calling() {
        let stub = FlakyTenants::new(0);
        let provisioner = TenantProvisioner::new(stub.clone());

        let outcome = provisioner.create_with_retry(&payload(), 0).await;

        assert_eq!(
            outcome,
            CreateTenantOutcome::CircuitBreakerTripped {
                circuit_breaker: CircuitBreaker,
                message: UNEXPECTED_MESSAGE.into(),
            }
        );
        assert_eq!(stub.count(), 0);
    }

    #[test]
    fn outcome_shapes_are_distinguished_by_marker() {
        let tripped = serde_json::to_value(CreateTenantOutcome::tripped(EXHAUSTED_MESSAGE)).unwrap();
        assert_eq!(tripped["circuit_breaker"], true);

        let ok = serde_json::to_value(CreateTenantOutcome::Success(CreatedTenant {
            tenant_id: "t".into(),
            realm_url: "https://acme.onkeypriv.com".into(),
            admin_user_id: "u".into(),
        }))
        .unwrap();
        assert!(ok.get("circuit_breaker").is_none());
        assert_eq!(ok["tenant_id"], "t");

        let parsed: CreateTenantOutcome = serde_json::from_value(tripped).unwrap();
        assert!(parsed.is_circuit_breaker());
    }

    #[test]
    fn false_marker_is_not_a_tripped_outcome() {
        let raw = serde_json::json!({ "circuit_breaker": false, "message": EXHAUSTED_MESSAGE });
        assert!(serde_json::from_value::<CreateTenantOutcome>(raw).is_err());
    }
}
