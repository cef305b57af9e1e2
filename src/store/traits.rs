//! `KeyValueStore` trait — the scoped persistence seam for onboarding state.

use async_trait::async_trait;

use crate::error::DatabaseError;

/// Backend-agnostic scoped key-value store.
///
/// Values are plain strings; callers own their encoding.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<String>, DatabaseError>;

    /// Insert or overwrite a value.
    async fn set(&self, key: &str, value: &str) -> Result<(), DatabaseError>;

    /// Remove a value. Returns whether anything was deleted.
    async fn delete(&self, key: &str) -> Result<bool, DatabaseError>;
}

/// Well-known keys.
pub mod keys {
    /// Draft organization profile for the admin `email`, stored as JSON.
    pub fn org_profile_draft(email: &str) -> String {
        format!("org_profile_draft_{email}")
    }

    /// Failed OTP attempts for `email`, stored as an integer string.
    pub fn otp_attempts(email: &str) -> String {
        format!("otp_attempts_{email}")
    }

    /// Lockout deadline for `email`, stored as epoch milliseconds.
    pub fn otp_lockout(email: &str) -> String {
        format!("otp_lockout_{email}")
    }
}
