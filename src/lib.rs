//! Tenant Onboard — tenant-onboarding wizard core.
//!
//! OTP verification with lockout, debounced subdomain validation and tenant
//! creation with a fixed retry table, behind an axum REST surface.

pub mod clock;
pub mod config;
pub mod error;
pub mod i18n;
pub mod onboarding;
pub mod otp;
pub mod provisioning;
pub mod services;
pub mod store;
pub mod subdomain;
