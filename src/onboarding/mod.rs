//! Onboarding wizard: email entry, OTP verification, organization setup,
//! admin account, organization profile.
//!
//! The manager owns one session per wizard run and only lets it move forward
//! one step at a time. Each step delegates to the core components: the OTP
//! gate, the subdomain validator and the tenant provisioner.

pub mod autosave;
pub mod manager;
pub mod model;
pub mod routes;
pub mod state;

pub use autosave::{AutosaveStatus, ProfileAutosaver, load_draft};
pub use manager::{
    Collaborators, OnboardingManager, OrganizationRequest, WizardStatus, spawn_session_sweeper,
};
pub use model::{AdminAccountForm, OnboardingSession, OrgProfile, PasswordStrength};
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use state::WizardStep;
