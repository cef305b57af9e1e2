//! Wizard state machine: tracks which step a session is on.

use serde::{Deserialize, Serialize};

/// The steps of the onboarding wizard.
///
/// Progresses linearly: EmailEntry → OtpVerification → OrganizationSetup →
/// AdminAccount → OrganizationProfile → Complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    #[default]
    EmailEntry,
    OtpVerification,
    OrganizationSetup,
    AdminAccount,
    OrganizationProfile,
    Complete,
}

impl WizardStep {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: WizardStep) -> bool {
        use WizardStep::*;
        matches!(
            (self, target),
            (EmailEntry, OtpVerification)
                | (OtpVerification, OrganizationSetup)
                | (OrganizationSetup, AdminAccount)
                | (AdminAccount, OrganizationProfile)
                | (OrganizationProfile, Complete)
        )
    }

    /// Whether the wizard is done.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Next step in the linear progression, if any.
    pub fn next(&self) -> Option<WizardStep> {
        use WizardStep::*;
        match self {
            EmailEntry => Some(OtpVerification),
            OtpVerification => Some(OrganizationSetup),
            OrganizationSetup => Some(AdminAccount),
            AdminAccount => Some(OrganizationProfile),
            OrganizationProfile => Some(Complete),
            Complete => None,
        }
    }

    /// 1-based position, as shown in the progress indicator.
    pub fn index(&self) -> usize {
        use WizardStep::*;
        match self {
            EmailEntry => 1,
            OtpVerification => 2,
            OrganizationSetup => 3,
            AdminAccount => 4,
            OrganizationProfile => 5,
            Complete => 6,
        }
    }

    pub const COUNT: usize = 6;
}

impl std::fmt::Display for WizardStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::EmailEntry => "email_entry",
            Self::OtpVerification => "otp_verification",
            Self::OrganizationSetup => "organization_setup",
            Self::AdminAccount => "admin_account",
            Self::OrganizationProfile => "organization_profile",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}
