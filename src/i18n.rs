//! Supported locales. Message catalogs live with the UI; the backend only
//! tracks the session locale and hands out stable message keys.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    #[serde(rename = "en-US")]
    EnUs,
    #[serde(rename = "bn-BD")]
    BnBd,
    #[serde(rename = "ar-SA")]
    ArSa,
}

impl Locale {
    pub const ALL: [Locale; 3] = [Locale::EnUs, Locale::BnBd, Locale::ArSa];

    pub fn tag(&self) -> &'static str {
        match self {
            Self::EnUs => "en-US",
            Self::BnBd => "bn-BD",
            Self::ArSa => "ar-SA",
        }
    }

    /// Right-to-left script.
    pub fn is_rtl(&self) -> bool {
        matches!(self, Self::ArSa)
    }
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl std::str::FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|l| l.tag() == s)
            .ok_or_else(|| format!("Unsupported locale: {s}"))
    }
}

/// Map a missing or unsupported locale tag to the default.
pub fn safe_locale(tag: Option<&str>) -> Locale {
    tag.and_then(|t| t.trim().parse().ok()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_locales_fall_back() {
        assert_eq!(safe_locale(None), Locale::EnUs);
        assert_eq!(safe_locale(Some("fr-FR")), Locale::EnUs);
        assert_eq!(safe_locale(Some("bn-BD")), Locale::BnBd);
        assert_eq!(safe_locale(Some(" ar-SA ")), Locale::ArSa);
    }

    #[test]
    fn display_matches_serde() {
        for locale in Locale::ALL {
            let json = serde_json::to_string(&locale).unwrap();
            assert_eq!(json, format!("\"{locale}\""));
        }
        assert!(Locale::ArSa.is_rtl());
        assert!(!Locale::EnUs.is_rtl());
    }
}
