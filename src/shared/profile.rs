//! User profile as returned by `GET /api/profile/`.
//!
//! The backend is authoritative for every field; the client only ever
//! replaces a profile wholesale with a server response.

use serde::{Deserialize, Serialize};

/// Onboarding preferences captured on the personalization screen
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalizationProfile {
    #[serde(default)]
    pub onboarding_completed: bool,
    /// Destination entries as the backend renders them (ids or nested objects)
    #[serde(default)]
    pub preferred_destinations: Vec<serde_json::Value>,
}

/// Account profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub is_local_guide: bool,
    #[serde(default)]
    pub guide_approved: bool,
    #[serde(default)]
    pub guide_tier: Option<String>,
    #[serde(default)]
    pub has_accepted_terms: bool,
    #[serde(default)]
    pub personalization_profile: Option<PersonalizationProfile>,
}

impl Profile {
    /// First and last name both present and non-blank after trimming.
    pub fn is_complete(&self) -> bool {
        fn filled(value: &Option<String>) -> bool {
            value.as_deref().is_some_and(|v| !v.trim().is_empty())
        }
        filled(&self.first_name) && filled(&self.last_name)
    }

    pub fn onboarding_completed(&self) -> bool {
        self.personalization_profile
            .as_ref()
            .is_some_and(|p| p.onboarding_completed)
    }

    pub fn display_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("").trim();
        let last = self.last_name.as_deref().unwrap_or("").trim();
        match (first.is_empty(), last.is_empty()) {
            (false, false) => format!("{} {}", first, last),
            (false, true) => first.to_string(),
            (true, false) => last.to_string(),
            (true, true) => self.username.clone().unwrap_or_default(),
        }
    }
}

/// Body of `PATCH /api/profile/`; unset fields are left alone by the server
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl ProfileUpdate {
    pub fn location(location: impl Into<String>) -> Self {
        Self {
            location: Some(location.into()),
            ..Self::default()
        }
    }

    pub fn name(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: Some(first_name.into()),
            last_name: Some(last_name.into()),
            ..Self::default()
        }
    }
}
