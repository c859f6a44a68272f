//! Onboarding gate.
//!
//! Decides, from a snapshot of session state and the current route, where
//! the navigation layer must send the user. The decision is a pure function
//! of its input and is re-evaluated on every relevant change; it keeps no
//! state between calls.
//!
//! Rules, first match wins:
//!
//! 1. signed out on a non-public route -> landing
//! 2. name incomplete -> profile setup
//! 3. terms not accepted -> terms
//! 4. personalization neither completed nor skipped -> personalization
//! 5. lingering on another onboarding route -> home
//!
//! Rules 2-4 do not redirect when the user is already on the target route.
//! Rule 5 exempts the personalization route so its own skip/confirm
//! controls drive the exit.

use crate::shared::profile::Profile;

/// Route table used by the gate and by logout redirects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routes {
    pub landing: &'static str,
    pub login: &'static str,
    pub register: &'static str,
    pub verify_email: &'static str,
    pub forgot_password: &'static str,
    pub home: &'static str,
    pub onboarding_prefix: &'static str,
    pub profile_setup: &'static str,
    pub terms: &'static str,
    pub personalization: &'static str,
}

impl Default for Routes {
    fn default() -> Self {
        Self {
            landing: "/",
            login: "/auth/login",
            register: "/auth/register",
            verify_email: "/auth/verify-email",
            forgot_password: "/auth/forgot-password",
            home: "/home",
            onboarding_prefix: "/onboarding",
            profile_setup: "/onboarding/profile_setup",
            terms: "/onboarding/terms_and_conditions",
            personalization: "/onboarding/personalization",
        }
    }
}

impl Routes {
    /// Routes reachable without a session.
    pub fn is_public(&self, path: &str) -> bool {
        [
            self.landing,
            self.login,
            self.register,
            self.verify_email,
            self.forgot_password,
        ]
        .contains(&path)
    }

    pub fn is_onboarding(&self, path: &str) -> bool {
        path == self.onboarding_prefix
            || path
                .strip_prefix(self.onboarding_prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Strip query and fragment, drop trailing slashes, default to `/`.
pub fn normalize_path(raw: &str) -> String {
    let end = raw.find(['?', '#']).unwrap_or(raw.len());
    let trimmed = raw[..end].trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Everything the gate looks at
#[derive(Debug, Clone, Copy)]
pub struct GateInput<'a> {
    pub is_loading: bool,
    pub is_authenticated: bool,
    pub user: Option<&'a Profile>,
    pub has_skipped_onboarding: bool,
    /// Must already be normalized, see [`normalize_path`]
    pub current_path: &'a str,
}

/// Onboarding step still owed by an authenticated user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingStep {
    ProfileSetup,
    Terms,
    Personalization,
}

impl OnboardingStep {
    /// Identity completeness gates everything after it.
    pub fn required_for(user: &Profile, has_skipped: bool) -> Option<Self> {
        if !user.is_complete() {
            Some(Self::ProfileSetup)
        } else if !user.has_accepted_terms {
            Some(Self::Terms)
        } else if !user.onboarding_completed() && !has_skipped {
            Some(Self::Personalization)
        } else {
            None
        }
    }

    pub fn path(self, routes: &Routes) -> &'static str {
        match self {
            Self::ProfileSetup => routes.profile_setup,
            Self::Terms => routes.terms,
            Self::Personalization => routes.personalization,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OnboardingGate {
    routes: Routes,
}

impl OnboardingGate {
    pub fn new(routes: Routes) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    /// Route to redirect to, or `None` to stay.
    pub fn evaluate(&self, input: &GateInput<'_>) -> Option<&'static str> {
        if input.is_loading {
            return None;
        }
        let routes = &self.routes;
        let path = input.current_path;

        if !input.is_authenticated {
            return (!routes.is_public(path)).then_some(routes.landing);
        }

        let user = input.user?;

        if let Some(step) = OnboardingStep::required_for(user, input.has_skipped_onboarding) {
            let target = step.path(routes);
            return (path != target).then_some(target);
        }

        // Exact match only: an edit-mode user on another onboarding route
        // is still sent home.
        if routes.is_onboarding(path) && path != routes.personalization {
            return Some(routes.home);
        }

        None
    }
}

/// Gate decision with the default route table.
pub fn required_redirect(input: &GateInput<'_>) -> Option<&'static str> {
    OnboardingGate::default().evaluate(input)
}

/// Navigation port implemented by the host router
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Evaluate the gate and perform the redirect, if any.
pub fn apply_gate(
    gate: &OnboardingGate,
    navigator: &dyn Navigator,
    input: &GateInput<'_>,
) -> Option<&'static str> {
    let redirect = gate.evaluate(input)?;
    tracing::debug!(from = input.current_path, to = redirect, "onboarding gate redirect");
    navigator.navigate(redirect);
    Some(redirect)
}
