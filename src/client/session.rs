//! # Session Manager
//!
//! Single source of truth for authentication state. One instance is built
//! at application start and handed to every screen; screens observe it
//! through [`SessionManager::subscribe`] and change it only through its
//! methods.
//!
//! ## Failure semantics
//!
//! No public operation returns an error. Failures land in
//! `Session::message` with `MessageType::Error`, and the return value says
//! whether the operation took effect. `login` and `handle_auth_response`
//! clear auth state on failure; `refresh_user` and `update_profile` leave
//! it untouched.
//!
//! ## Token writes
//!
//! Every path that stores or clears tokens updates the API client's
//! default header right after the storage write, with no await in between.
//! Writes and clears are serialized by one lock holding a sign-in epoch.
//! Sign-in and sign-out bump it, and a request that started under an
//! older epoch never writes tokens or state when it returns.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{watch, Mutex};

use crate::client::api::{ApiClient, ApiError};
use crate::client::auth::{
    self, LOGIN_SUCCESS_MESSAGE, PREFERENCES_FAILED_MESSAGE, PROFILE_UPDATED_MESSAGE,
    PROFILE_UPDATE_FAILED_MESSAGE, REGISTER_SUCCESS_MESSAGE, RESEND_FAILED_MESSAGE,
    RESEND_SUCCESS_MESSAGE, TERMS_FAILED_MESSAGE, VERIFY_EMAIL_MESSAGE,
};
use crate::client::onboarding::{normalize_path, GateInput, Navigator, OnboardingGate, Routes};
use crate::client::storage::{CredentialStore, StorageError, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::client::types::{
    LoginRequest, MessageType, RefreshRequest, RefreshResponse, RegisterForm, ResendVerifyRequest,
    TokenPair, UpdatePreferencesRequest,
};
use crate::shared::profile::{Profile, ProfileUpdate};

const PROFILE_PATH: &str = "/api/profile/";

const SESSION_SAVE_FAILED_MESSAGE: &str = "Could not save your session on this device.";

/// Client-side record of who is signed in
#[derive(Clone, Default, PartialEq)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub is_authenticated: bool,
    pub user: Option<Profile>,
    pub is_loading: bool,
    pub message: Option<String>,
    pub message_type: Option<MessageType>,
    /// Personalization skipped during this login; never persisted
    pub has_skipped_onboarding: bool,
}

impl Session {
    fn signed_out() -> Self {
        Self::default()
    }

    fn set_message(&mut self, message: impl Into<String>, kind: MessageType) {
        self.message = Some(message.into());
        self.message_type = Some(kind);
    }

    /// Gate input for this state; `current_path` must already be normalized.
    pub fn gate_input<'a>(&'a self, current_path: &'a str) -> GateInput<'a> {
        GateInput {
            is_loading: self.is_loading,
            is_authenticated: self.is_authenticated,
            user: self.user.as_ref(),
            has_skipped_onboarding: self.has_skipped_onboarding,
            current_path,
        }
    }

    fn clear_auth(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.is_authenticated = false;
        self.user = None;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("is_authenticated", &self.is_authenticated)
            .field("user", &self.user.as_ref().map(|u| u.id))
            .field("is_loading", &self.is_loading)
            .field("message", &self.message)
            .field("message_type", &self.message_type)
            .field("has_skipped_onboarding", &self.has_skipped_onboarding)
            .finish()
    }
}

/// Third-party sign-in whose session must be revoked on logout
#[async_trait]
pub trait SsoSession: Send + Sync {
    async fn revoke(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

struct SessionInner {
    api: ApiClient,
    store: Arc<dyn CredentialStore>,
    sso: Option<Arc<dyn SsoSession>>,
    navigator: Option<Arc<dyn Navigator>>,
    routes: Routes,
    state: watch::Sender<Session>,
    token_epoch: Mutex<u64>,
}

/// Builder for [`SessionManager`]
pub struct SessionManagerBuilder {
    api: ApiClient,
    store: Arc<dyn CredentialStore>,
    sso: Option<Arc<dyn SsoSession>>,
    navigator: Option<Arc<dyn Navigator>>,
    routes: Routes,
}

impl SessionManagerBuilder {
    pub fn sso(mut self, sso: Arc<dyn SsoSession>) -> Self {
        self.sso = Some(sso);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn routes(mut self, routes: Routes) -> Self {
        self.routes = routes;
        self
    }

    pub fn build(self) -> SessionManager {
        // Loading until stored credentials have been checked.
        let (state, _) = watch::channel(Session {
            is_loading: true,
            ..Session::default()
        });
        SessionManager {
            inner: Arc::new(SessionInner {
                api: self.api,
                store: self.store,
                sso: self.sso,
                navigator: self.navigator,
                routes: self.routes,
                state,
                token_epoch: Mutex::new(0),
            }),
        }
    }
}

/// Authentication state owner
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

impl SessionManager {
    pub fn builder(api: ApiClient, store: Arc<dyn CredentialStore>) -> SessionManagerBuilder {
        SessionManagerBuilder {
            api,
            store,
            sso: None,
            navigator: None,
            routes: Routes::default(),
        }
    }

    pub fn new(api: ApiClient, store: Arc<dyn CredentialStore>) -> Self {
        Self::builder(api, store).build()
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    pub fn routes(&self) -> &Routes {
        &self.inner.routes
    }

    /// Current state.
    pub fn snapshot(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified after every state transition.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    fn update(&self, f: impl FnOnce(&mut Session)) {
        self.inner.state.send_modify(f);
    }

    fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| {
            s.is_loading = false;
            s.set_message(message, MessageType::Error);
        });
    }

    /// Startup: restore the session from the credential store.
    pub async fn load_stored_credentials(&self) {
        let access = match self.inner.store.get(ACCESS_TOKEN_KEY).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("Failed to read stored credentials: {}", e);
                None
            }
        };
        let refresh = self.inner.store.get(REFRESH_TOKEN_KEY).await.unwrap_or_else(|e| {
            tracing::warn!("Failed to read stored refresh token: {}", e);
            None
        });

        let Some(access) = access else {
            tracing::debug!("No stored credentials");
            self.update(|s| {
                s.clear_auth();
                s.is_loading = false;
            });
            return;
        };

        self.inner.api.set_auth_token(Some(access.clone()));
        let epoch = self.epoch().await;

        match self.fetch_profile().await {
            Ok(Some(profile)) => {
                let current = self.inner.token_epoch.lock().await;
                if *current != epoch {
                    tracing::debug!("Signed out while restoring the session");
                    return;
                }
                tracing::info!(user_id = profile.id, "Restored stored session");
                self.update(|s| {
                    s.access_token = Some(access);
                    s.refresh_token = refresh;
                    s.is_authenticated = true;
                    s.user = Some(profile);
                    s.is_loading = false;
                });
            }
            Ok(None) => {
                tracing::info!("Stored session has no profile; signing out");
                self.logout(false).await;
            }
            Err(e) if e.is_unauthorized() || e.is_not_found() => {
                tracing::info!("Stored session rejected ({}); signing out", e);
                self.logout(false).await;
            }
            Err(e) => {
                // Tokens are kept so the next launch can try again.
                tracing::warn!("Could not restore session: {}", e);
                let message = auth::error_message(&e, auth::NETWORK_ERROR_MESSAGE);
                self.update(|s| {
                    s.access_token = Some(access);
                    s.refresh_token = refresh;
                    s.is_authenticated = false;
                    s.user = None;
                    s.is_loading = false;
                    s.set_message(message, MessageType::Error);
                });
            }
        }
    }

    /// `Ok(None)` means the backend answered without a profile, which it
    /// does for accounts that are not verified yet.
    async fn fetch_profile(&self) -> Result<Option<Profile>, ApiError> {
        match self.inner.api.get_json::<Option<Profile>>(PROFILE_PATH).await {
            Err(e) if e.status() == Some(reqwest::StatusCode::FORBIDDEN) => Ok(None),
            other => other,
        }
    }

    /// Sign in. Returns the profile so the caller can decide where to go
    /// next; `None` on any failure.
    pub async fn login(&self, username: &str, password: &str) -> Option<Profile> {
        self.update(|s| {
            s.is_loading = true;
            s.message = None;
            s.message_type = None;
        });

        let request = LoginRequest {
            username: username.trim().to_string(),
            password: password.to_string(),
        };

        match self.inner.api.post_json::<_, TokenPair>("/api/token/", &request).await {
            Ok(pair) => self.handle_auth_response(pair).await,
            Err(e) => {
                tracing::info!("Login failed: {}", e);
                let message = auth::login_error_message(&e);
                self.clear_credentials().await;
                self.update(|s| {
                    s.clear_auth();
                    s.is_loading = false;
                    s.set_message(message, MessageType::Error);
                });
                None
            }
        }
    }

    /// Persist a fresh token pair and load the profile behind it. Rolls
    /// everything back if the profile cannot be loaded.
    pub async fn handle_auth_response(&self, pair: TokenPair) -> Option<Profile> {
        let epoch = {
            let mut epoch = self.inner.token_epoch.lock().await;
            *epoch += 1;
            if let Err(e) = self.write_tokens(&pair.access, Some(&pair.refresh)).await {
                tracing::error!("Failed to persist tokens: {}", e);
                self.remove_tokens().await;
                drop(epoch);
                self.update(|s| {
                    s.clear_auth();
                    s.is_loading = false;
                    s.set_message(SESSION_SAVE_FAILED_MESSAGE, MessageType::Error);
                });
                return None;
            }
            *epoch
        };

        let outcome = self.fetch_profile().await;

        let current = self.inner.token_epoch.lock().await;
        if *current != epoch {
            // A logout or another sign-in owns the credentials now.
            tracing::info!("Sign-in superseded while loading the profile");
            return None;
        }

        match outcome {
            Ok(Some(profile)) => {
                tracing::info!(user_id = profile.id, "Login successful");
                let returned = profile.clone();
                self.update(|s| {
                    s.access_token = Some(pair.access);
                    s.refresh_token = Some(pair.refresh);
                    s.is_authenticated = true;
                    s.user = Some(profile);
                    s.is_loading = false;
                    s.set_message(LOGIN_SUCCESS_MESSAGE, MessageType::Success);
                });
                Some(returned)
            }
            outcome => {
                let message = match outcome {
                    Err(e) if e.is_network() => auth::NETWORK_ERROR_MESSAGE.to_string(),
                    Err(e) => {
                        tracing::info!("Profile fetch after login failed: {}", e);
                        VERIFY_EMAIL_MESSAGE.to_string()
                    }
                    _ => VERIFY_EMAIL_MESSAGE.to_string(),
                };
                self.remove_tokens().await;
                self.update(|s| {
                    s.clear_auth();
                    s.is_loading = false;
                    s.set_message(message, MessageType::Error);
                });
                None
            }
        }
    }

    /// Create an account. No session is opened: the account must be
    /// verified by email first.
    pub async fn register(&self, form: &RegisterForm) -> bool {
        if let Err(e) = form.validate() {
            self.fail(e.user_message());
            return false;
        }

        self.update(|s| {
            s.is_loading = true;
            s.message = None;
            s.message_type = None;
        });

        match self.inner.api.post_json::<_, Value>("/api/register/", form).await {
            Ok(_) => {
                tracing::info!("Registration submitted");
                self.update(|s| {
                    s.is_loading = false;
                    s.set_message(REGISTER_SUCCESS_MESSAGE, MessageType::Success);
                });
                true
            }
            Err(e) => {
                tracing::info!("Registration failed: {}", e);
                self.fail(auth::register_error_message(&e));
                false
            }
        }
    }

    /// Ask the backend to send the verification email again.
    pub async fn resend_verification_email(&self, email: &str) -> bool {
        let request = ResendVerifyRequest {
            email: email.trim().to_string(),
        };
        match self
            .inner
            .api
            .post_json::<_, Value>("/api/resend-verify-email/", &request)
            .await
        {
            Ok(body) => {
                let message = body
                    .get("detail")
                    .and_then(Value::as_str)
                    .unwrap_or(RESEND_SUCCESS_MESSAGE)
                    .to_string();
                self.update(|s| s.set_message(message, MessageType::Success));
                true
            }
            Err(e) => {
                tracing::info!("Resend verification failed: {}", e);
                let message = auth::error_message(&e, RESEND_FAILED_MESSAGE);
                self.update(|s| s.set_message(message, MessageType::Error));
                false
            }
        }
    }

    /// Re-fetch the profile and replace it wholesale. Tokens are not
    /// touched, except for one refresh attempt on a 401. Silent on failure.
    pub async fn refresh_user(&self) -> bool {
        let mut fetched = self.fetch_profile().await;
        if matches!(&fetched, Err(e) if e.is_unauthorized()) && self.refresh_access_token().await {
            fetched = self.fetch_profile().await;
        }

        match fetched {
            Ok(Some(profile)) => {
                let mut applied = false;
                self.update(|s| {
                    // A logout or re-login while the request was out wins.
                    if s.is_authenticated && s.access_token.is_some() {
                        s.user = Some(profile);
                        applied = true;
                    }
                });
                if !applied {
                    tracing::debug!("Dropped profile refresh for a session that ended");
                }
                applied
            }
            Ok(None) => false,
            Err(e) => {
                tracing::debug!("Profile refresh failed: {}", e);
                false
            }
        }
    }

    /// Exchange the refresh token for a new access token. Only applies to
    /// the sign-in that was current when the request went out.
    pub async fn refresh_access_token(&self) -> bool {
        let epoch = self.epoch().await;
        let in_memory = {
            let state = self.inner.state.borrow();
            if !state.is_authenticated {
                return false;
            }
            state.refresh_token.clone()
        };
        let refresh = match in_memory {
            Some(token) => token,
            None => match self.inner.store.get(REFRESH_TOKEN_KEY).await {
                Ok(Some(token)) => token,
                _ => return false,
            },
        };

        let request = RefreshRequest { refresh };
        let response = match self
            .inner
            .api
            .post_json::<_, RefreshResponse>("/api/token/refresh/", &request)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::info!("Token refresh failed: {}", e);
                return false;
            }
        };

        let current = self.inner.token_epoch.lock().await;
        if *current != epoch || !self.inner.state.borrow().is_authenticated {
            tracing::debug!("Dropped token refresh for a session that ended");
            return false;
        }

        if let Err(e) = self
            .write_tokens(&response.access, response.refresh.as_deref())
            .await
        {
            tracing::error!("Failed to persist refreshed token: {}", e);
            return false;
        }

        tracing::debug!("Access token refreshed");
        self.update(|s| {
            s.access_token = Some(response.access);
            if let Some(rotated) = response.refresh {
                s.refresh_token = Some(rotated);
            }
        });
        drop(current);
        true
    }

    /// PATCH profile fields; the server's echo replaces the local profile.
    pub async fn update_profile(&self, fields: &ProfileUpdate) -> bool {
        match self
            .inner
            .api
            .patch_json::<_, Profile>(PROFILE_PATH, fields)
            .await
        {
            Ok(profile) => {
                let mut applied = false;
                self.update(|s| {
                    if s.is_authenticated && s.access_token.is_some() {
                        s.user = Some(profile);
                        s.set_message(PROFILE_UPDATED_MESSAGE, MessageType::Success);
                        applied = true;
                    }
                });
                if !applied {
                    tracing::debug!("Dropped profile update for a session that ended");
                }
                applied
            }
            Err(e) => {
                tracing::info!("Profile update failed: {}", e);
                let message = auth::error_message(&e, PROFILE_UPDATE_FAILED_MESSAGE);
                self.update(|s| s.set_message(message, MessageType::Error));
                false
            }
        }
    }

    pub async fn accept_terms(&self) -> bool {
        match self.inner.api.post_empty("/api/accept-terms/").await {
            Ok(_) => {
                self.refresh_user().await;
                true
            }
            Err(e) => {
                tracing::info!("Accepting terms failed: {}", e);
                let message = auth::error_message(&e, TERMS_FAILED_MESSAGE);
                self.update(|s| s.set_message(message, MessageType::Error));
                false
            }
        }
    }

    /// Save preferred destinations, optionally finishing onboarding.
    pub async fn update_preferences(&self, destination_ids: Vec<i64>, mark_complete: bool) -> bool {
        let request = UpdatePreferencesRequest {
            destination_ids,
            mark_complete,
        };
        match self
            .inner
            .api
            .patch_json::<_, Value>("/api/update/", &request)
            .await
        {
            Ok(_) => {
                self.refresh_user().await;
                true
            }
            Err(e) => {
                tracing::info!("Saving preferences failed: {}", e);
                let message = auth::error_message(&e, PREFERENCES_FAILED_MESSAGE);
                self.update(|s| s.set_message(message, MessageType::Error));
                false
            }
        }
    }

    /// The user chose "skip" on the personalization screen.
    pub fn skip_onboarding(&self) {
        self.update(|s| s.has_skipped_onboarding = true);
    }

    pub fn clear_message(&self) {
        self.update(|s| {
            s.message = None;
            s.message_type = None;
        });
    }

    /// Sign out locally. Always succeeds, whatever the SSO provider or the
    /// credential store do.
    pub async fn logout(&self, should_redirect: bool) {
        if let Some(sso) = &self.inner.sso {
            if let Err(e) = sso.revoke().await {
                tracing::warn!("SSO revoke failed, continuing local logout: {}", e);
            }
        }

        {
            let mut epoch = self.inner.token_epoch.lock().await;
            *epoch += 1;
            self.remove_tokens().await;
            self.inner.state.send_replace(Session::signed_out());
        }
        tracing::info!("Logged out");

        if should_redirect {
            if let Some(navigator) = &self.inner.navigator {
                navigator.navigate(self.inner.routes.login);
            }
        }
    }

    /// Gate decision for the current state and a raw router path.
    pub fn required_redirect(&self, gate: &OnboardingGate, raw_path: &str) -> Option<&'static str> {
        let path = normalize_path(raw_path);
        let state = self.inner.state.borrow();
        gate.evaluate(&state.gate_input(&path))
    }

    /// Like [`Self::required_redirect`], navigating when a redirect is due.
    pub fn enforce_gate(&self, gate: &OnboardingGate, raw_path: &str) -> Option<&'static str> {
        let redirect = self.required_redirect(gate, raw_path)?;
        if let Some(navigator) = &self.inner.navigator {
            tracing::debug!(from = raw_path, to = redirect, "onboarding gate redirect");
            navigator.navigate(redirect);
        }
        Some(redirect)
    }

    async fn epoch(&self) -> u64 {
        *self.inner.token_epoch.lock().await
    }

    /// Caller holds the epoch lock.
    async fn write_tokens(&self, access: &str, refresh: Option<&str>) -> Result<(), StorageError> {
        self.inner.store.set(ACCESS_TOKEN_KEY, access).await?;
        if let Some(refresh) = refresh {
            self.inner.store.set(REFRESH_TOKEN_KEY, refresh).await?;
        }
        self.inner.api.set_auth_token(Some(access.to_string()));
        Ok(())
    }

    /// Caller holds the epoch lock.
    async fn remove_tokens(&self) {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = self.inner.store.remove(key).await {
                tracing::warn!(key, "Failed to remove stored credential: {}", e);
            }
        }
        self.inner.api.set_auth_token(None);
    }

    async fn clear_credentials(&self) {
        let mut epoch = self.inner.token_epoch.lock().await;
        *epoch += 1;
        self.remove_tokens().await;
    }
}
