/**
 * Client Types Module
 *
 * Request/response bodies for the auth endpoints and small enums shared by
 * the client components.
 */

use serde::{Deserialize, Serialize};

use crate::shared::error::SharedError;

/// Kind of the toast currently shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Success,
    Error,
}

/// Host application visibility, as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppLifecycle {
    Foreground,
    Background,
}

/// `POST /api/token/` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// `POST /api/token/` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// `POST /api/token/refresh/` body
#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

/// `POST /api/token/refresh/` response; rotation may also hand back a new refresh token
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// `POST /api/resend-verify-email/` body
#[derive(Debug, Clone, Serialize)]
pub struct ResendVerifyRequest {
    pub email: String,
}

/// `PATCH /api/update/` body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdatePreferencesRequest {
    pub destination_ids: Vec<i64>,
    pub mark_complete: bool,
}

pub const MIN_PASSWORD_LEN: usize = 8;

/// Registration form, also the `POST /api/register/` body
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<(), SharedError> {
        if self.username.trim().is_empty() {
            return Err(SharedError::validation("username", "Username is required"));
        }
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err(SharedError::validation("email", "Email and password are required"));
        }
        if !self.email.contains('@') || !self.email.contains('.') {
            return Err(SharedError::validation("email", "Please enter a valid email address"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(SharedError::validation(
                "password",
                format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
            ));
        }
        if self.password != self.confirm_password {
            return Err(SharedError::validation("confirm_password", "Passwords do not match"));
        }
        Ok(())
    }
}
