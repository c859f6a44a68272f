/**
 * Authentication Messages
 *
 * Turns backend auth failures into the single user-facing string the
 * session shows. Screens only render these; they never look at raw
 * backend errors.
 */

use serde_json::Value;

use crate::client::api::ApiError;

pub const NETWORK_ERROR_MESSAGE: &str =
    "Unable to reach the server. Please check your connection and try again.";
pub const VERIFY_EMAIL_MESSAGE: &str =
    "Please verify your email address before logging in. Check your inbox for the verification link.";
pub const LOGIN_FAILED_MESSAGE: &str = "Login failed. Please check your username and password.";
pub const LOGIN_SUCCESS_MESSAGE: &str = "Login successful!";
pub const REGISTER_SUCCESS_MESSAGE: &str =
    "Registration successful! Please check your email to verify your account.";
pub const REGISTER_FAILED_MESSAGE: &str = "Registration failed. Please try again.";
pub const RESEND_SUCCESS_MESSAGE: &str = "Verification email sent. Please check your inbox.";
pub const RESEND_FAILED_MESSAGE: &str = "Could not resend the verification email.";
pub const PROFILE_UPDATED_MESSAGE: &str = "Profile updated successfully!";
pub const PROFILE_UPDATE_FAILED_MESSAGE: &str = "Failed to update profile.";
pub const TERMS_FAILED_MESSAGE: &str = "Could not record your acceptance of the terms.";
pub const PREFERENCES_FAILED_MESSAGE: &str = "Could not save your preferences.";

/// Order in which registration field errors are surfaced.
const REGISTER_ERROR_FIELDS: [&str; 4] = ["username", "email", "password", "detail"];

/// Message for a failed `POST /api/token/`.
pub fn login_error_message(error: &ApiError) -> String {
    if error.is_network() {
        return NETWORK_ERROR_MESSAGE.to_string();
    }

    let backend_message = error
        .body_str("detail")
        .or_else(|| error.body_str("message"));

    match backend_message {
        Some(text) if text.to_lowercase().contains("no active account") => {
            VERIFY_EMAIL_MESSAGE.to_string()
        }
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => LOGIN_FAILED_MESSAGE.to_string(),
    }
}

/// First field-level error in priority order; the rest are dropped.
pub fn first_field_error(body: &Value) -> Option<String> {
    REGISTER_ERROR_FIELDS
        .iter()
        .find_map(|field| field_message(body.get(*field)?))
}

fn field_message(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Array(items) => items.iter().find_map(field_message),
        _ => None,
    }
}

/// Message for a failed `POST /api/register/`.
pub fn register_error_message(error: &ApiError) -> String {
    if error.is_network() {
        return NETWORK_ERROR_MESSAGE.to_string();
    }
    error
        .body()
        .and_then(first_field_error)
        .unwrap_or_else(|| REGISTER_FAILED_MESSAGE.to_string())
}

/// Generic mapping for the remaining operations.
pub fn error_message(error: &ApiError, fallback: &str) -> String {
    if error.is_network() {
        return NETWORK_ERROR_MESSAGE.to_string();
    }
    error
        .body_str("detail")
        .or_else(|| error.body_str("message"))
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}
