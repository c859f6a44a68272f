//! Session lifecycle against a mock backend

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tourguide::client::auth::{
    LOGIN_SUCCESS_MESSAGE, REGISTER_SUCCESS_MESSAGE, VERIFY_EMAIL_MESSAGE,
};
use tourguide::client::{
    MessageType, OnboardingGate, RegisterForm, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY,
};
use tourguide::shared::ProfileUpdate;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::*;

#[tokio::test]
async fn test_load_restores_valid_session() {
    let h = Harness::start().await;
    h.seed_tokens(ACCESS, REFRESH).await;
    mount_profile_for(&h.server, ACCESS, complete_profile()).await;

    h.session.load_stored_credentials().await;

    let state = h.session.snapshot();
    assert!(state.is_authenticated);
    assert!(!state.is_loading);
    assert_eq!(state.access_token.as_deref(), Some(ACCESS));
    assert_eq!(state.refresh_token.as_deref(), Some(REFRESH));
    assert_eq!(state.user.as_ref().map(|u| u.id), Some(42));
    assert_eq!(h.api.auth_token().as_deref(), Some(ACCESS));
}

#[tokio::test]
async fn test_load_with_rejected_token_signs_out() {
    for status in [401, 404] {
        let h = Harness::start().await;
        h.seed_tokens(ACCESS, REFRESH).await;
        mount_profile_status(&h.server, status).await;

        h.session.load_stored_credentials().await;

        crate::assert_signed_out!(h.session);
        assert!(!h.session.snapshot().is_loading);
        assert!(h.store.is_empty().await, "store not cleared for {}", status);
        assert!(h.api.auth_token().is_none());
        // Silent: no redirect, no message.
        assert!(h.navigator.visited().is_empty());
        assert!(h.session.snapshot().message.is_none());

        // A second pass over an empty store changes nothing.
        h.session.load_stored_credentials().await;
        crate::assert_signed_out!(h.session);
        assert!(h.store.is_empty().await);
    }
}

#[tokio::test]
async fn test_load_with_server_error_keeps_tokens() {
    let h = Harness::start().await;
    h.seed_tokens(ACCESS, REFRESH).await;
    mount_profile_status(&h.server, 500).await;

    h.session.load_stored_credentials().await;

    let state = h.session.snapshot();
    assert!(!state.is_authenticated);
    assert!(!state.is_loading);
    assert_eq!(state.message_type, Some(MessageType::Error));
    assert_eq!(h.stored(ACCESS_TOKEN_KEY).await.as_deref(), Some(ACCESS));
    assert_eq!(h.stored(REFRESH_TOKEN_KEY).await.as_deref(), Some(REFRESH));
}

#[tokio::test]
async fn test_login_success() {
    let h = Harness::start().await;
    mount_token(&h.server, ACCESS, REFRESH).await;
    mount_profile_for(&h.server, ACCESS, complete_profile()).await;

    let profile = h.session.login("  ana ", "sunrise-cebu").await;

    assert_eq!(profile.map(|p| p.id), Some(42));
    let state = h.session.snapshot();
    assert!(state.is_authenticated);
    assert!(!state.is_loading);
    crate::assert_message!(h.session, MessageType::Success, LOGIN_SUCCESS_MESSAGE);
    assert_eq!(h.stored(ACCESS_TOKEN_KEY).await.as_deref(), Some(ACCESS));
    assert_eq!(h.stored(REFRESH_TOKEN_KEY).await.as_deref(), Some(REFRESH));
    assert_eq!(h.api.auth_token().as_deref(), Some(ACCESS));
}

#[tokio::test]
async fn test_login_unverified_account() {
    let h = Harness::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "No active account found with the given credentials"
        })))
        .mount(&h.server)
        .await;

    assert!(h.session.login("ana", "sunrise-cebu").await.is_none());

    crate::assert_signed_out!(h.session);
    crate::assert_message!(h.session, MessageType::Error, VERIFY_EMAIL_MESSAGE);
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn test_login_with_null_profile_rolls_back() {
    let h = Harness::start().await;
    mount_token(&h.server, ACCESS, REFRESH).await;
    mount_profile_for(&h.server, ACCESS, serde_json::Value::Null).await;

    assert!(h.session.login("ana", "sunrise-cebu").await.is_none());

    crate::assert_signed_out!(h.session);
    crate::assert_message!(h.session, MessageType::Error, VERIFY_EMAIL_MESSAGE);
    assert!(h.store.is_empty().await);
    assert!(h.api.auth_token().is_none());
}

fn register_form() -> RegisterForm {
    RegisterForm {
        username: "ana".to_string(),
        email: "ana@example.com".to_string(),
        password: "sunrise-cebu".to_string(),
        confirm_password: "sunrise-cebu".to_string(),
    }
}

#[tokio::test]
async fn test_register_success_does_not_sign_in() {
    let h = Harness::start().await;
    Mock::given(method("POST"))
        .and(path("/api/register/"))
        .and(body_json(json!({
            "username": "ana",
            "email": "ana@example.com",
            "password": "sunrise-cebu",
            "confirm_password": "sunrise-cebu"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 42})))
        .expect(1)
        .mount(&h.server)
        .await;

    assert!(h.session.register(&register_form()).await);

    assert!(!h.session.snapshot().is_authenticated);
    crate::assert_message!(h.session, MessageType::Success, REGISTER_SUCCESS_MESSAGE);
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn test_register_surfaces_first_field_error() {
    let h = Harness::start().await;
    Mock::given(method("POST"))
        .and(path("/api/register/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "password": ["This password is too common."],
            "detail": "Invalid registration",
            "email": ["user with this email already exists."]
        })))
        .mount(&h.server)
        .await;

    assert!(!h.session.register(&register_form()).await);
    crate::assert_message!(
        h.session,
        MessageType::Error,
        "user with this email already exists."
    );
}

#[tokio::test]
async fn test_logout_survives_sso_failure() {
    let h = Harness::with_sso(FakeSso::failing()).await.signed_in().await;

    h.session.logout(true).await;

    crate::assert_signed_out!(h.session);
    assert_eq!(h.sso.revokes(), 1);
    assert!(h.store.is_empty().await);
    assert!(h.api.auth_token().is_none());
    assert_eq!(h.navigator.visited(), vec!["/auth/login".to_string()]);
}

#[tokio::test]
async fn test_logout_twice_is_harmless() {
    let h = Harness::start().await.signed_in().await;
    h.session.skip_onboarding();

    h.session.logout(false).await;
    h.session.logout(false).await;

    crate::assert_signed_out!(h.session);
    let state = h.session.snapshot();
    assert!(!state.has_skipped_onboarding);
    assert!(state.message.is_none());
    assert!(!state.is_loading);
    assert!(h.navigator.visited().is_empty());
    assert_eq!(h.sso.revokes(), 2);
}

#[tokio::test]
async fn test_profile_update_then_refresh_keeps_server_value() {
    let h = Harness::start().await.signed_in().await;

    let mut updated = complete_profile();
    updated["location"] = json!("Cebu");
    Mock::given(method("PATCH"))
        .and(path("/api/profile/"))
        .and(body_json(json!({"location": "Cebu"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(updated.clone()))
        .expect(1)
        .mount(&h.server)
        .await;

    assert!(h.session.update_profile(&ProfileUpdate::location("Cebu")).await);
    let location = |h: &Harness| h.session.snapshot().user.and_then(|u| u.location);
    assert_eq!(location(&h).as_deref(), Some("Cebu"));

    // The backend now serves the new value on GET as well.
    Mock::given(method("GET"))
        .and(path("/api/profile/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(updated))
        .with_priority(1)
        .mount(&h.server)
        .await;

    assert!(h.session.refresh_user().await);
    assert_eq!(location(&h).as_deref(), Some("Cebu"));
}

#[tokio::test]
async fn test_failed_update_leaves_profile_untouched() {
    let h = Harness::start().await.signed_in().await;
    let before = h.session.snapshot().user;
    Mock::given(method("PATCH"))
        .and(path("/api/profile/"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"detail": "Invalid location"})),
        )
        .mount(&h.server)
        .await;

    assert!(!h.session.update_profile(&ProfileUpdate::location("")).await);

    assert_eq!(h.session.snapshot().user, before);
    assert!(h.session.snapshot().is_authenticated);
    crate::assert_message!(h.session, MessageType::Error, "Invalid location");
}

#[tokio::test]
async fn test_refresh_user_retries_after_token_refresh() {
    let h = Harness::start().await.signed_in().await;

    Mock::given(method("GET"))
        .and(path("/api/profile/"))
        .and(header("authorization", auth_header(ACCESS).as_str()))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Token expired"})))
        .with_priority(1)
        .mount(&h.server)
        .await;
    mount_refresh(&h.server, REFRESH, "access-2").await;
    let mut renewed = complete_profile();
    renewed["location"] = json!("Cebu");
    mount_profile_for(&h.server, "access-2", renewed).await;

    assert!(h.session.refresh_user().await);

    let state = h.session.snapshot();
    assert!(state.is_authenticated);
    assert_eq!(state.access_token.as_deref(), Some("access-2"));
    // The refresh response did not rotate the refresh token.
    assert_eq!(state.refresh_token.as_deref(), Some(REFRESH));
    assert_eq!(state.user.and_then(|u| u.location).as_deref(), Some("Cebu"));
    assert_eq!(h.stored(ACCESS_TOKEN_KEY).await.as_deref(), Some("access-2"));
    assert_eq!(h.api.auth_token().as_deref(), Some("access-2"));
}

#[tokio::test]
async fn test_refresh_user_after_logout_is_dropped() {
    let h = Harness::start().await.signed_in().await;
    h.session.logout(false).await;

    // Token is gone, so the backend rejects the call.
    assert!(!h.session.refresh_user().await);
    crate::assert_signed_out!(h.session);
}

#[tokio::test]
async fn test_onboarding_walkthrough() {
    let h = Harness::start().await;
    let gate = OnboardingGate::default();
    mount_token(&h.server, ACCESS, REFRESH).await;
    mount_profile_for(&h.server, ACCESS, profile_json("Ana", "Reyes", false, false)).await;

    h.session.load_stored_credentials().await;
    assert_eq!(h.session.required_redirect(&gate, "/home"), Some("/"));
    assert_eq!(h.session.required_redirect(&gate, "/auth/login"), None);

    h.session.login("ana", "sunrise-cebu").await;
    assert_eq!(
        h.session.enforce_gate(&gate, "/home"),
        Some("/onboarding/terms_and_conditions")
    );
    assert_eq!(
        h.navigator.visited(),
        vec!["/onboarding/terms_and_conditions".to_string()]
    );

    Mock::given(method("POST"))
        .and(path("/api/accept-terms/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/profile/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(profile_json("Ana", "Reyes", true, false)),
        )
        .with_priority(1)
        .mount(&h.server)
        .await;

    assert!(h.session.accept_terms().await);
    assert!(h.session.snapshot().user.is_some_and(|u| u.has_accepted_terms));
    assert_eq!(
        h.session.required_redirect(&gate, "/onboarding/terms_and_conditions/"),
        Some("/onboarding/personalization")
    );

    h.session.skip_onboarding();
    assert_eq!(h.session.required_redirect(&gate, "/onboarding/personalization?step=2"), None);
    assert_eq!(h.session.required_redirect(&gate, "/home"), None);
    assert_eq!(
        h.session.required_redirect(&gate, "/onboarding/terms_and_conditions"),
        Some("/home")
    );
}

#[tokio::test]
async fn test_update_preferences_marks_onboarding_complete() {
    let h = Harness::start().await;
    mount_token(&h.server, ACCESS, REFRESH).await;
    mount_profile_for(&h.server, ACCESS, profile_json("Ana", "Reyes", true, false)).await;
    h.session.login("ana", "sunrise-cebu").await;

    Mock::given(method("PATCH"))
        .and(path("/api/update/"))
        .and(body_json(json!({"destination_ids": [3, 7], "mark_complete": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"detail": "ok"})))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/profile/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(complete_profile()))
        .with_priority(1)
        .mount(&h.server)
        .await;

    assert!(h.session.update_preferences(vec![3, 7], true).await);
    assert!(h.session.snapshot().user.is_some_and(|u| u.onboarding_completed()));
    assert_eq!(
        h.session.required_redirect(&OnboardingGate::default(), "/onboarding/personalization"),
        None
    );
}

#[tokio::test]
async fn test_subscribers_see_login() {
    let h = Harness::start().await;
    let mut rx = h.session.subscribe();
    let _ = rx.borrow_and_update();

    let h = h.signed_in().await;

    assert!(rx.has_changed().unwrap());
    let state = rx.borrow_and_update().clone();
    assert!(state.is_authenticated);
    assert_eq!(state.user.map(|u| u.display_name()), Some("Ana Reyes".to_string()));
    drop(h);
}

#[tokio::test]
async fn test_resend_verification_uses_backend_detail() {
    let h = Harness::start().await;
    Mock::given(method("POST"))
        .and(path("/api/resend-verify-email/"))
        .and(body_json(json!({"email": "ana@example.com"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"detail": "Email sent"})))
        .mount(&h.server)
        .await;

    assert!(h.session.resend_verification_email(" ana@example.com ").await);
    crate::assert_message!(h.session, MessageType::Success, "Email sent");
}

const SLOW: Duration = Duration::from_millis(300);

#[tokio::test]
async fn test_logout_during_token_refresh_stays_signed_out() {
    let h = Harness::start().await.signed_in().await;
    Mock::given(method("GET"))
        .and(path("/api/profile/"))
        .and(header("authorization", auth_header(ACCESS).as_str()))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Token expired"})))
        .with_priority(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access": "access-2"}))
                .set_delay(SLOW),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let session = h.session.clone();
    let refresh = tokio::spawn(async move { session.refresh_user().await });
    tokio::time::sleep(SLOW / 3).await;
    h.session.logout(false).await;

    assert!(!refresh.await.unwrap());
    crate::assert_signed_out!(h.session);
    assert!(h.store.is_empty().await);
    assert!(h.api.auth_token().is_none());

    // The next launch finds nothing to restore.
    h.session.load_stored_credentials().await;
    crate::assert_signed_out!(h.session);
}

#[tokio::test]
async fn test_logout_during_profile_update_drops_response() {
    let h = Harness::start().await.signed_in().await;
    let mut updated = complete_profile();
    updated["location"] = json!("Cebu");
    Mock::given(method("PATCH"))
        .and(path("/api/profile/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(updated).set_delay(SLOW))
        .mount(&h.server)
        .await;

    let session = h.session.clone();
    let update =
        tokio::spawn(async move { session.update_profile(&ProfileUpdate::location("Cebu")).await });
    tokio::time::sleep(SLOW / 3).await;
    h.session.logout(false).await;

    assert!(!update.await.unwrap());
    crate::assert_signed_out!(h.session);
    assert!(h.session.snapshot().message.is_none());
}
