//! Booking submission against a mock backend

use assert_matches::assert_matches;
use chrono::NaiveDate;
use serde_json::json;
use tourguide::client::{BookingClient, BookingError};
use tourguide::shared::{BookingForm, KycImage};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::*;

fn form() -> BookingForm {
    BookingForm {
        guide_id: Some(3),
        agency_id: None,
        destination_id: Some(11),
        start_date: NaiveDate::from_ymd_opt(2026, 12, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2026, 12, 3).unwrap(),
        number_of_participants: 2,
        billing_name: "Ana Reyes".to_string(),
        billing_email: "ana@example.com".to_string(),
        billing_phone: "09171234567".to_string(),
        special_requests: None,
        kyc_images: vec![KycImage {
            field: "valid_id_image".to_string(),
            file_name: "id.jpg".to_string(),
            mime: "image/jpeg".to_string(),
            bytes: vec![0xff, 0xd8, 0xff, 0xe0],
        }],
    }
}

#[tokio::test]
async fn test_create_booking_sends_multipart() {
    let h = Harness::start().await.signed_in().await;
    Mock::given(method("POST"))
        .and(path("/api/bookings/"))
        .and(header("authorization", auth_header(ACCESS).as_str()))
        .and(body_string_contains("name=\"guide\""))
        .and(body_string_contains("2026-12-03"))
        .and(body_string_contains("filename=\"id.jpg\""))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 501,
            "status": "pending_payment",
            "total_price": "5000.00",
            "check_in": "2026-12-01",
            "check_out": "2026-12-03"
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let client = BookingClient::new(h.api.clone());
    let booking = client.create_booking(&form()).await.unwrap();

    assert_eq!(booking.id, 501);
    assert_eq!(booking.status.as_deref(), Some("pending_payment"));
    assert_eq!(booking.check_out, NaiveDate::from_ymd_opt(2026, 12, 3));
    assert!(!client.is_submitting());
}

#[tokio::test]
async fn test_invalid_form_is_not_sent() {
    let h = Harness::start().await;
    Mock::given(method("POST"))
        .and(path("/api/bookings/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
        .expect(0)
        .mount(&h.server)
        .await;

    let mut bad = form();
    bad.end_date = NaiveDate::from_ymd_opt(2026, 11, 30).unwrap();

    let client = BookingClient::new(h.api.clone());
    let err = client.create_booking(&bad).await.unwrap_err();

    assert_matches!(err, BookingError::Validation(_));
    assert_eq!(err.user_message(), "End date cannot be before the start date");
}

#[tokio::test]
async fn test_backend_rejection_message() {
    let h = Harness::start().await.signed_in().await;
    Mock::given(method("POST"))
        .and(path("/api/bookings/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "detail": ["Guide is not available for these dates."]
        })))
        .mount(&h.server)
        .await;

    let client = BookingClient::new(h.api.clone());
    let err = client.create_booking(&form()).await.unwrap_err();

    assert_eq!(err.user_message(), "Guide is not available for these dates.");
    assert!(!client.is_submitting());
}
