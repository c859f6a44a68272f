//! Booking creation (`POST /api/bookings/`, multipart).

use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::multipart::{Form, Part};
use thiserror::Error;

use crate::client::api::{ApiClient, ApiError};
use crate::client::auth::NETWORK_ERROR_MESSAGE;
use crate::shared::booking::{Booking, BookingForm};
use crate::shared::error::SharedError;

#[derive(Debug, Error)]
pub enum BookingError {
    #[error(transparent)]
    Validation(#[from] SharedError),
    #[error("invalid attachment {file_name}: {reason}")]
    InvalidAttachment { file_name: String, reason: String },
    #[error("a booking is already being submitted")]
    InFlight,
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl BookingError {
    /// Text for the booking screen's error banner.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(e) => e.user_message().to_string(),
            Self::InvalidAttachment { file_name, .. } => {
                format!("Could not attach {}. Please choose another image.", file_name)
            }
            Self::InFlight => "Your booking is still being submitted.".to_string(),
            Self::Api(e) if e.is_network() => NETWORK_ERROR_MESSAGE.to_string(),
            Self::Api(e) => e
                .body()
                .and_then(crate::client::auth::first_field_error)
                .or_else(|| e.body_str("error").map(str::to_string))
                .unwrap_or_else(|| "Booking failed. Please try again.".to_string()),
        }
    }
}

/// Clears the in-flight flag even if the request future is dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct BookingClient {
    api: ApiClient,
    in_flight: AtomicBool,
}

impl BookingClient {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Validate and submit. A second call while one is in flight is
    /// rejected rather than creating a duplicate booking.
    pub async fn create_booking(&self, form: &BookingForm) -> Result<Booking, BookingError> {
        form.validate()?;

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BookingError::InFlight);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let multipart = build_form(form)?;
        let booking: Booking = self.api.post_multipart("/api/bookings/", multipart).await?;
        tracing::info!(booking_id = booking.id, "Booking created");
        Ok(booking)
    }
}

fn build_form(form: &BookingForm) -> Result<Form, BookingError> {
    let mut multipart = Form::new();
    for (name, value) in form.text_fields() {
        multipart = multipart.text(name, value);
    }
    for image in &form.kyc_images {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.mime)
            .map_err(|e| BookingError::InvalidAttachment {
                file_name: image.file_name.clone(),
                reason: e.to_string(),
            })?;
        multipart = multipart.part(image.field.clone(), part);
    }
    Ok(multipart)
}
