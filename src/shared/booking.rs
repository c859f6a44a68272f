//! Booking form and the booking object returned by `POST /api/bookings/`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::shared::error::SharedError;

/// Identity document photo attached to a booking
#[derive(Debug, Clone, PartialEq)]
pub struct KycImage {
    /// Multipart field name, e.g. `valid_id_image`
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Input collected by the booking screen
#[derive(Debug, Clone, PartialEq)]
pub struct BookingForm {
    pub guide_id: Option<i64>,
    pub agency_id: Option<i64>,
    pub destination_id: Option<i64>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub number_of_participants: u32,
    pub billing_name: String,
    pub billing_email: String,
    pub billing_phone: String,
    pub special_requests: Option<String>,
    pub kyc_images: Vec<KycImage>,
}

impl BookingForm {
    /// Returns the first failing field, in on-screen order.
    pub fn validate(&self) -> Result<(), SharedError> {
        if self.guide_id.is_none() && self.agency_id.is_none() {
            return Err(SharedError::validation(
                "guide_id",
                "Please choose a guide or agency to book",
            ));
        }
        if self.end_date < self.start_date {
            return Err(SharedError::validation(
                "end_date",
                "End date cannot be before the start date",
            ));
        }
        if self.number_of_participants == 0 {
            return Err(SharedError::validation(
                "number_of_participants",
                "At least one guest is required",
            ));
        }
        if self.billing_name.trim().is_empty() {
            return Err(SharedError::validation("billing_name", "Billing name is required"));
        }
        if !self.billing_email.contains('@') || !self.billing_email.contains('.') {
            return Err(SharedError::validation(
                "billing_email",
                "Please enter a valid email address",
            ));
        }
        if self.billing_phone.trim().is_empty() {
            return Err(SharedError::validation("billing_phone", "Phone number is required"));
        }
        Ok(())
    }

    /// Plain text fields of the multipart body, in a stable order.
    pub fn text_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::new();
        if let Some(id) = self.guide_id {
            fields.push(("guide", id.to_string()));
        }
        if let Some(id) = self.agency_id {
            fields.push(("agency", id.to_string()));
        }
        if let Some(id) = self.destination_id {
            fields.push(("destination", id.to_string()));
        }
        fields.push(("check_in", self.start_date.format("%Y-%m-%d").to_string()));
        fields.push(("check_out", self.end_date.format("%Y-%m-%d").to_string()));
        fields.push(("number_of_participants", self.number_of_participants.to_string()));
        fields.push(("billing_name", self.billing_name.trim().to_string()));
        fields.push(("billing_email", self.billing_email.trim().to_string()));
        fields.push(("billing_phone", self.billing_phone.trim().to_string()));
        if let Some(requests) = self.special_requests.as_deref().map(str::trim) {
            if !requests.is_empty() {
                fields.push(("special_requests", requests.to_string()));
            }
        }
        fields
    }
}

/// Booking as echoed by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub total_price: Option<serde_json::Value>,
    #[serde(default)]
    pub check_in: Option<NaiveDate>,
    #[serde(default)]
    pub check_out: Option<NaiveDate>,
}
