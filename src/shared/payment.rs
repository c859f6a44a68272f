//! Payment wire types for `/api/payments/`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Status reported by `GET /api/payments/status/{id}/`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Paid,
    Failed,
    /// Anything the client does not recognise keeps polling.
    #[serde(other)]
    Unknown,
}

impl PaymentStatus {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Succeeded | Self::Paid)
    }

    /// Polling stops permanently on these.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Paid | Self::Failed)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentStatusResponse {
    pub status: PaymentStatus,
}

/// Backend identifier of a payment; numeric or string on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PaymentId(String);

impl PaymentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PaymentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => PaymentId(text),
            Raw::Number(n) => PaymentId(n.to_string()),
        })
    }
}

/// Body of `POST /api/payments/initiate/`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRequest {
    /// e.g. `"booking"` or `"guide_tier"`
    pub payment_type: String,
    /// e.g. `"gcash"`, `"card"`
    pub payment_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_amount: Option<f64>,
}

impl PaymentRequest {
    pub fn booking(booking_id: i64, payment_method: impl Into<String>, final_amount: f64) -> Self {
        Self {
            payment_type: "booking".to_string(),
            payment_method: payment_method.into(),
            booking_id: Some(booking_id),
            final_amount: Some(final_amount),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitiatePaymentResponse {
    #[serde(default)]
    pub checkout_url: Option<String>,
    #[serde(default)]
    pub payment_id: Option<PaymentId>,
}

/// An in-flight payment attempt. Lives in memory only; the backend can
/// always be re-queried for the real status.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSession {
    pub payment_id: PaymentId,
    pub checkout_url: String,
    pub status: PaymentStatus,
    pub booking_id: Option<i64>,
}

/// Best-effort heuristic: takes the last non-empty path segment of the
/// checkout URL as the payment id. Only used when the backend omits
/// `payment_id`; gateways are free to shape their URLs differently.
pub fn payment_id_from_checkout_url(checkout_url: &str) -> Option<PaymentId> {
    let url = reqwest::Url::parse(checkout_url).ok()?;
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(PaymentId::new)
}
