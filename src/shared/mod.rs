//! Shared Module
//!
//! Serializable types exchanged with the tour-guide backend, plus the
//! configuration, error and logging plumbing every client component uses.
//! Nothing in here holds state or talks to the network.

/// Application configuration
pub mod config;

/// Shared error types
pub mod error;

/// Tracing subscriber setup
pub mod logging;

/// Account profile
pub mod profile;

/// Payment wire types
pub mod payment;

/// Booking form and booking object
pub mod booking;

pub use booking::{Booking, BookingForm, KycImage};
pub use config::{AppConfig, AppConfigBuilder, ConfigError};
pub use error::SharedError;
pub use payment::{PaymentId, PaymentRequest, PaymentSession, PaymentStatus};
pub use profile::{PersonalizationProfile, Profile, ProfileUpdate};
