//! Tour Guide Booking Client - Core Library
//!
//! Client-side core of the tour-guide booking app: the session and
//! authentication lifecycle, the onboarding gate that guards navigation,
//! and the payment confirmation poller. Screens, layout and styling live in
//! the host application and talk to this crate through its public types.
//!
//! # Module Structure
//!
//! - **`shared`** - Serializable types and plumbing
//!   - Profile, payment and booking wire types
//!   - Configuration, error types, tracing setup
//!
//! - **`client`** - Stateful components
//!   - `SessionManager` (login, registration, token storage, profile refresh)
//!   - `OnboardingGate` (pure redirect decision)
//!   - `PaymentPoller` (checkout hand-off and status polling)
//!   - `BookingClient` (multipart booking submission)
//!
//! # Thread Safety
//!
//! `ApiClient` and `SessionManager` are cheap to clone and can be shared
//! across tasks. Session state is published through a `tokio::sync::watch`
//! channel, so observers always see whole transitions.
//!
//! # Error Handling
//!
//! - `SessionManager` operations never fail outward; they record a message
//!   in the session and return `bool` / `Option`
//! - `PaymentPoller::initiate` and `BookingClient::create_booking` return
//!   `Result` with `thiserror` enums
//! - Custom error types live in `shared::error` and next to each client
//!   component

/// Shared types and data structures
pub mod shared;

/// Session, onboarding, payment and booking components
pub mod client;
