//! Client Module
//!
//! Stateful components of the booking client. The host application builds
//! one of each at startup and injects its platform adapters (credential
//! store, router, browser launcher, SSO provider) through the traits
//! defined here.
//!
//! # Architecture
//!
//! - **`config`** - Backend URL, timeouts, polling cadence
//! - **`api`** - Shared HTTP client owning the bearer header
//! - **`storage`** - Credential store port and adapters
//! - **`auth`** - Backend error to user message mapping
//! - **`types`** - Auth request/response bodies and small enums
//! - **`session`** - `SessionManager`, the owner of authentication state
//! - **`onboarding`** - Pure onboarding gate and the navigation port
//! - **`payment`** - Payment confirmation poller
//! - **`booking`** - Booking submission
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tourguide::client::{
//!     ApiClient, Config, MemoryCredentialStore, OnboardingGate, SessionManager,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let api = ApiClient::new(Config::from_env()?)?;
//! let session = SessionManager::new(api, Arc::new(MemoryCredentialStore::new()));
//! session.load_stored_credentials().await;
//!
//! let gate = OnboardingGate::default();
//! if let Some(route) = session.required_redirect(&gate, "/home") {
//!     println!("redirect to {}", route);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod booking;
pub mod config;
pub mod onboarding;
pub mod payment;
pub mod session;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use api::{ApiClient, ApiError};
pub use booking::{BookingClient, BookingError};
pub use config::Config;
pub use onboarding::{
    apply_gate, normalize_path, required_redirect, GateInput, Navigator, OnboardingGate,
    OnboardingStep, Routes,
};
pub use payment::{
    ManualCheckReason, PaymentAttempt, PaymentError, PaymentEvent, PaymentPhase, PaymentPoller,
    UrlLauncher,
};
pub use session::{Session, SessionManager, SessionManagerBuilder, SsoSession};
pub use storage::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, StorageError, ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
};
pub use types::{AppLifecycle, MessageType, RegisterForm, TokenPair};
