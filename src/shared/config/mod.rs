//! Application configuration module
//!
//! Provides the configuration for the booking client: backend location,
//! request timeout and the payment polling cadence. Values come from the
//! builder, the environment (`.env` is honoured) or a TOML document.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default backend URL
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";

/// Booking and payment creation observed to need up to 15s.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(15_000);

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3_000);

/// Ceiling after which payment polling stops and asks for a manual check.
pub const DEFAULT_MAX_POLL_DURATION: Duration = Duration::from_secs(10 * 60);

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Backend base URL, without a trailing slash
    pub server_url: String,
    /// Timeout applied to every backend request
    pub request_timeout: Duration,
    /// Interval between payment status checks
    pub poll_interval: Duration,
    /// Maximum time to poll a payment before falling back to a manual check
    pub max_poll_duration: Option<Duration>,
    /// Override for the file credential store location
    pub credentials_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_duration: Some(DEFAULT_MAX_POLL_DURATION),
            credentials_path: None,
        }
    }
}

/// On-disk shape of the configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    server_url: Option<String>,
    request_timeout_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    /// `0` disables the ceiling
    max_poll_secs: Option<u64>,
    credentials_path: Option<PathBuf>,
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(self.server_url.clone()));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidNumber("request_timeout"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidNumber("poll_interval"));
        }
        Ok(())
    }

    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory is read first when present.
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut builder = Self::builder();
        if let Ok(url) = std::env::var("TOURGUIDE_API_URL") {
            builder = builder.server_url(url);
        }
        if let Some(ms) = env_u64("TOURGUIDE_REQUEST_TIMEOUT_MS")? {
            builder = builder.request_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = env_u64("TOURGUIDE_POLL_INTERVAL_MS")? {
            builder = builder.poll_interval(Duration::from_millis(ms));
        }
        if let Some(secs) = env_u64("TOURGUIDE_MAX_POLL_SECS")? {
            builder = builder.max_poll_duration((secs > 0).then(|| Duration::from_secs(secs)));
        }
        if let Ok(path) = std::env::var("TOURGUIDE_CREDENTIALS_PATH") {
            builder = builder.credentials_path(PathBuf::from(path));
        }
        builder.build()
    }

    /// Parse configuration from a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(input)?;

        let mut builder = Self::builder();
        if let Some(url) = file.server_url {
            builder = builder.server_url(url);
        }
        if let Some(ms) = file.request_timeout_ms {
            builder = builder.request_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = file.poll_interval_ms {
            builder = builder.poll_interval(Duration::from_millis(ms));
        }
        if let Some(secs) = file.max_poll_secs {
            builder = builder.max_poll_duration((secs > 0).then(|| Duration::from_secs(secs)));
        }
        if let Some(path) = file.credentials_path {
            builder = builder.credentials_path(path);
        }
        builder.build()
    }
}

fn env_u64(name: &'static str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber(name)),
        Err(_) => Ok(None),
    }
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    server_url: Option<String>,
    request_timeout: Option<Duration>,
    poll_interval: Option<Duration>,
    max_poll_duration: Option<Option<Duration>>,
    credentials_path: Option<PathBuf>,
}

impl AppConfigBuilder {
    /// Set the server URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// `None` lets the poller run until a terminal status.
    pub fn max_poll_duration(mut self, ceiling: Option<Duration>) -> Self {
        self.max_poll_duration = Some(ceiling);
        self
    }

    pub fn credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        let defaults = AppConfig::default();
        let server_url = self
            .server_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.server_url);
        if server_url.is_empty() {
            return Err(ConfigError::MissingValue("server_url"));
        }

        let config = AppConfig {
            server_url,
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            poll_interval: self.poll_interval.unwrap_or(defaults.poll_interval),
            max_poll_duration: self.max_poll_duration.unwrap_or(defaults.max_poll_duration),
            credentials_path: self.credentials_path,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid number for {0}")]
    InvalidNumber(&'static str),
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}
