use std::path::PathBuf;
use std::time::Duration;

use crate::shared::config::{AppConfig, AppConfigBuilder, ConfigError};

/// Client configuration wrapper.
#[derive(Debug, Clone, Default)]
pub struct Config {
    app: AppConfig,
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builder(builder: AppConfigBuilder) -> Result<Self, ConfigError> {
        Ok(Self { app: builder.build()? })
    }

    /// Configuration from `TOURGUIDE_*` variables and `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self { app: AppConfig::from_env()? })
    }

    /// Get the full URL for an API endpoint
    pub fn api_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.server_url(), path)
        } else {
            format!("{}/{}", self.server_url(), path)
        }
    }

    pub fn server_url(&self) -> &str {
        &self.app.server_url
    }

    pub fn request_timeout(&self) -> Duration {
        self.app.request_timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.app.poll_interval
    }

    pub fn max_poll_duration(&self) -> Option<Duration> {
        self.app.max_poll_duration
    }

    /// Where the file credential store keeps its tokens.
    pub fn credentials_path(&self) -> Option<PathBuf> {
        self.app.credentials_path.clone().or_else(|| {
            dirs::data_dir().map(|dir| dir.join("tourguide").join("credentials.json"))
        })
    }
}

impl From<AppConfig> for Config {
    fn from(app: AppConfig) -> Self {
        Self { app }
    }
}
