//! REST client for the tour-guide backend.
//!
//! One `ApiClient` is shared by every component. It owns the default
//! `Authorization` header: `set_auth_token` takes effect for every request
//! built after it returns, so writers can keep the header in lockstep with
//! the credential store.

use std::sync::{Arc, RwLock};

use reqwest::{multipart, Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::client::config::Config;

/// Errors from a single backend call
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response: connection refused, DNS, TLS, timeout
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status
    #[error("Request failed with status {status}")]
    Status {
        status: StatusCode,
        /// Parsed JSON body, a JSON string for non-JSON bodies, or `Null`
        body: Value,
    },

    /// The backend answered 2xx but the body did not match
    #[error("Failed to parse response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn body(&self) -> Option<&Value> {
        match self {
            Self::Status { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// A top-level string field of the error body, e.g. `detail`.
    pub fn body_str(&self, key: &str) -> Option<&str> {
        self.body()?.get(key)?.as_str()
    }
}

struct Inner {
    config: Config,
    http: Client,
    auth_token: RwLock<Option<String>>,
}

/// Shared HTTP client
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("server_url", &self.inner.config.server_url())
            .field("authenticated", &self.auth_token().is_some())
            .finish()
    }
}

impl ApiClient {
    pub fn new(config: Config) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                http,
                auth_token: RwLock::new(None),
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Replace the default bearer token.
    pub fn set_auth_token(&self, token: Option<String>) {
        let mut slot = self
            .inner
            .auth_token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = token;
    }

    pub fn auth_token(&self) -> Option<String> {
        self.inner
            .auth_token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.inner.config.api_url(path);
        let builder = self
            .inner
            .http
            .request(method, url)
            .timeout(self.inner.config.request_timeout());
        match self.auth_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        Self::send(self.request(Method::GET, path)).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        Self::send(self.request(Method::POST, path).json(body)).await
    }

    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        Self::send(self.request(Method::PATCH, path).json(body)).await
    }

    /// POST without a body; the response body is returned as raw JSON.
    pub async fn post_empty(&self, path: &str) -> Result<Value, ApiError> {
        Self::send(self.request(Method::POST, path)).await
    }

    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: multipart::Form,
    ) -> Result<T, ApiError> {
        Self::send(self.request(Method::POST, path).multipart(form)).await
    }

    async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let body = if text.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            };
            tracing::debug!(%status, "backend returned error status");
            return Err(ApiError::Status { status, body });
        }

        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        Ok(serde_json::from_str(text)?)
    }
}
