//! Authenticated API client
//!
//! Request guard for every call to the Lendhub backend: attaches the
//! bearer token, recovers transparently from token expiry, and maps
//! response statuses onto the error taxonomy.
//!
//! The 401 recovery contract: the refresh epoch is observed before each
//! request; on a 401 the guard asks its [`TokenSource`] for a token
//! obtained "after" that epoch and replays the original request exactly
//! once. The token source serializes refreshes, so any number of requests
//! failing at the same moment produce a single refresh call and share its
//! outcome. A second 401 on the replay is surfaced, never re-refreshed.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::auth::TokenSource;
use crate::errors::ApiError;

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL for the backend API (e.g. "https://api.lendhub.example/v1")
    pub base_url: String,
    /// Timeout applied to each request attempt
    pub timeout: Duration,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.lendhub.example/v1".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// API client with bearer authentication and 401 recovery
pub struct ApiClient {
    http: Client,
    source: Arc<dyn TokenSource>,
    config: ApiClientConfig,
}

impl ApiClient {
    /// Create a new API client
    ///
    /// The underlying HTTP client carries the configured timeout as well;
    /// `LENDHUB_DISABLE_PROXY=1` bypasses any system proxy, which test
    /// harnesses rely on.
    #[must_use]
    pub fn new(config: ApiClientConfig, source: Arc<dyn TokenSource>) -> Self {
        let builder = Client::builder().timeout(config.timeout);
        let builder = if std::env::var_os("LENDHUB_DISABLE_PROXY").is_some() {
            builder.no_proxy()
        } else {
            builder
        };
        let http = builder.build().unwrap_or_else(|_| Client::new());

        Self { http, source, config }
    }

    /// Create a builder for fluent configuration
    #[must_use]
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Execute a GET request
    ///
    /// # Errors
    /// Returns error if the request fails or the response cannot be
    /// deserialized
    #[instrument(skip(self), fields(path = %path))]
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.execute(Method::GET, path, None).await?;
        let result = Self::decode(response, path).await?;
        info!(path = %path, "GET request successful");
        Ok(result)
    }

    /// Execute a POST request with a JSON body
    ///
    /// # Errors
    /// Returns error if the body cannot be serialized, the request fails,
    /// or the response cannot be deserialized
    #[instrument(skip(self, body), fields(path = %path))]
    pub async fn post<T: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<R, ApiError> {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::Client(format!("Failed to serialize body: {e}")))?;
        let response = self.execute(Method::POST, path, Some(body)).await?;
        let result = Self::decode(response, path).await?;
        info!(path = %path, "POST request successful");
        Ok(result)
    }

    /// Execute a PUT request with a JSON body
    ///
    /// # Errors
    /// Returns error if the body cannot be serialized, the request fails,
    /// or the response cannot be deserialized
    #[instrument(skip(self, body), fields(path = %path))]
    pub async fn put<T: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<R, ApiError> {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::Client(format!("Failed to serialize body: {e}")))?;
        let response = self.execute(Method::PUT, path, Some(body)).await?;
        let result = Self::decode(response, path).await?;
        info!(path = %path, "PUT request successful");
        Ok(result)
    }

    /// Execute a DELETE request
    ///
    /// # Errors
    /// Returns error if the request fails or the response cannot be
    /// deserialized
    #[instrument(skip(self), fields(path = %path))]
    pub async fn delete<R: DeserializeOwned>(&self, path: &str) -> Result<R, ApiError> {
        let response = self.execute(Method::DELETE, path, None).await?;
        let result = Self::decode(response, path).await?;
        info!(path = %path, "DELETE request successful");
        Ok(result)
    }

    /// Send a request, recovering from a 401 through the shared refresh path
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}{}", self.config.base_url, path);

        // Observed before the request so a refresh that completes while we
        // are in flight is recognized as "new enough" to reuse.
        let observed_epoch = self.source.refresh_epoch();
        let token = self.source.access_token().await;

        let response = self.send_once(method.clone(), &url, body.as_ref(), token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(url = %url, "request returned 401, entering shared refresh path");

        let Some(fresh) = self.source.refresh_after(observed_epoch).await else {
            return Err(ApiError::Auth(format!(
                "{url} returned status 401 and the session could not be refreshed"
            )));
        };

        // Exactly one replay; a second 401 is surfaced, not re-refreshed.
        let replay = self.send_once(method, &url, body.as_ref(), Some(&fresh)).await?;
        if replay.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Auth(format!("{url} returned status 401 after token refresh")));
        }

        Ok(replay)
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request =
            self.http.request(method, url).header("Content-Type", "application/json");

        if let Some(token) = token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        match tokio::time::timeout(self.config.timeout, request.send()).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => Err(ApiError::Network(format!("{url} request failed: {err}"))),
            Err(_) => Err(ApiError::Timeout(self.config.timeout)),
        }
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
        path: &str,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status_error(status, path, body));
        }

        // 204/205 responses carry no body
        if status == StatusCode::NO_CONTENT || status == StatusCode::RESET_CONTENT {
            return serde_json::from_value(serde_json::Value::Null).map_err(|_| {
                ApiError::Client(format!(
                    "No content response ({}), but response type cannot be deserialized from empty body",
                    status.as_u16()
                ))
            });
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::Client(format!("Failed to parse response: {e}")))
    }

    fn map_status_error(status: StatusCode, path: &str, body: String) -> ApiError {
        let message = if body.is_empty() {
            format!("{path} returned status {status}")
        } else {
            format!("{path} returned status {status}: {body}")
        };

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            ApiError::Auth(message)
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            ApiError::RateLimit(message)
        } else if status.is_server_error() {
            ApiError::Server(message)
        } else if status.is_client_error() {
            ApiError::Client(message)
        } else {
            ApiError::Network(message)
        }
    }
}

/// Builder for the API client
#[derive(Default)]
pub struct ApiClientBuilder {
    config: Option<ApiClientConfig>,
    source: Option<Arc<dyn TokenSource>>,
}

impl ApiClientBuilder {
    /// Set the client configuration
    #[must_use]
    pub fn config(mut self, config: ApiClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the token source
    #[must_use]
    pub fn source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Build the API client
    ///
    /// # Errors
    /// Returns error if the token source is missing
    pub fn build(self) -> Result<ApiClient, ApiError> {
        let config = self.config.unwrap_or_default();
        let source =
            self.source.ok_or_else(|| ApiError::Config("Token source not set".to_string()))?;

        Ok(ApiClient::new(config, source))
    }
}
