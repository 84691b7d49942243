//! OAuth 2.0 wire client
//!
//! One method per backend interface: authorization URL building, the
//! code-for-tokens exchange (form-encoded), profile fetch, token refresh
//! (bearer + JSON), and best-effort revocation. Every call runs under the
//! configured request timeout so no caller can be left with a stuck
//! loading flag.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::config::AuthConfig;
use crate::csrf::LoginChallenge;
use crate::error::AuthError;
use crate::types::{Envelope, OAuthError, RevokeRequest, TokenResponse, TokenSet, UserProfile};

/// Trait for the OAuth wire operations
///
/// Abstracts the HTTP client to enable testing with scripted
/// implementations and to keep the flow service free of transport detail.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Build the authorization URL the user's browser should visit
    fn authorize_url(&self, challenge: &LoginChallenge) -> String;

    /// Exchange an authorization code for tokens
    ///
    /// # Errors
    /// Returns [`AuthError::ExchangeFailed`] if the server rejects the code
    /// or the response is malformed
    async fn exchange_code(&self, code: &str) -> Result<TokenSet, AuthError>;

    /// Fetch the authenticated user's profile
    ///
    /// # Errors
    /// Returns [`AuthError::Unauthorized`] on HTTP 401 and
    /// [`AuthError::ProfileUnavailable`] on any other failure
    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, AuthError>;

    /// Obtain a new access token by presenting the expired one
    ///
    /// # Errors
    /// Returns [`AuthError::RefreshFailed`] on any failure, including a
    /// response without an `access_token`
    async fn refresh(&self, expired_access_token: &str) -> Result<TokenSet, AuthError>;

    /// Ask the server to invalidate a token
    ///
    /// # Errors
    /// Returns [`AuthError::RevokeFailed`] on transport failure; callers
    /// are expected to swallow it (logout is a local guarantee)
    async fn revoke(&self, access_token: &str) -> Result<(), AuthError>;
}

/// HTTP implementation of [`AuthBackend`] over `reqwest`
#[derive(Debug, Clone)]
pub struct AuthClient {
    config: AuthConfig,
    http: Client,
}

impl AuthClient {
    /// Create a new client with the given configuration
    ///
    /// The underlying HTTP client carries the configured per-request
    /// timeout. `LENDHUB_DISABLE_PROXY=1` bypasses any system proxy, which
    /// test harnesses rely on.
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        let builder = Client::builder().timeout(config.http_timeout);
        let builder = if std::env::var_os("LENDHUB_DISABLE_PROXY").is_some() {
            builder.no_proxy()
        } else {
            builder
        };
        let http = builder.build().unwrap_or_else(|_| Client::new());

        Self { config, http }
    }

    /// Get a reference to the configuration
    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    async fn parse_token_body(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<TokenSet, String> {
        match response.json::<Envelope<TokenResponse>>().await {
            Ok(envelope) => Ok(envelope.into_inner().into()),
            Err(err) => {
                debug!(endpoint, error = %err, "token response body malformed");
                Err(format!("{endpoint} response was missing an access token"))
            }
        }
    }

    async fn log_oauth_error(response: reqwest::Response, endpoint: &str) -> StatusCode {
        let status = response.status();
        if let Ok(oauth_error) = response.json::<OAuthError>().await {
            debug!(endpoint, status = %status, error = %oauth_error, "server rejected request");
        } else {
            debug!(endpoint, status = %status, "server rejected request");
        }
        status
    }
}

#[async_trait]
impl AuthBackend for AuthClient {
    fn authorize_url(&self, challenge: &LoginChallenge) -> String {
        let scope = self.config.scope_string();
        let params = [
            ("response_type", "code"),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("scope", scope.as_str()),
            ("state", challenge.state.as_str()),
            ("nonce", challenge.nonce.as_str()),
        ];

        let query_string = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}?{}", self.config.authorize_url(), query_string)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenSet, AuthError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        if let Some(secret) = self.config.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        debug!("exchanging authorization code for tokens");

        let response = self
            .http
            .post(self.config.token_url())
            .form(&form)
            .send()
            .await
            .map_err(|err| AuthError::ExchangeFailed(transport_reason("token endpoint", &err)))?;

        if !response.status().is_success() {
            let status = Self::log_oauth_error(response, "token endpoint").await;
            return Err(AuthError::ExchangeFailed(format!(
                "token endpoint returned HTTP {status}"
            )));
        }

        Self::parse_token_body(response, "token endpoint")
            .await
            .map_err(AuthError::ExchangeFailed)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, AuthError> {
        debug!("fetching user profile");

        let response = self
            .http
            .get(self.config.profile_url())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| {
                AuthError::ProfileUnavailable(transport_reason("profile endpoint", &err))
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(AuthError::Unauthorized);
        }
        if !status.is_success() {
            return Err(AuthError::ProfileUnavailable(format!(
                "profile endpoint returned HTTP {status}"
            )));
        }

        match response.json::<Envelope<UserProfile>>().await {
            Ok(envelope) => Ok(envelope.into_inner()),
            Err(err) => {
                debug!(error = %err, "profile response body malformed");
                Err(AuthError::ProfileUnavailable(
                    "profile endpoint response was malformed".to_string(),
                ))
            }
        }
    }

    async fn refresh(&self, expired_access_token: &str) -> Result<TokenSet, AuthError> {
        debug!("refreshing access token");

        let response = self
            .http
            .post(self.config.refresh_url())
            .bearer_auth(expired_access_token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|err| {
                AuthError::RefreshFailed(transport_reason("refresh endpoint", &err))
            })?;

        if !response.status().is_success() {
            let status = Self::log_oauth_error(response, "refresh endpoint").await;
            return Err(AuthError::RefreshFailed(format!(
                "refresh endpoint returned HTTP {status}"
            )));
        }

        Self::parse_token_body(response, "refresh endpoint")
            .await
            .map_err(AuthError::RefreshFailed)
    }

    async fn revoke(&self, access_token: &str) -> Result<(), AuthError> {
        debug!("revoking access token");

        let body = RevokeRequest {
            token: access_token.to_string(),
            client_id: self.config.client_id.clone(),
        };

        // Any response counts as done; only transport failures surface,
        // and the caller swallows those.
        self.http
            .post(self.config.revoke_url())
            .json(&body)
            .send()
            .await
            .map_err(|err| AuthError::RevokeFailed(transport_reason("revoke endpoint", &err)))?;

        Ok(())
    }
}

fn transport_reason(endpoint: &str, err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("{endpoint} request timed out")
    } else {
        format!("{endpoint} request failed")
    }
}
