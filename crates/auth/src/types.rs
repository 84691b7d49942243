//! OAuth 2.0 types and wire structures
//!
//! Defines the token, profile, and error shapes exchanged with the Lendhub
//! backend. The backend wraps some responses in a `{"data": ...}` envelope
//! and some not; [`Envelope`] absorbs both forms.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OAuth 2.0 access and refresh tokens with metadata
///
/// The refresh token is optional because the backend does not always issue
/// one (token refresh is also supported by presenting the expired access
/// token itself, see the flow service). Expiry is tracked in memory only;
/// the persisted store deliberately carries no expiry metadata, so tokens
/// loaded from storage have `expires_at = None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    /// Bearer access token for API authentication
    pub access_token: String,

    /// Refresh token for obtaining new access tokens, when issued
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token type (always "Bearer" for OAuth 2.0)
    pub token_type: String,

    /// Access token lifetime in seconds (0 when the server did not say)
    pub expires_in: i64,

    /// Absolute expiration timestamp, calculated from `expires_in` at
    /// token creation time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Granted scopes (space-separated)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenSet {
    /// Create a new `TokenSet` with a calculated expiration timestamp
    ///
    /// # Arguments
    /// * `access_token` - The access token
    /// * `refresh_token` - Optional refresh token
    /// * `expires_in` - Token lifetime in seconds (0 = unknown)
    /// * `scope` - Optional space-separated scopes
    #[must_use]
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: i64,
        scope: Option<String>,
    ) -> Self {
        let expires_at = if expires_in > 0 {
            Some(Utc::now() + chrono::Duration::seconds(expires_in))
        } else {
            None
        };

        Self {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
            expires_at,
            scope,
        }
    }

    /// Check if the access token is expired or will expire within the given
    /// threshold
    ///
    /// Returns `false` when no expiry is known; the server's 401 response is
    /// the source of truth in that case.
    #[must_use]
    pub fn is_expired(&self, threshold_seconds: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                let threshold = chrono::Duration::seconds(threshold_seconds);
                Utc::now() + threshold >= expires_at
            }
            None => false,
        }
    }

    /// Get seconds until token expiration, or `None` if no expiry is known
    #[must_use]
    pub fn seconds_until_expiry(&self) -> Option<i64> {
        self.expires_at.map(|expires_at| (expires_at - Utc::now()).num_seconds())
    }
}

/// OAuth token response from the backend's token and refresh endpoints
///
/// Standard OAuth 2.0 token response format (RFC 6749). Only `access_token`
/// is mandatory: the refresh endpoint omits `token_type`/`expires_in` at
/// times, and a missing `access_token` must fail deserialization so the
/// caller can treat the body as malformed.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl From<TokenResponse> for TokenSet {
    fn from(response: TokenResponse) -> Self {
        let mut tokens = Self::new(
            response.access_token,
            response.refresh_token,
            response.expires_in.unwrap_or(0),
            response.scope,
        );
        if let Some(token_type) = response.token_type {
            tokens.token_type = token_type;
        }
        tokens
    }
}

/// Response envelope used inconsistently by the backend
///
/// Some endpoints return the payload bare, others wrap it as
/// `{"data": ...}`. Deserialize through this and call
/// [`Envelope::into_inner`] to get the payload either way.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    /// Payload wrapped in a `data` field
    Wrapped {
        /// The wrapped payload
        data: T,
    },
    /// Payload returned bare
    Bare(T),
}

impl<T> Envelope<T> {
    /// Unwrap the payload regardless of envelope form
    pub fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}

/// Authenticated user record from the profile endpoint
///
/// The backend predates this SDK and speaks Spanish on the wire
/// (`nombre`/`apellido`); serde aliases accept both the legacy and the
/// current field names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    /// Backend user id
    pub id: i64,

    /// Display / given name
    #[serde(alias = "nombre")]
    pub name: String,

    /// Family name, when present
    #[serde(default, alias = "apellido")]
    pub surname: Option<String>,

    /// Email address, when present
    #[serde(default)]
    pub email: Option<String>,

    /// Role names granted to the user
    #[serde(default)]
    pub roles: Vec<String>,
}

/// OAuth error response from the authorization server
///
/// Standard OAuth 2.0 error response format (RFC 6749 §5.2). Only ever
/// logged at diagnostic level; user-facing messages stay generic.
#[derive(Debug, Deserialize)]
pub struct OAuthError {
    pub error: String,
    pub error_description: Option<String>,
}

impl fmt::Display for OAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(desc) => write!(f, "{}: {}", self.error, desc),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for OAuthError {}

/// Body of the token revocation request
#[derive(Debug, Serialize)]
pub struct RevokeRequest {
    /// The token being invalidated
    pub token: String,
    /// The OAuth client id
    pub client_id: String,
}
