//! Authentication configuration
//!
//! Static configuration for the OAuth2 flow plus a loader that follows the
//! usual strategy: environment variables first (a `.env` file is honored),
//! then a TOML file probed from a handful of conventional locations.
//!
//! ## Environment Variables
//! - `LENDHUB_AUTH_URL`: Authorization server base URL
//! - `LENDHUB_API_URL`: Backend API base URL (token/profile/refresh/revoke)
//! - `LENDHUB_CLIENT_ID`: OAuth client id
//! - `LENDHUB_CLIENT_SECRET`: OAuth client secret (optional)
//! - `LENDHUB_REDIRECT_URI`: Registered redirect URI
//! - `LENDHUB_SCOPES`: Space-separated scopes (optional)
//! - `LENDHUB_HTTP_TIMEOUT_SECS`: Per-request timeout (optional, default 30)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::AuthError;

/// Default per-request HTTP timeout in seconds
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Default scopes requested during authorization
const DEFAULT_SCOPES: &[&str] = &["openid", "profile"];

/// Static configuration for the OAuth2 authorization code flow
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Authorization server base URL (hosts the consent screen)
    pub auth_base_url: String,

    /// Backend API base URL (hosts token, profile, refresh, revoke)
    pub api_base_url: String,

    /// OAuth client id
    pub client_id: String,

    /// OAuth client secret (confidential client)
    pub client_secret: Option<String>,

    /// Redirect URI registered with the authorization server
    pub redirect_uri: String,

    /// Scopes to request
    pub scopes: Vec<String>,

    /// Timeout applied to every network call made by the flow coordinator
    pub http_timeout: Duration,
}

impl AuthConfig {
    /// Create a configuration with the default scopes and timeout
    #[must_use]
    pub fn new(
        auth_base_url: String,
        api_base_url: String,
        client_id: String,
        client_secret: Option<String>,
        redirect_uri: String,
    ) -> Self {
        Self {
            auth_base_url,
            api_base_url,
            client_id,
            client_secret,
            redirect_uri,
            scopes: DEFAULT_SCOPES.iter().map(ToString::to_string).collect(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }

    /// The authorization (consent) endpoint
    #[must_use]
    pub fn authorize_url(&self) -> String {
        format!("{}/authorize", self.auth_base_url)
    }

    /// The code-for-tokens exchange endpoint
    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.api_base_url)
    }

    /// The authenticated user profile endpoint
    #[must_use]
    pub fn profile_url(&self) -> String {
        format!("{}/me", self.api_base_url)
    }

    /// The token refresh endpoint
    #[must_use]
    pub fn refresh_url(&self) -> String {
        format!("{}/oauth/refresh", self.api_base_url)
    }

    /// The token revocation endpoint
    #[must_use]
    pub fn revoke_url(&self) -> String {
        format!("{}/oauth/revoke", self.api_base_url)
    }

    /// Scopes as a space-separated string
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variable is missing, falls back to probing for a config file.
///
/// # Errors
/// Returns `AuthError::Config` if neither source yields a complete
/// configuration.
pub fn load() -> Result<AuthConfig, AuthError> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("auth configuration loaded from environment");
            Ok(config)
        }
        Err(err) => {
            tracing::debug!(error = %err, "environment configuration incomplete, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// A `.env` file in the working directory is read first, if present.
///
/// # Errors
/// Returns `AuthError::Config` if a required variable is missing or
/// malformed.
pub fn load_from_env() -> Result<AuthConfig, AuthError> {
    let _ = dotenvy::dotenv();

    let auth_base_url = env_var("LENDHUB_AUTH_URL")?;
    let api_base_url = env_var("LENDHUB_API_URL")?;
    let client_id = env_var("LENDHUB_CLIENT_ID")?;
    let client_secret = std::env::var("LENDHUB_CLIENT_SECRET").ok();
    let redirect_uri = env_var("LENDHUB_REDIRECT_URI")?;

    let scopes = std::env::var("LENDHUB_SCOPES")
        .map(|raw| raw.split_whitespace().map(ToString::to_string).collect())
        .unwrap_or_else(|_| DEFAULT_SCOPES.iter().map(ToString::to_string).collect());

    let http_timeout = match std::env::var("LENDHUB_HTTP_TIMEOUT_SECS") {
        Ok(raw) => {
            let secs: u64 = raw
                .parse()
                .map_err(|e| AuthError::Config(format!("Invalid HTTP timeout: {e}")))?;
            Duration::from_secs(secs)
        }
        Err(_) => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
    };

    Ok(AuthConfig {
        auth_base_url,
        api_base_url,
        client_id,
        client_secret,
        redirect_uri,
        scopes,
        http_timeout,
    })
}

/// Load configuration from a TOML file
///
/// If `path` is `None`, probes `config.toml` and `lendhub.toml` in the
/// working directory and its parent.
///
/// # Errors
/// Returns `AuthError::Config` if no file is found or the file does not
/// parse.
pub fn load_from_file(path: Option<&Path>) -> Result<AuthConfig, AuthError> {
    let path = match path {
        Some(explicit) => explicit.to_path_buf(),
        None => probe_config_paths()
            .ok_or_else(|| AuthError::Config("No configuration file found".to_string()))?,
    };

    let raw = std::fs::read_to_string(&path)
        .map_err(|e| AuthError::Config(format!("Cannot read {}: {e}", path.display())))?;

    let config = parse_toml(&raw)?;
    tracing::info!(path = %path.display(), "auth configuration loaded from file");
    Ok(config)
}

/// Locate a config file in the conventional places
#[must_use]
pub fn probe_config_paths() -> Option<PathBuf> {
    const CANDIDATES: &[&str] =
        &["config.toml", "lendhub.toml", "../config.toml", "../lendhub.toml"];

    CANDIDATES.iter().map(PathBuf::from).find(|candidate| candidate.is_file())
}

/// On-disk configuration shape (the `[auth]` table of the config file)
#[derive(Debug, Deserialize)]
struct FileConfig {
    auth: FileAuthSection,
}

#[derive(Debug, Deserialize)]
struct FileAuthSection {
    auth_url: String,
    api_url: String,
    client_id: String,
    #[serde(default)]
    client_secret: Option<String>,
    redirect_uri: String,
    #[serde(default)]
    scopes: Option<Vec<String>>,
    #[serde(default)]
    http_timeout_secs: Option<u64>,
}

fn parse_toml(raw: &str) -> Result<AuthConfig, AuthError> {
    let file: FileConfig =
        toml::from_str(raw).map_err(|e| AuthError::Config(format!("Invalid config file: {e}")))?;

    let section = file.auth;
    Ok(AuthConfig {
        auth_base_url: section.auth_url,
        api_base_url: section.api_url,
        client_id: section.client_id,
        client_secret: section.client_secret,
        redirect_uri: section.redirect_uri,
        scopes: section
            .scopes
            .unwrap_or_else(|| DEFAULT_SCOPES.iter().map(ToString::to_string).collect()),
        http_timeout: Duration::from_secs(
            section.http_timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
        ),
    })
}

fn env_var(name: &str) -> Result<String, AuthError> {
    std::env::var(name)
        .map_err(|_| AuthError::Config(format!("Missing environment variable: {name}")))
}
