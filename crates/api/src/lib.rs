//! Authenticated API client for the Lendhub backend
//!
//! Every call to the backend goes through the [`ApiClient`] request guard,
//! which attaches the session's bearer token and recovers transparently
//! from token expiry: a 401 triggers one shared token refresh (serialized
//! with every other refresh in the process) and one replay of the original
//! request. Server failures map onto a small error taxonomy with retry
//! metadata so callers can decide what to do next.
//!
//! # Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lendhub_api::{ApiClient, ApiClientConfig, SessionTokenSource};
//! use lendhub_auth::{AuthClient, AuthConfig, AuthService, FileTokenStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::new(
//!     "https://auth.lendhub.example".to_string(),
//!     "https://api.lendhub.example/v1".to_string(),
//!     "client_id".to_string(),
//!     None,
//!     "http://localhost:4200/callback".to_string(),
//! );
//! let store = Arc::new(FileTokenStore::open("lendhub-tokens.json").await?);
//! let auth = Arc::new(AuthService::new(AuthClient::new(config), store));
//!
//! let api = ApiClient::builder()
//!     .config(ApiClientConfig {
//!         base_url: "https://api.lendhub.example/v1".to_string(),
//!         ..Default::default()
//!     })
//!     .source(Arc::new(SessionTokenSource::new(auth)))
//!     .build()?;
//!
//! let tools: serde_json::Value = api.get("/tools").await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod errors;

// Re-export commonly used types at the crate root.
pub use auth::{SessionTokenSource, TokenSource};
pub use client::{ApiClient, ApiClientBuilder, ApiClientConfig};
pub use errors::{ApiError, ApiErrorCategory};
