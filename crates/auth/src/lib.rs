//! OAuth2 session lifecycle for the Lendhub platform
//!
//! This crate is the single source of truth for "who is signed in" in a
//! Lendhub client. It drives the OAuth 2.0 authorization code grant against
//! the platform's identity server, persists tokens across restarts, and
//! broadcasts every session change over a replay-latest stream.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │   AuthService    │  Flow orchestrator (login, callback, refresh, logout)
//! └────────┬─────────┘
//!          │
//!          ├──► AuthClient     (wire calls: exchange, profile, refresh, revoke)
//!          ├──► SessionStore   (watch-channel state, replay-latest subscribe)
//!          ├──► TokenStore     (persisted secrets: FileTokenStore or custom)
//!          └──► csrf           (CSPRNG state/nonce generation)
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lendhub_auth::{AuthClient, AuthConfig, AuthService, FileTokenStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AuthConfig::new(
//!         "https://auth.lendhub.example".to_string(),
//!         "https://api.lendhub.example/v1".to_string(),
//!         "your_client_id".to_string(),
//!         Some("your_client_secret".to_string()),
//!         "http://localhost:4200/callback".to_string(),
//!     );
//!
//!     let store = Arc::new(FileTokenStore::open("lendhub-tokens.json").await?);
//!     let auth = AuthService::new(AuthClient::new(config), store);
//!
//!     // Restore a previous session, if one was persisted.
//!     if !auth.initialize().await? {
//!         // Send the user's browser to the consent screen...
//!         let request = auth.begin_login().await?;
//!         println!("open this URL to sign in: {}", request.authorize_url);
//!
//!         // ...and once the redirect lands, complete the exchange.
//!         auth.handle_callback("code-from-redirect", &request.state).await?;
//!     }
//!
//!     println!("signed in: {}", auth.is_authenticated().await);
//!     Ok(())
//! }
//! ```
//!
//! # Concurrency contract
//!
//! Token refreshes are serialized: no matter how many requests observe a
//! 401 simultaneously, exactly one refresh call reaches the backend and
//! every waiter shares its outcome ([`AuthService::refresh_after`]). A
//! logout invalidates any refresh still in flight, so a late refresh
//! result can never resurrect a cleared session.

pub mod client;
pub mod config;
pub mod csrf;
pub mod error;
pub mod service;
pub mod session;
pub mod storage;
pub mod testing;
pub mod types;

// Re-export commonly used types at the crate root.
pub use client::{AuthBackend, AuthClient};
pub use config::AuthConfig;
pub use csrf::LoginChallenge;
pub use error::{AuthError, StoreError};
pub use service::{best_effort, AuthService, LoginRequest};
pub use session::{SessionPhase, SessionSnapshot, SessionStore};
pub use storage::{FileTokenStore, TokenStore};
pub use types::{TokenSet, UserProfile};
