//! Token supply for the API client
//!
//! The request guard does not speak OAuth itself; it pulls tokens through
//! the [`TokenSource`] seam. [`SessionTokenSource`] adapts the auth crate's
//! flow service, whose refresh-epoch contract is what lets N concurrent
//! 401s share a single refresh call.

use std::sync::Arc;

use async_trait::async_trait;
use lendhub_auth::client::AuthBackend;
use lendhub_auth::storage::TokenStore;
use lendhub_auth::AuthService;

/// Trait for providing access tokens to the request guard
///
/// This trait allows dependency injection and testing with mock providers.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// The current access token, if a session is established
    async fn access_token(&self) -> Option<String>;

    /// Monotonic counter bumped on every completed refresh
    ///
    /// Callers read this before sending a request; on a 401 they hand the
    /// observed value to [`TokenSource::refresh_after`] so an already
    /// completed refresh is reused instead of repeated.
    fn refresh_epoch(&self) -> u64;

    /// Obtain a usable token after a 401, sharing one refresh system-wide
    ///
    /// Returns `None` when no new token could be obtained; by then the
    /// session has been torn down and the user must sign in again.
    async fn refresh_after(&self, observed_epoch: u64) -> Option<String>;
}

/// [`TokenSource`] backed by the session lifecycle service
pub struct SessionTokenSource<B: AuthBackend + 'static, S: TokenStore + 'static> {
    auth: Arc<AuthService<B, S>>,
}

impl<B: AuthBackend + 'static, S: TokenStore + 'static> SessionTokenSource<B, S> {
    /// Wrap a shared auth service
    #[must_use]
    pub fn new(auth: Arc<AuthService<B, S>>) -> Self {
        Self { auth }
    }
}

#[async_trait]
impl<B: AuthBackend + 'static, S: TokenStore + 'static> TokenSource for SessionTokenSource<B, S> {
    async fn access_token(&self) -> Option<String> {
        self.auth.access_token().await
    }

    fn refresh_epoch(&self) -> u64 {
        self.auth.refresh_epoch()
    }

    async fn refresh_after(&self, observed_epoch: u64) -> Option<String> {
        self.auth.refresh_after(observed_epoch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Static token source: a fixed token and no refresh.
    struct StaticTokenSource {
        token: Option<String>,
    }

    impl StaticTokenSource {
        fn new(token: Option<&str>) -> Self {
            Self { token: token.map(ToString::to_string) }
        }
    }

    #[async_trait]
    impl TokenSource for StaticTokenSource {
        async fn access_token(&self) -> Option<String> {
            self.token.clone()
        }

        fn refresh_epoch(&self) -> u64 {
            0
        }

        async fn refresh_after(&self, _observed_epoch: u64) -> Option<String> {
            None
        }
    }

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticTokenSource::new(Some("tok"));
        assert_eq!(source.access_token().await.as_deref(), Some("tok"));
        assert_eq!(source.refresh_epoch(), 0);
        assert!(source.refresh_after(0).await.is_none());
    }
}
