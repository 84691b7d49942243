//! Test doubles for the auth crate
//!
//! In-memory implementations of the storage and backend seams so session
//! logic can be exercised deterministically, without platform storage or a
//! network. Also used by downstream crates' test suites.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::client::AuthBackend;
use crate::csrf::LoginChallenge;
use crate::error::{AuthError, StoreError};
use crate::storage::TokenStore;
use crate::types::{TokenSet, UserProfile};

/// In-memory secret store
///
/// Persists data only for the lifetime of the instance; clones share the
/// same underlying map, which lets a test hold a handle while the service
/// owns another.
#[derive(Clone, Debug, Default)]
pub struct MemoryTokenStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryTokenStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every stored value
    pub fn clear_all(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn set_secret(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<String, StoreError> {
        self.entries.lock().unwrap().get(key).cloned().ok_or(StoreError::NotFound)
    }

    async fn delete_secret(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn secret_exists(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }
}

/// Scripted [`AuthBackend`] that never touches the network
///
/// Each operation pops the next scripted result from its queue; an empty
/// queue yields a generic failure. Call counters let tests assert exactly
/// how many wire calls an operation performed.
#[derive(Debug, Default)]
pub struct MockAuthBackend {
    exchange_responses: Mutex<VecDeque<Result<TokenSet, AuthError>>>,
    profile_responses: Mutex<VecDeque<Result<UserProfile, AuthError>>>,
    refresh_responses: Mutex<VecDeque<Result<TokenSet, AuthError>>>,
    revoke_responses: Mutex<VecDeque<Result<(), AuthError>>>,
    refresh_delay: Mutex<Option<Duration>>,
    exchange_count: AtomicUsize,
    profile_count: AtomicUsize,
    refresh_count: AtomicUsize,
    revoke_count: AtomicUsize,
}

impl MockAuthBackend {
    /// Create a mock with empty scripts (revocation defaults to success)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a result for the next code exchange
    pub fn push_exchange(&self, result: Result<TokenSet, AuthError>) {
        self.exchange_responses.lock().unwrap().push_back(result);
    }

    /// Queue a result for the next profile fetch
    pub fn push_profile(&self, result: Result<UserProfile, AuthError>) {
        self.profile_responses.lock().unwrap().push_back(result);
    }

    /// Queue a result for the next refresh
    pub fn push_refresh(&self, result: Result<TokenSet, AuthError>) {
        self.refresh_responses.lock().unwrap().push_back(result);
    }

    /// Queue a result for the next revocation
    pub fn push_revoke(&self, result: Result<(), AuthError>) {
        self.revoke_responses.lock().unwrap().push_back(result);
    }

    /// Delay every refresh call, for exercising in-flight races
    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = Some(delay);
    }

    /// Number of code exchanges performed
    pub fn exchange_calls(&self) -> usize {
        self.exchange_count.load(Ordering::SeqCst)
    }

    /// Number of profile fetches performed
    pub fn profile_calls(&self) -> usize {
        self.profile_count.load(Ordering::SeqCst)
    }

    /// Number of refresh calls performed
    pub fn refresh_calls(&self) -> usize {
        self.refresh_count.load(Ordering::SeqCst)
    }

    /// Number of revocation calls performed
    pub fn revoke_calls(&self) -> usize {
        self.revoke_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthBackend for MockAuthBackend {
    fn authorize_url(&self, challenge: &LoginChallenge) -> String {
        format!(
            "https://auth.test.invalid/authorize?state={}&nonce={}",
            challenge.state, challenge.nonce
        )
    }

    async fn exchange_code(&self, _code: &str) -> Result<TokenSet, AuthError> {
        self.exchange_count.fetch_add(1, Ordering::SeqCst);
        self.exchange_responses.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(AuthError::ExchangeFailed("no scripted exchange response".to_string()))
        })
    }

    async fn fetch_profile(&self, _access_token: &str) -> Result<UserProfile, AuthError> {
        self.profile_count.fetch_add(1, Ordering::SeqCst);
        self.profile_responses.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(AuthError::ProfileUnavailable("no scripted profile response".to_string()))
        })
    }

    async fn refresh(&self, _expired_access_token: &str) -> Result<TokenSet, AuthError> {
        self.refresh_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.refresh_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.refresh_responses.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(AuthError::RefreshFailed("no scripted refresh response".to_string()))
        })
    }

    async fn revoke(&self, _access_token: &str) -> Result<(), AuthError> {
        self.revoke_count.fetch_add(1, Ordering::SeqCst);
        self.revoke_responses.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}
