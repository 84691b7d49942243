//! High-level session lifecycle service
//!
//! The [`AuthService`] drives the authorization code grant end to end:
//! building the login redirect, validating the callback, exchanging the
//! code, loading the profile, refreshing expired tokens, and revoking on
//! logout. It owns the [`SessionStore`] and the persisted token store, and
//! it is the only component allowed to mutate either.
//!
//! Two pieces of shared state enforce the concurrency contract:
//!
//! - a refresh gate (async mutex) serializes token refreshes so at most one
//!   refresh HTTP call is ever in flight, with an epoch counter letting
//!   late arrivals reuse the outcome of a refresh that completed while they
//!   waited;
//! - a generation counter lets `logout` invalidate any refresh still in
//!   flight, so a refresh result can never resurrect a cleared session.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::client::AuthBackend;
use crate::csrf::{validate_state, LoginChallenge};
use crate::error::{AuthError, Result, StoreError};
use crate::session::{SessionPhase, SessionSnapshot, SessionStore};
use crate::storage::{
    clear_token_set, keys, load_token_set, persist_token_set, TokenStore,
};
use crate::types::{TokenSet, UserProfile};

/// Run an operation whose failure must never propagate
///
/// Explicit policy for fire-and-forget calls (revocation on logout): the
/// failure is logged and discarded. Returns the value on success so
/// callers that do care can still look.
pub async fn best_effort<T, E, F>(operation: &str, fut: F) -> Option<T>
where
    E: std::fmt::Display,
    F: Future<Output = std::result::Result<T, E>>,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(operation, error = %err, "best-effort operation failed");
            None
        }
    }
}

/// A prepared login redirect
///
/// The embedding shell performs the actual navigation; by the time this
/// value is returned the `state` and `nonce` are already persisted.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    /// Fully-built authorization URL for the browser to visit
    pub authorize_url: String,

    /// The CSRF state embedded in the URL (also persisted)
    pub state: String,
}

/// High-level manager for the session lifecycle
///
/// Generic over the wire backend and the persistent store so both can be
/// substituted in tests.
pub struct AuthService<B: AuthBackend + 'static, S: TokenStore + 'static> {
    backend: Arc<B>,
    store: Arc<S>,
    session: SessionStore,
    refresh_gate: tokio::sync::Mutex<()>,
    refresh_epoch: AtomicU64,
    generation: AtomicU64,
}

impl<B: AuthBackend + 'static, S: TokenStore + 'static> AuthService<B, S> {
    /// Create a new service over the given backend and store
    ///
    /// The session starts anonymous; call [`AuthService::initialize`] to
    /// restore a persisted session.
    #[must_use]
    pub fn new(backend: B, store: Arc<S>) -> Self {
        Self {
            backend: Arc::new(backend),
            store,
            session: SessionStore::new(),
            refresh_gate: tokio::sync::Mutex::new(()),
            refresh_epoch: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    /// Get a handle to the session store (cheap clone, shared state)
    #[must_use]
    pub fn session(&self) -> SessionStore {
        self.session.clone()
    }

    /// Subscribe to session changes (replay-latest semantics)
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.session.subscribe()
    }

    /// Restore a persisted session at application start
    ///
    /// A persisted token optimistically marks the session authenticated
    /// pending a profile fetch, so a restarted app with a still-valid token
    /// is usable immediately.
    ///
    /// # Returns
    /// `true` if a persisted token was found
    ///
    /// # Errors
    /// Returns error only if the store itself fails; a missing token is
    /// `Ok(false)`
    pub async fn initialize(&self) -> Result<bool> {
        match load_token_set(&*self.store).await? {
            Some(tokens) => {
                self.session.update(|snapshot| {
                    snapshot.phase = SessionPhase::Authenticated;
                    snapshot.access_token = Some(tokens.access_token.clone());
                    snapshot.refresh_token = tokens.refresh_token.clone();
                });
                info!("session restored from persisted token");
                Ok(true)
            }
            None => {
                debug!("no persisted token found");
                Ok(false)
            }
        }
    }

    /// Prepare the authorization redirect
    ///
    /// Generates cryptographically random `state` and `nonce` values,
    /// persists both, and builds the authorization URL. Purely local: no
    /// network call is made.
    ///
    /// # Errors
    /// Returns error if the persisted store cannot be written
    pub async fn begin_login(&self) -> Result<LoginRequest> {
        let challenge = LoginChallenge::generate();

        self.store.set_secret(keys::OAUTH_STATE, &challenge.state).await?;
        self.store.set_secret(keys::OAUTH_NONCE, &challenge.nonce).await?;

        let authorize_url = self.backend.authorize_url(&challenge);
        info!("login redirect prepared");

        Ok(LoginRequest { authorize_url, state: challenge.state })
    }

    /// Process the authorization callback
    ///
    /// Validates the returned `state` against the persisted value, exchanges
    /// the code for tokens, persists them, and attempts a profile load. The
    /// persisted `state`/`nonce` are single-use and deleted on every
    /// outcome. On any failure the session is fully cleared, never left
    /// partially populated.
    ///
    /// Not idempotent: authorization codes are single-use on the server, so
    /// replaying a consumed code propagates the server's rejection.
    ///
    /// # Errors
    /// - [`AuthError::StateMismatch`] if the state does not match (the
    ///   backend is never contacted in that case)
    /// - [`AuthError::ExchangeFailed`] if the token endpoint rejects the
    ///   code or returns a malformed body
    pub async fn handle_callback(&self, code: &str, state: &str) -> Result<TokenSet> {
        self.session.update(|snapshot| {
            snapshot.phase = SessionPhase::ProcessingCallback;
            snapshot.is_loading = true;
        });

        let result = self.process_callback(code, state).await;

        // One-time use: drop the CSRF values no matter how it went.
        let _ = best_effort("delete oauth_state", self.store.delete_secret(keys::OAUTH_STATE)).await;
        let _ = best_effort("delete oauth_nonce", self.store.delete_secret(keys::OAUTH_NONCE)).await;

        match result {
            Ok(tokens) => {
                // Profile load is part of the happy path but its failure is
                // not a callback failure; the session stream carries any
                // expiry it uncovers.
                if let Err(err) = self.load_user_info().await {
                    debug!(error = %err, "profile load after login did not complete");
                }
                // The profile load settles the loading flag on its own exit
                // paths; only lower it here if it is somehow still raised, so
                // an error it recorded is not wiped by another update.
                if self.session.snapshot().is_loading {
                    self.session.set_loading(false);
                }
                info!("authorization callback processed");
                Ok(tokens)
            }
            Err(err) => {
                let _ = best_effort("clear persisted tokens", clear_token_set(&*self.store)).await;
                self.session.clear();
                self.session.set_error(err.to_string());
                Err(err)
            }
        }
    }

    async fn process_callback(&self, code: &str, state: &str) -> Result<TokenSet> {
        let expected = match self.store.get_secret(keys::OAUTH_STATE).await {
            Ok(value) => value,
            Err(StoreError::NotFound) => {
                debug!("callback received with no pending login");
                return Err(AuthError::StateMismatch);
            }
            Err(other) => return Err(other.into()),
        };

        if !validate_state(&expected, state) {
            debug!("callback state did not match the persisted value");
            return Err(AuthError::StateMismatch);
        }

        let tokens = self.backend.exchange_code(code).await?;
        persist_token_set(&*self.store, &tokens).await?;

        self.session.update(|snapshot| {
            snapshot.phase = SessionPhase::Authenticated;
            snapshot.access_token = Some(tokens.access_token.clone());
            snapshot.refresh_token = tokens.refresh_token.clone();
        });

        Ok(tokens)
    }

    /// Load the authenticated user's profile into the session
    ///
    /// A 401 is recovered via exactly one silent refresh and one retry; a
    /// second consecutive 401 (or a refresh failure) ends the session. Any
    /// other failure leaves the session untouched.
    ///
    /// # Errors
    /// - [`AuthError::ProfileUnavailable`] when no token is held or the
    ///   fetch fails for a non-auth reason (session unchanged)
    /// - [`AuthError::SessionExpired`] when the 401 could not be recovered
    ///   (session cleared)
    pub async fn load_user_info(&self) -> Result<UserProfile> {
        let Some(tokens) = load_token_set(&*self.store).await? else {
            return Err(AuthError::ProfileUnavailable("no access token held".to_string()));
        };

        self.session.set_loading(true);

        match self.backend.fetch_profile(&tokens.access_token).await {
            Ok(user) => {
                self.apply_profile(user.clone());
                Ok(user)
            }
            Err(AuthError::Unauthorized) => {
                debug!("profile fetch rejected with 401, attempting silent refresh");
                let Some(fresh) = self.refresh_current().await else {
                    self.expire_session().await;
                    return Err(AuthError::SessionExpired);
                };

                // Exactly one retry; a second 401 must not refresh again.
                match self.backend.fetch_profile(&fresh.access_token).await {
                    Ok(user) => {
                        self.apply_profile(user.clone());
                        Ok(user)
                    }
                    Err(err) => {
                        debug!(error = %err, "profile retry after refresh failed");
                        self.expire_session().await;
                        Err(AuthError::SessionExpired)
                    }
                }
            }
            Err(err) => {
                self.session.update(|snapshot| {
                    snapshot.is_loading = false;
                    snapshot.error = Some(err.to_string());
                });
                Err(err)
            }
        }
    }

    fn apply_profile(&self, user: UserProfile) {
        self.session.update(|snapshot| {
            snapshot.user = Some(user);
            snapshot.is_loading = false;
        });
    }

    /// Refresh the access token, serialized with all other refreshes
    ///
    /// Never fails outward: `None` uniformly means "no new token" — no
    /// token was held, the grant was rejected, or the result arrived after
    /// a logout and was discarded. Every failure path performs a full local
    /// logout so the session is never left half-updated.
    pub async fn refresh_current(&self) -> Option<TokenSet> {
        let _permit = self.refresh_gate.lock().await;
        self.refresh_locked().await
    }

    /// Refresh entry point for request-layer callers sharing one outcome
    ///
    /// `observed_epoch` is the value of [`AuthService::refresh_epoch`] the
    /// caller read before its request failed with 401. If another caller
    /// already completed a refresh since then, the current token is
    /// returned without another refresh call — this is what guarantees at
    /// most one refresh HTTP call regardless of how many requests fail
    /// simultaneously.
    pub async fn refresh_after(&self, observed_epoch: u64) -> Option<String> {
        let _permit = self.refresh_gate.lock().await;

        if self.refresh_epoch.load(Ordering::SeqCst) != observed_epoch {
            debug!("refresh already completed by another caller, reusing its outcome");
            return match load_token_set(&*self.store).await {
                Ok(tokens) => tokens.map(|t| t.access_token),
                Err(err) => {
                    warn!(error = %err, "token store read failed after shared refresh");
                    None
                }
            };
        }

        self.refresh_locked().await.map(|tokens| tokens.access_token)
    }

    /// Monotonic counter bumped on every successful refresh
    #[must_use]
    pub fn refresh_epoch(&self) -> u64 {
        self.refresh_epoch.load(Ordering::SeqCst)
    }

    async fn refresh_locked(&self) -> Option<TokenSet> {
        let generation_at_start = self.generation.load(Ordering::SeqCst);

        let current = match load_token_set(&*self.store).await {
            Ok(Some(tokens)) => tokens,
            Ok(None) => {
                debug!("refresh requested with no token held, clearing session");
                self.local_logout().await;
                return None;
            }
            Err(err) => {
                warn!(error = %err, "token store read failed before refresh");
                self.local_logout().await;
                return None;
            }
        };

        self.session.update(|snapshot| {
            snapshot.phase = SessionPhase::Refreshing;
            snapshot.is_loading = true;
        });

        let outcome = self.backend.refresh(&current.access_token).await;

        if self.generation.load(Ordering::SeqCst) != generation_at_start {
            // A logout happened while the refresh was in flight; its result
            // must not resurrect the cleared session.
            debug!("discarding refresh result that arrived after logout");
            self.session.clear();
            return None;
        }

        match outcome {
            Ok(fresh) => {
                if let Err(err) = persist_token_set(&*self.store, &fresh).await {
                    warn!(error = %err, "could not persist refreshed tokens");
                    self.local_logout().await;
                    return None;
                }

                self.refresh_epoch.fetch_add(1, Ordering::SeqCst);
                self.session.update(|snapshot| {
                    snapshot.phase = SessionPhase::Authenticated;
                    snapshot.access_token = Some(fresh.access_token.clone());
                    snapshot.refresh_token = fresh.refresh_token.clone();
                    snapshot.is_loading = false;
                });

                info!("access token refreshed");
                Some(fresh)
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed, logging out locally");
                self.local_logout().await;
                None
            }
        }
    }

    /// End the session
    ///
    /// Best-effort revocation first (its failure is swallowed — logout is a
    /// local guarantee), then the generation bump that invalidates any
    /// refresh still in flight, then persisted values and session state are
    /// cleared. Idempotent; never fails.
    pub async fn logout(&self) {
        self.session.set_loading(true);

        if let Ok(token) = self.store.get_secret(keys::ACCESS_TOKEN).await {
            let _ = best_effort("revoke token", self.backend.revoke(&token)).await;
        }

        self.generation.fetch_add(1, Ordering::SeqCst);
        self.local_logout().await;
        info!("logged out");
    }

    async fn local_logout(&self) {
        let _ = best_effort("clear persisted tokens", clear_token_set(&*self.store)).await;
        self.session.clear();
    }

    async fn expire_session(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.local_logout().await;
        self.session.set_error(AuthError::SessionExpired.to_string());
        info!("session expired");
    }

    // -- Synchronous-style reads --------------------------------------------

    /// Whether the session is usable
    ///
    /// True only if a persisted token exists AND (the session phase says
    /// authenticated OR a profile is already cached). The dual condition
    /// keeps a freshly restarted app with a persisted token authenticated
    /// before its profile fetch completes.
    pub async fn is_authenticated(&self) -> bool {
        if !self.store.secret_exists(keys::ACCESS_TOKEN).await {
            return false;
        }
        let snapshot = self.session.snapshot();
        snapshot.is_authenticated() || snapshot.user.is_some()
    }

    /// Whether a persisted access token exists
    pub async fn has_valid_token(&self) -> bool {
        self.store.secret_exists(keys::ACCESS_TOKEN).await
    }

    /// The persisted access token, if any
    pub async fn access_token(&self) -> Option<String> {
        self.store.get_secret(keys::ACCESS_TOKEN).await.ok()
    }

    /// The cached user profile, if one was loaded
    #[must_use]
    pub fn current_user(&self) -> Option<UserProfile> {
        self.session.snapshot().user
    }
}

impl<B: AuthBackend + 'static, S: TokenStore + 'static> std::fmt::Debug for AuthService<B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("refresh_epoch", &self.refresh_epoch.load(Ordering::SeqCst))
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for service.
    use super::*;
    use crate::testing::{MemoryTokenStore, MockAuthBackend};

    fn service_with(
        backend: MockAuthBackend,
    ) -> (AuthService<MockAuthBackend, MemoryTokenStore>, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::new());
        (AuthService::new(backend, store.clone()), store)
    }

    fn tokens(access: &str) -> TokenSet {
        TokenSet::new(access.to_string(), Some(format!("{access}_refresh")), 3600, None)
    }

    /// Validates `AuthService::initialize` behavior for the empty store
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `initialize()` returns `false`.
    /// - Ensures the session stays anonymous.
    #[tokio::test]
    async fn test_initialize_without_persisted_token() {
        let (service, _store) = service_with(MockAuthBackend::new());

        assert!(!service.initialize().await.unwrap());
        assert_eq!(service.session().snapshot().phase, SessionPhase::Anonymous);
        assert!(!service.is_authenticated().await);
    }

    /// Validates `AuthService::initialize` behavior for the persisted token
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `initialize()` returns `true`.
    /// - Ensures the session is optimistically authenticated before any
    ///   profile fetch.
    #[tokio::test]
    async fn test_initialize_with_persisted_token() {
        let (service, store) = service_with(MockAuthBackend::new());
        persist_token_set(&*store, &tokens("persisted")).await.unwrap();

        assert!(service.initialize().await.unwrap());

        let snapshot = service.session().snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Authenticated);
        assert_eq!(snapshot.access_token.as_deref(), Some("persisted"));
        assert!(service.is_authenticated().await);
    }

    /// Validates `AuthService::begin_login` behavior for the redirect
    /// preparation scenario.
    ///
    /// Assertions:
    /// - Ensures the persisted `oauth_state` equals the returned state.
    /// - Ensures a nonce was persisted.
    /// - Ensures the authorization URL embeds the state.
    #[tokio::test]
    async fn test_begin_login_persists_csrf_values() {
        let (service, store) = service_with(MockAuthBackend::new());

        let request = service.begin_login().await.unwrap();

        assert_eq!(store.get_secret(keys::OAUTH_STATE).await.unwrap(), request.state);
        assert!(store.secret_exists(keys::OAUTH_NONCE).await);
        assert!(request.authorize_url.contains(&request.state));
    }

    /// Validates that a callback without any pending login fails closed.
    #[tokio::test]
    async fn test_callback_without_pending_login() {
        let backend = MockAuthBackend::new();
        backend.push_exchange(Ok(tokens("should_not_be_used")));
        let (service, _store) = service_with(backend);

        let result = service.handle_callback("code", "state").await;

        assert!(matches!(result, Err(AuthError::StateMismatch)));
        assert_eq!(service.backend.exchange_calls(), 0);
        assert!(!service.is_authenticated().await);
    }

    /// Validates `AuthService::logout` behavior for the idempotency
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures a double logout does not panic and leaves the state
    ///   fully cleared.
    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let (service, store) = service_with(MockAuthBackend::new());
        persist_token_set(&*store, &tokens("tok")).await.unwrap();
        service.initialize().await.unwrap();

        service.logout().await;
        service.logout().await;

        let snapshot = service.session().snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Anonymous);
        assert!(snapshot.access_token.is_none());
        assert!(!snapshot.is_loading);
        assert!(!store.secret_exists(keys::ACCESS_TOKEN).await);
    }

    /// Validates `AuthService::refresh_after` behavior for the shared
    /// outcome scenario: a caller with a stale epoch reuses the completed
    /// refresh instead of issuing its own.
    ///
    /// Assertions:
    /// - Confirms exactly one backend refresh call happens.
    /// - Confirms both callers end up with the same new token.
    #[tokio::test]
    async fn test_refresh_after_reuses_completed_refresh() {
        let backend = MockAuthBackend::new();
        backend.push_refresh(Ok(tokens("tok_new")));
        let (service, store) = service_with(backend);
        persist_token_set(&*store, &tokens("tok_old")).await.unwrap();
        service.initialize().await.unwrap();

        let observed = service.refresh_epoch();

        let first = service.refresh_after(observed).await;
        assert_eq!(first.as_deref(), Some("tok_new"));

        // Same stale epoch again: the completed refresh is reused.
        let second = service.refresh_after(observed).await;
        assert_eq!(second.as_deref(), Some("tok_new"));

        assert_eq!(service.backend.refresh_calls(), 1);
    }

    /// Validates `AuthService::refresh_current` behavior for the missing
    /// token scenario: local logout without any network call.
    #[tokio::test]
    async fn test_refresh_without_token_logs_out_locally() {
        let (service, _store) = service_with(MockAuthBackend::new());

        assert!(service.refresh_current().await.is_none());
        assert_eq!(service.backend.refresh_calls(), 0);
        assert_eq!(service.session().snapshot().phase, SessionPhase::Anonymous);
    }

    /// Validates the refresh failure scenario: full local logout, `None`
    /// returned, nothing half-updated.
    #[tokio::test]
    async fn test_refresh_failure_clears_session() {
        let backend = MockAuthBackend::new();
        backend.push_refresh(Err(AuthError::RefreshFailed(
            "refresh endpoint returned HTTP 400".to_string(),
        )));
        let (service, store) = service_with(backend);
        persist_token_set(&*store, &tokens("tok_old")).await.unwrap();
        service.initialize().await.unwrap();

        assert!(service.refresh_current().await.is_none());

        assert!(!store.secret_exists(keys::ACCESS_TOKEN).await);
        let snapshot = service.session().snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Anonymous);
        assert!(!snapshot.is_loading);
    }

    /// Validates the logout-during-refresh race: a refresh result arriving
    /// after logout is discarded instead of resurrecting the session.
    ///
    /// Assertions:
    /// - Ensures the late refresh returns `None`.
    /// - Ensures no token is re-persisted after logout cleared the store.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_logout_invalidates_inflight_refresh() {
        let backend = MockAuthBackend::new();
        backend.push_refresh(Ok(tokens("tok_late")));
        backend.set_refresh_delay(std::time::Duration::from_millis(100));
        let (service, store) = service_with(backend);
        persist_token_set(&*store, &tokens("tok_old")).await.unwrap();
        service.initialize().await.unwrap();

        let service = Arc::new(service);
        let refresher = {
            let service = service.clone();
            tokio::spawn(async move { service.refresh_current().await })
        };

        // Let the refresh reach its backend call, then log out under it.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        service.logout().await;

        let outcome = refresher.await.unwrap();
        assert!(outcome.is_none());
        assert!(!store.secret_exists(keys::ACCESS_TOKEN).await);
        assert_eq!(service.session().snapshot().phase, SessionPhase::Anonymous);
    }

    /// Validates `best_effort` behavior for both outcomes.
    #[tokio::test]
    async fn test_best_effort_swallows_failure() {
        let ok: Option<u32> = best_effort("works", async { Ok::<_, AuthError>(7) }).await;
        assert_eq!(ok, Some(7));

        let swallowed: Option<u32> =
            best_effort("fails", async { Err::<u32, _>(AuthError::NotAuthenticated) }).await;
        assert!(swallowed.is_none());
    }
}
