//! Session state store
//!
//! Single source of truth for the current session, broadcast over a watch
//! channel: new subscribers immediately observe the latest snapshot, then
//! every subsequent update (replay-latest semantics). The tagged
//! [`SessionPhase`] replaces the scattered boolean flags of the original
//! dashboard so contradictory flag combinations cannot be represented.

use std::sync::Arc;

use tokio::sync::watch;

use crate::types::UserProfile;

/// Phase of the session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No valid token known
    Anonymous,
    /// An authorization code is being exchanged for tokens
    ProcessingCallback,
    /// A token is held and the session is usable
    Authenticated,
    /// The token expired and a silent refresh is in flight
    Refreshing,
}

/// Immutable view of the session at one point in time
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Current lifecycle phase
    pub phase: SessionPhase,

    /// Profile record fetched from the backend; `None` until the first
    /// successful fetch
    pub user: Option<UserProfile>,

    /// Current bearer access token (mirrors the persisted value)
    pub access_token: Option<String>,

    /// Refresh token, if the backend issued one
    pub refresh_token: Option<String>,

    /// True while any auth operation (bootstrap, callback, refresh, logout)
    /// is in flight
    pub is_loading: bool,

    /// Last error message; cleared on every successful update
    pub error: Option<String>,
}

impl SessionSnapshot {
    /// True when the phase implies a usable session (a refresh in flight
    /// still counts: the previous session is not torn down unless the
    /// refresh fails)
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self.phase, SessionPhase::Authenticated | SessionPhase::Refreshing)
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Anonymous,
            user: None,
            access_token: None,
            refresh_token: None,
            is_loading: false,
            error: None,
        }
    }
}

/// Thread-safe session state store with replay-latest subscriptions
///
/// Cloning the store is cheap and every clone observes and mutates the same
/// underlying state. Mutation goes through [`SessionStore::update`], the
/// single entry point, which always clears the previous error.
#[derive(Clone, Debug)]
pub struct SessionStore {
    sender: Arc<watch::Sender<SessionSnapshot>>,
    receiver: watch::Receiver<SessionSnapshot>,
}

impl SessionStore {
    /// Create a new store in the default (anonymous) state
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(SessionSnapshot::default());
        Self { sender: Arc::new(sender), receiver }
    }

    /// Get the current snapshot (synchronous read, no side effects)
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.receiver.borrow().clone()
    }

    /// Subscribe to session changes
    ///
    /// The returned receiver holds the current snapshot immediately
    /// (`borrow()`), and `changed().await` resolves for every later update.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.receiver.clone()
    }

    /// Apply a mutation to the current snapshot and broadcast the result
    ///
    /// The previous error is always cleared before `f` runs, so a
    /// successful state transition wipes stale errors; an operation that
    /// wants to record an error sets it inside `f` (or via
    /// [`SessionStore::set_error`]).
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut SessionSnapshot),
    {
        self.sender.send_modify(|snapshot| {
            snapshot.error = None;
            f(snapshot);
        });
    }

    /// Raise or lower the loading flag
    pub fn set_loading(&self, loading: bool) {
        self.update(|snapshot| snapshot.is_loading = loading);
    }

    /// Record an error message
    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|snapshot| snapshot.error = Some(message));
    }

    /// Reset every field to its default (anonymous, nothing loaded)
    pub fn clear(&self) {
        self.sender.send_modify(|snapshot| *snapshot = SessionSnapshot::default());
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for session.
    use super::*;

    /// Validates the default snapshot scenario.
    ///
    /// Assertions:
    /// - Confirms `snapshot.phase` equals `SessionPhase::Anonymous`.
    /// - Ensures `!snapshot.is_authenticated()` evaluates to true.
    /// - Ensures `!snapshot.is_loading` evaluates to true.
    #[test]
    fn test_default_snapshot() {
        let store = SessionStore::new();
        let snapshot = store.snapshot();

        assert_eq!(snapshot.phase, SessionPhase::Anonymous);
        assert!(!snapshot.is_authenticated());
        assert!(!snapshot.is_loading);
        assert!(snapshot.user.is_none());
        assert!(snapshot.access_token.is_none());
        assert!(snapshot.error.is_none());
    }

    /// Validates `SessionStore::update` behavior for the error reset
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures the error is visible after `set_error`.
    /// - Ensures a later successful update clears it.
    #[test]
    fn test_update_clears_previous_error() {
        let store = SessionStore::new();

        store.set_error("something failed");
        assert_eq!(store.snapshot().error.as_deref(), Some("something failed"));

        store.update(|snapshot| snapshot.phase = SessionPhase::Authenticated);
        assert!(store.snapshot().error.is_none());
        assert_eq!(store.snapshot().phase, SessionPhase::Authenticated);
    }

    /// Validates the replay-latest subscription scenario.
    ///
    /// Assertions:
    /// - Ensures a new subscriber sees the current value immediately.
    /// - Ensures the subscriber observes subsequent updates.
    #[tokio::test]
    async fn test_subscribe_replays_latest() {
        let store = SessionStore::new();
        store.update(|snapshot| snapshot.phase = SessionPhase::Authenticated);

        // Subscriber created after the update still sees it.
        let mut receiver = store.subscribe();
        assert_eq!(receiver.borrow().phase, SessionPhase::Authenticated);

        store.update(|snapshot| snapshot.phase = SessionPhase::Refreshing);
        receiver.changed().await.unwrap();
        assert_eq!(receiver.borrow().phase, SessionPhase::Refreshing);
    }

    /// Validates `SessionStore::clear` behavior for the full reset scenario.
    #[test]
    fn test_clear_resets_everything() {
        let store = SessionStore::new();
        store.update(|snapshot| {
            snapshot.phase = SessionPhase::Authenticated;
            snapshot.access_token = Some("tok".to_string());
            snapshot.is_loading = true;
        });

        store.clear();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Anonymous);
        assert!(snapshot.access_token.is_none());
        assert!(!snapshot.is_loading);
    }

    /// Validates that clones share the same underlying state.
    #[test]
    fn test_clones_share_state() {
        let store = SessionStore::new();
        let clone = store.clone();

        store.update(|snapshot| snapshot.phase = SessionPhase::Authenticated);
        assert_eq!(clone.snapshot().phase, SessionPhase::Authenticated);
    }

    /// Validates that a refreshing session still counts as authenticated.
    #[test]
    fn test_refreshing_counts_as_authenticated() {
        let store = SessionStore::new();
        store.update(|snapshot| snapshot.phase = SessionPhase::Refreshing);
        assert!(store.snapshot().is_authenticated());
    }
}
