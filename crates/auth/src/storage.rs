//! Persistent token storage
//!
//! The session outlives the process through a small key-value secret store
//! with four fixed keys. The store deliberately carries no expiry metadata:
//! token expiry is discovered by the server rejecting the token with 401,
//! so a `TokenSet` loaded from storage has an unknown expiry.
//!
//! The [`TokenStore`] trait is the seam for alternative backends (a
//! platform keychain, for instance); the shipped implementation is a flat
//! JSON file written atomically. A single process is assumed to own the
//! file; there is no cross-process locking.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StoreError;
use crate::types::TokenSet;

/// Fixed keys used in the persistent store
pub mod keys {
    /// The bearer access token
    pub const ACCESS_TOKEN: &str = "access_token";
    /// The refresh token, when the backend issued one
    pub const REFRESH_TOKEN: &str = "refresh_token";
    /// CSRF `state` written before the authorization redirect
    pub const OAUTH_STATE: &str = "oauth_state";
    /// Replay-protection `nonce` written before the authorization redirect
    pub const OAUTH_NONCE: &str = "oauth_nonce";
}

/// Trait for persistent secret storage
///
/// Abstracts credential storage to enable testing with in-memory
/// implementations and to support different storage backends.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Store a secret value under a key
    ///
    /// # Errors
    /// Returns error if the value cannot be written
    async fn set_secret(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Retrieve a secret value
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if nothing is stored under `key`
    async fn get_secret(&self, key: &str) -> Result<String, StoreError>;

    /// Delete a secret value (idempotent: deleting a missing key succeeds)
    ///
    /// # Errors
    /// Returns error only if the deletion cannot be persisted
    async fn delete_secret(&self, key: &str) -> Result<(), StoreError>;

    /// Determine whether a secret exists
    async fn secret_exists(&self, key: &str) -> bool;
}

// ---------------------------------------------------------------------------
// Token helpers layered on the generic store
// ---------------------------------------------------------------------------

/// Persist a token set under the fixed keys
///
/// The refresh-token key is removed when the new set carries none, so a
/// stale refresh token can never outlive the grant that issued it.
///
/// # Errors
/// Returns error if the underlying store fails
pub async fn persist_token_set<S: TokenStore + ?Sized>(
    store: &S,
    tokens: &TokenSet,
) -> Result<(), StoreError> {
    store.set_secret(keys::ACCESS_TOKEN, &tokens.access_token).await?;

    match &tokens.refresh_token {
        Some(refresh) => store.set_secret(keys::REFRESH_TOKEN, refresh).await?,
        None => store.delete_secret(keys::REFRESH_TOKEN).await?,
    }

    debug!("persisted token set");
    Ok(())
}

/// Load the persisted token set, if any
///
/// Expiry metadata is not persisted, so the returned set reports no
/// expiry; the server's 401 is the source of truth after a restart.
///
/// # Errors
/// Returns error if the underlying store fails (a missing token is
/// `Ok(None)`, not an error)
pub async fn load_token_set<S: TokenStore + ?Sized>(
    store: &S,
) -> Result<Option<TokenSet>, StoreError> {
    let access_token = match store.get_secret(keys::ACCESS_TOKEN).await {
        Ok(value) => value,
        Err(StoreError::NotFound) => return Ok(None),
        Err(other) => return Err(other),
    };

    let refresh_token = match store.get_secret(keys::REFRESH_TOKEN).await {
        Ok(value) => Some(value),
        Err(StoreError::NotFound) => None,
        Err(other) => return Err(other),
    };

    Ok(Some(TokenSet::new(access_token, refresh_token, 0, None)))
}

/// Delete every persisted session value (tokens and pending CSRF values)
///
/// # Errors
/// Returns error if the underlying store fails
pub async fn clear_token_set<S: TokenStore + ?Sized>(store: &S) -> Result<(), StoreError> {
    store.delete_secret(keys::ACCESS_TOKEN).await?;
    store.delete_secret(keys::REFRESH_TOKEN).await?;
    store.delete_secret(keys::OAUTH_STATE).await?;
    store.delete_secret(keys::OAUTH_NONCE).await?;

    debug!("cleared persisted session values");
    Ok(())
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// Secret store persisted as a flat JSON object in a single file
///
/// Writes go to a temporary sibling file first and are renamed into place,
/// so a crash mid-write cannot corrupt the store. The full map is held in
/// memory behind a mutex; the file is the durable mirror.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileTokenStore {
    /// Open a store at the given path, loading any existing contents
    ///
    /// The file is created lazily on the first write; a missing file is an
    /// empty store.
    ///
    /// # Errors
    /// Returns error if an existing file cannot be read or parsed
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(StoreError::Io(err.to_string())),
        };

        Ok(Self { path, entries: Mutex::new(entries) })
    }

    async fn flush(&self, entries: &HashMap<String, String>) -> Result<(), StoreError> {
        let payload = serde_json::to_vec_pretty(entries)?;

        // Write-then-rename keeps the store readable if we crash mid-write.
        let temp_path =
            self.path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));

        tokio::fs::write(&temp_path, payload)
            .await
            .map_err(|err| StoreError::Io(err.to_string()))?;

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|err| StoreError::Io(err.to_string()))
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn set_secret(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries).await
    }

    async fn get_secret(&self, key: &str) -> Result<String, StoreError> {
        let entries = self.entries.lock().await;
        entries.get(key).cloned().ok_or(StoreError::NotFound)
    }

    async fn delete_secret(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.flush(&entries).await?;
        }
        Ok(())
    }

    async fn secret_exists(&self, key: &str) -> bool {
        self.entries.lock().await.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for storage.
    use super::*;
    use crate::testing::MemoryTokenStore;

    fn sample_tokens() -> TokenSet {
        TokenSet::new("test_access".to_string(), Some("test_refresh".to_string()), 3600, None)
    }

    /// Validates the store and load roundtrip scenario.
    ///
    /// Assertions:
    /// - Confirms the loaded access token equals the stored one.
    /// - Confirms the loaded refresh token equals the stored one.
    /// - Ensures the loaded set reports no expiry.
    #[tokio::test]
    async fn test_persist_and_load_roundtrip() {
        let store = MemoryTokenStore::new();
        let tokens = sample_tokens();

        persist_token_set(&store, &tokens).await.unwrap();
        let loaded = load_token_set(&store).await.unwrap().unwrap();

        assert_eq!(loaded.access_token, "test_access");
        assert_eq!(loaded.refresh_token.as_deref(), Some("test_refresh"));
        assert!(loaded.expires_at.is_none());
    }

    /// Validates that persisting a set without a refresh token removes any
    /// previously stored refresh token.
    #[tokio::test]
    async fn test_persist_removes_stale_refresh_token() {
        let store = MemoryTokenStore::new();
        persist_token_set(&store, &sample_tokens()).await.unwrap();

        let without_refresh = TokenSet::new("new_access".to_string(), None, 0, None);
        persist_token_set(&store, &without_refresh).await.unwrap();

        let loaded = load_token_set(&store).await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "new_access");
        assert!(loaded.refresh_token.is_none());
    }

    /// Validates the load with nothing stored scenario.
    #[tokio::test]
    async fn test_load_empty_store() {
        let store = MemoryTokenStore::new();
        assert!(load_token_set(&store).await.unwrap().is_none());
    }

    /// Validates `clear_token_set` behavior across all fixed keys.
    #[tokio::test]
    async fn test_clear_removes_all_keys() {
        let store = MemoryTokenStore::new();
        persist_token_set(&store, &sample_tokens()).await.unwrap();
        store.set_secret(keys::OAUTH_STATE, "abc123").await.unwrap();
        store.set_secret(keys::OAUTH_NONCE, "def456").await.unwrap();

        clear_token_set(&store).await.unwrap();

        assert!(!store.secret_exists(keys::ACCESS_TOKEN).await);
        assert!(!store.secret_exists(keys::REFRESH_TOKEN).await);
        assert!(!store.secret_exists(keys::OAUTH_STATE).await);
        assert!(!store.secret_exists(keys::OAUTH_NONCE).await);
    }

    /// Validates the file store roundtrip across a reopen (simulated
    /// restart).
    ///
    /// Assertions:
    /// - Confirms a value written before the reopen is readable after it.
    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        {
            let store = FileTokenStore::open(&path).await.unwrap();
            store.set_secret(keys::ACCESS_TOKEN, "tok1").await.unwrap();
        }

        let reopened = FileTokenStore::open(&path).await.unwrap();
        assert_eq!(reopened.get_secret(keys::ACCESS_TOKEN).await.unwrap(), "tok1");
    }

    /// Validates the file store delete is idempotent scenario.
    #[tokio::test]
    async fn test_file_store_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::open(dir.path().join("tokens.json")).await.unwrap();

        store.delete_secret("missing").await.unwrap();

        store.set_secret("present", "value").await.unwrap();
        store.delete_secret("present").await.unwrap();
        store.delete_secret("present").await.unwrap();

        assert!(matches!(store.get_secret("present").await, Err(StoreError::NotFound)));
    }

    /// Validates the missing file is an empty store scenario.
    #[tokio::test]
    async fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::open(dir.path().join("nonexistent.json")).await.unwrap();

        assert!(matches!(store.get_secret("anything").await, Err(StoreError::NotFound)));
        assert!(!store.secret_exists("anything").await);
    }
}
