//! Error types for the auth crate
//!
//! `Display` output is the user-safe message: deliberately generic, never
//! carrying token, state, or nonce values, and never echoing raw backend
//! bodies. Diagnostic detail belongs in `tracing` output at the failure
//! site, not in these messages.

use std::fmt;

/// Error type for persistent token storage operations
#[derive(Debug)]
pub enum StoreError {
    /// No value stored under the requested key
    NotFound,

    /// Underlying I/O failure (file read/write/rename)
    Io(String),

    /// Stored payload could not be serialized or deserialized
    Serialization(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "Secret not found"),
            Self::Io(msg) => write!(f, "Storage I/O error: {msg}"),
            Self::Serialization(msg) => write!(f, "Storage serialization error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Error type for authentication flow operations
///
/// Variants that wrap a `String` carry a short internal reason (an HTTP
/// status, a parse failure) that is safe to show; they never contain
/// credentials or raw response bodies.
#[derive(Debug)]
pub enum AuthError {
    /// The `state` received on callback did not match the persisted value,
    /// or no login was pending. Fatal to the login attempt.
    StateMismatch,

    /// The authorization code exchange failed (rejected code, malformed
    /// response, transport failure)
    ExchangeFailed(String),

    /// The backend rejected the presented access token (HTTP 401)
    Unauthorized,

    /// The user profile could not be retrieved for a reason other than an
    /// expired token; the session is left untouched
    ProfileUnavailable(String),

    /// The token refresh grant failed; the local session has been cleared
    RefreshFailed(String),

    /// The revocation request could not reach the server; logout proceeds
    /// locally regardless
    RevokeFailed(String),

    /// Token expiry could not be recovered; the user must sign in again
    SessionExpired,

    /// No session is established
    NotAuthenticated,

    /// Persistent token storage failed
    Storage(StoreError),

    /// Configuration is missing or malformed
    Config(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateMismatch => write!(f, "Authentication error, please retry the login"),
            Self::ExchangeFailed(reason) => {
                write!(f, "Could not complete authentication, try again ({reason})")
            }
            Self::Unauthorized => write!(f, "Authentication required"),
            Self::ProfileUnavailable(reason) => {
                write!(f, "Could not retrieve user information ({reason})")
            }
            Self::RefreshFailed(reason) => write!(f, "Could not refresh the session ({reason})"),
            Self::RevokeFailed(reason) => {
                write!(f, "Could not revoke the session token ({reason})")
            }
            Self::SessionExpired => write!(f, "Session expired, please sign in again"),
            Self::NotAuthenticated => write!(f, "Not signed in"),
            Self::Storage(err) => write!(f, "Credential storage error: {err}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        Self::Storage(err)
    }
}

/// Convenience alias used throughout this crate
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    //! Unit tests for error.
    use super::*;

    /// Validates that user-facing messages stay generic for protocol
    /// failures.
    ///
    /// Assertions:
    /// - Ensures the state-mismatch message names no state values.
    /// - Ensures the session-expired message is a plain instruction.
    #[test]
    fn test_user_safe_messages() {
        assert_eq!(
            AuthError::StateMismatch.to_string(),
            "Authentication error, please retry the login"
        );
        assert_eq!(AuthError::SessionExpired.to_string(), "Session expired, please sign in again");
        assert_eq!(AuthError::NotAuthenticated.to_string(), "Not signed in");
    }

    /// Validates reason propagation in wrapped variants.
    #[test]
    fn test_reason_propagation() {
        let err = AuthError::ExchangeFailed("token endpoint returned HTTP 400".to_string());
        assert!(err.to_string().contains("HTTP 400"));

        let err = AuthError::ProfileUnavailable("profile endpoint returned HTTP 503".to_string());
        assert!(err.to_string().contains("HTTP 503"));
    }

    /// Validates the storage error conversion scenario.
    #[test]
    fn test_store_error_conversion() {
        let err: AuthError = StoreError::NotFound.into();
        assert!(matches!(err, AuthError::Storage(StoreError::NotFound)));
        assert!(std::error::Error::source(&err).is_some());
    }

    /// Validates the store error display scenario.
    #[test]
    fn test_store_error_display() {
        assert_eq!(StoreError::NotFound.to_string(), "Secret not found");
        assert_eq!(
            StoreError::Io("disk full".to_string()).to_string(),
            "Storage I/O error: disk full"
        );
    }
}
