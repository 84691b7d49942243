//! API-specific error types
//!
//! Provides error classification for API operations with retry metadata.

use std::time::Duration;

use thiserror::Error;

/// Categories of API errors for retry logic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiErrorCategory {
    /// Authentication errors (401, 403) - retry after token refresh
    Authentication,
    /// Rate limiting errors (429) - retry with backoff
    RateLimit,
    /// Server errors (5xx) - retryable
    Server,
    /// Client errors (4xx except auth) - non-retryable
    Client,
    /// Network/connection errors - retryable
    Network,
    /// Configuration errors - non-retryable
    Config,
}

/// API operation errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Authentication failed and could not be recovered by a refresh
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The backend throttled the request
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// The backend failed (5xx); callers typically route to an error view
    #[error("Server error: {0}")]
    Server(String),

    /// The request was rejected (4xx other than auth)
    #[error("Client error: {0}")]
    Client(String),

    /// The request never completed
    #[error("Network error: {0}")]
    Network(String),

    /// The client is misconfigured
    #[error("Configuration error: {0}")]
    Config(String),

    /// The request exceeded its deadline
    #[error("Timeout after {0:?}")]
    Timeout(Duration),
}

impl ApiError {
    /// Get the error category for this error
    #[must_use]
    pub fn category(&self) -> ApiErrorCategory {
        match self {
            Self::Auth(_) => ApiErrorCategory::Authentication,
            Self::RateLimit(_) => ApiErrorCategory::RateLimit,
            Self::Server(_) => ApiErrorCategory::Server,
            Self::Client(_) => ApiErrorCategory::Client,
            Self::Network(_) | Self::Timeout(_) => ApiErrorCategory::Network,
            Self::Config(_) => ApiErrorCategory::Config,
        }
    }

    /// Check if this error should be retried
    #[must_use]
    pub fn should_retry(&self) -> bool {
        matches!(
            self.category(),
            ApiErrorCategory::Authentication
                | ApiErrorCategory::RateLimit
                | ApiErrorCategory::Server
                | ApiErrorCategory::Network
        )
    }

    /// Get suggested retry delay in seconds
    #[must_use]
    pub fn retry_delay_secs(&self) -> u64 {
        match self.category() {
            ApiErrorCategory::Authentication => 5, // Quick retry after token refresh
            ApiErrorCategory::RateLimit => 60,     // Wait for rate limit window
            ApiErrorCategory::Server => 10,        // Moderate delay for server issues
            ApiErrorCategory::Network => 5,        // Quick retry for network
            ApiErrorCategory::Client | ApiErrorCategory::Config => 0, // No retry
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            ApiError::Auth("test".to_string()).category(),
            ApiErrorCategory::Authentication
        );
        assert_eq!(
            ApiError::RateLimit("test".to_string()).category(),
            ApiErrorCategory::RateLimit
        );
        assert_eq!(ApiError::Server("test".to_string()).category(), ApiErrorCategory::Server);
        assert_eq!(ApiError::Network("test".to_string()).category(), ApiErrorCategory::Network);
        assert_eq!(
            ApiError::Timeout(Duration::from_secs(5)).category(),
            ApiErrorCategory::Network
        );
    }

    #[test]
    fn test_should_retry() {
        assert!(ApiError::Auth("test".to_string()).should_retry());
        assert!(ApiError::RateLimit("test".to_string()).should_retry());
        assert!(ApiError::Server("test".to_string()).should_retry());
        assert!(ApiError::Network("test".to_string()).should_retry());
        assert!(!ApiError::Client("test".to_string()).should_retry());
        assert!(!ApiError::Config("test".to_string()).should_retry());
    }

    #[test]
    fn test_retry_delays() {
        assert_eq!(ApiError::Auth("test".to_string()).retry_delay_secs(), 5);
        assert_eq!(ApiError::RateLimit("test".to_string()).retry_delay_secs(), 60);
        assert_eq!(ApiError::Server("test".to_string()).retry_delay_secs(), 10);
        assert_eq!(ApiError::Client("test".to_string()).retry_delay_secs(), 0);
    }
}
