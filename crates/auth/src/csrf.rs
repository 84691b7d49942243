//! CSRF protection values for the authorization redirect
//!
//! Generates the `state` and `nonce` parameters carried through the
//! browser round-trip. Both are 32 bytes from a cryptographically secure
//! RNG, base64url encoded, so an attacker cannot predict or brute-force
//! them within the validity window of one login attempt.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;

/// Generate a random state token for CSRF protection
///
/// Returns a URL-safe base64-encoded random string of 32 bytes
/// (43 characters).
#[must_use]
pub fn generate_state() -> String {
    random_token()
}

/// Generate a random nonce for replay protection
///
/// Same format as [`generate_state`]; persisted alongside it before the
/// redirect and deleted once the callback is processed.
#[must_use]
pub fn generate_nonce() -> String {
    random_token()
}

/// Validate that the state token received on callback matches the one
/// persisted before the redirect
///
/// # Returns
/// `true` if states match, `false` otherwise
#[must_use]
pub fn validate_state(expected: &str, actual: &str) -> bool {
    expected == actual
}

fn random_token() -> String {
    let mut rng = rand::thread_rng();
    let random_bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// CSRF value pair for one login attempt
///
/// Contains the `state` (verified on callback) and `nonce` (replay
/// protection) parameters. One-time use: both are deleted from the
/// persisted store once the callback is processed or on logout.
#[derive(Debug, Clone)]
pub struct LoginChallenge {
    /// Random CSRF protection token, must match between the authorization
    /// request and the callback
    pub state: String,

    /// Random replay protection token sent in the authorization request
    pub nonce: String,
}

impl LoginChallenge {
    /// Generate a new challenge with cryptographically secure random values
    #[must_use]
    pub fn generate() -> Self {
        Self { state: generate_state(), nonce: generate_nonce() }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for csrf.
    use super::*;

    /// Validates `LoginChallenge::generate` behavior for the challenge
    /// generation scenario.
    ///
    /// Assertions:
    /// - Ensures `challenge.state.len()` equals `43` (32 bytes base64url).
    /// - Ensures `challenge.nonce.len()` equals `43`.
    #[test]
    fn test_generate_challenge() {
        let challenge = LoginChallenge::generate();

        assert_eq!(challenge.state.len(), 43);
        assert_eq!(challenge.nonce.len(), 43);
    }

    /// Validates `LoginChallenge::generate` behavior for the unique values
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `challenge1.state` differs from `challenge2.state`.
    /// - Confirms `challenge1.nonce` differs from `challenge2.nonce`.
    /// - Confirms `challenge1.state` differs from `challenge1.nonce`.
    #[test]
    fn test_unique_values() {
        let challenge1 = LoginChallenge::generate();
        let challenge2 = LoginChallenge::generate();

        assert_ne!(challenge1.state, challenge2.state);
        assert_ne!(challenge1.nonce, challenge2.nonce);
        assert_ne!(challenge1.state, challenge1.nonce);
    }

    /// Validates the base64url encoding scenario.
    ///
    /// Assertions:
    /// - Ensures no padding characters appear in either value.
    /// - Ensures URL-safe characters only (no `+` or `/`).
    #[test]
    fn test_base64url_encoding() {
        let challenge = LoginChallenge::generate();

        for value in [&challenge.state, &challenge.nonce] {
            assert!(!value.contains('='));
            assert!(!value.contains('+'));
            assert!(!value.contains('/'));
        }
    }

    /// Validates `validate_state` behavior for match and mismatch.
    #[test]
    fn test_validate_state() {
        assert!(validate_state("abc123", "abc123"));
        assert!(!validate_state("abc123", "abc124"));
        assert!(!validate_state("abc123", ""));
        assert!(!validate_state("", "abc123"));
    }
}
