//! Password hashing and verification.

use anyhow::{Context, Result};
use tracing::warn;

/// Minimum accepted length for a new password.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Hash a password using bcrypt with a fresh salt.
pub fn hash_password(password: &str) -> Result<String> {
    // Use a lower cost factor for development speed
    let cost = if cfg!(debug_assertions) { 4 } else { 10 };
    bcrypt::hash(password, cost).context("Failed to hash password")
}

/// Verify a password against a stored bcrypt hash.
///
/// A mismatch is an expected outcome and yields `false`. So does a stored
/// hash that bcrypt cannot parse.
pub fn verify_password(hash: &str, password: &str) -> bool {
    match bcrypt::verify(password, hash) {
        Ok(valid) => valid,
        Err(err) => {
            warn!(error = %err, "Stored password hash could not be verified");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hashing() {
        let hash = hash_password("test_password").unwrap();
        assert_ne!(hash, "test_password");
        assert!(hash.starts_with("$2"));
        assert!(verify_password(&hash, "test_password"));
        assert!(!verify_password(&hash, "wrong_password"));
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("same-secret").unwrap();
        let b = hash_password("same-secret").unwrap();
        assert_ne!(a, b);
        assert!(verify_password(&a, "same-secret"));
        assert!(verify_password(&b, "same-secret"));
    }

    #[test]
    fn test_malformed_hash_does_not_verify() {
        assert!(!verify_password("not-a-bcrypt-hash", "anything"));
        assert!(!verify_password("", ""));
    }
}
