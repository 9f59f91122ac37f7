//! PBKDF2-SHA512 password hashing.
//!
//! The stored form is a PHC string (`$pbkdf2-sha512$...`) embedding the
//! algorithm, iteration count, and per-hash random salt, so a future
//! algorithm rotation only has to branch on the PHC identifier rather than
//! migrate every row up front.

use password_hash::{
    PasswordHash, PasswordHasher as PhcPasswordHasher, PasswordVerifier, SaltString,
    rand_core::OsRng,
};
use pbkdf2::{Algorithm, Params, Pbkdf2};

use crate::error::AuthError;

/// PBKDF2-SHA512 produces a 64-byte derived key, vs. the crate's
/// SHA256-sized default of 32.
const OUTPUT_LENGTH: usize = 64;

/// Verifies and hashes user passwords with PBKDF2-SHA512.
///
/// Stateless and safe to share across requests; every method takes `&self`
/// only for API symmetry with the other components.
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordHasher;

impl PasswordHasher {
    /// Hashes `password`, embedding a fresh random salt in the output.
    ///
    /// # Errors
    /// Returns [`AuthError::PasswordHash`] if salt generation or PHC
    /// encoding fails.
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let params = Params {
            output_length: OUTPUT_LENGTH,
            ..Params::default()
        };
        let hash = Pbkdf2
            .hash_password_customized(password.as_bytes(), Some(Algorithm::Pbkdf2Sha512.ident()), None, params, &salt)
            .map_err(|e| AuthError::PasswordHash {
                message: e.to_string(),
            })?;
        Ok(hash.to_string())
    }

    /// Verifies `password` against a previously stored PHC hash.
    ///
    /// Returns `Ok(false)` (not an error) for a password mismatch; returns
    /// `Err` only when `stored_hash` is not a well-formed PHC string.
    ///
    /// # Errors
    /// Returns [`AuthError::PasswordHash`] if `stored_hash` cannot be
    /// parsed.
    pub fn verify(&self, password: &str, stored_hash: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(stored_hash).map_err(|e| AuthError::PasswordHash {
            message: e.to_string(),
        })?;
        Ok(Pbkdf2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trips() {
        let hasher = PasswordHasher;
        let hash = hasher.hash("correct horse battery staple").unwrap();
        assert!(hasher.verify("correct horse battery staple", &hash).unwrap());
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hasher = PasswordHasher;
        let hash = hasher.hash("right-password").unwrap();
        assert!(!hasher.verify("wrong-password", &hash).unwrap());
    }

    #[test]
    fn hash_embeds_pbkdf2_sha512_identifier() {
        let hasher = PasswordHasher;
        let hash = hasher.hash("whatever").unwrap();
        assert!(hash.starts_with("$pbkdf2-sha512$"));
    }

    #[test]
    fn hash_is_salted_differently_each_time() {
        let hasher = PasswordHasher;
        let a = hasher.hash("same-password").unwrap();
        let b = hasher.hash("same-password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn verify_rejects_malformed_stored_hash() {
        let hasher = PasswordHasher;
        assert!(hasher.verify("whatever", "not-a-phc-string").is_err());
    }
}
