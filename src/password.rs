//! Password and resource-secret hashing.
//!
//! Secrets are stored as Argon2id PHC strings, never in plaintext, and are
//! verified through `argon2`'s constant-time machinery. Paths that must not
//! reveal whether a stored hash exists call [`verify_or_burn`], which performs
//! an equivalent amount of KDF work against a fixed hash before failing.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;
use std::sync::LazyLock;

use crate::error::{AuthError, AuthResult};

/// Minimum accepted password/secret length.
pub const MIN_PASSWORD_LEN: usize = 8;

// Hash burned on lookups that found nothing, so the failure path costs the
// same KDF work as a real verification.
static BURN_HASH: LazyLock<Option<String>> = LazyLock::new(|| hash("linkgate.burn.value").ok());

/// Hash a secret into an Argon2id PHC string with a fresh random salt.
///
/// # Errors
///
/// Returns [`AuthError::Hash`] if the KDF fails.
pub fn hash(secret: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::Hash)
}

/// Verify a secret against a stored PHC string.
#[must_use]
pub fn verify(secret: &str, phc: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(phc) else {
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}

/// Verify against a possibly-absent stored hash without leaking its absence
/// through timing: when `phc` is `None` the same verification runs against a
/// fixed hash and the result is discarded.
#[must_use]
pub fn verify_or_burn(secret: &str, phc: Option<&str>) -> bool {
    match phc {
        Some(phc) => verify(secret, phc),
        None => {
            if let Some(burn) = BURN_HASH.as_deref() {
                let _ = verify(secret, burn);
            }
            false
        }
    }
}

/// Enforce the minimum secret policy before hashing.
///
/// # Errors
///
/// Returns [`AuthError::WeakPassword`] when the secret is too short.
pub fn check_strength(secret: &str) -> AuthResult<()> {
    if secret.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword);
    }
    Ok(())
}
