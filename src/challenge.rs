//! One-time challenge issuance and consumption.
//!
//! Challenges back every multi-step flow in the core: WebAuthn ceremonies,
//! email verification links, and password-reset tokens. A challenge is usable
//! exactly once, expires server-side, and carries the origin/RP binding the
//! eventual response must match. No cryptographic verification happens here;
//! that belongs to the ceremony engine.

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::codec;
use crate::error::{AuthError, AuthResult};
use crate::models::{Challenge, ChallengePurpose};
use crate::store::{ChallengeStore, ConsumeOutcome};

/// Per-purpose lifetimes. Ceremonies are short; email links live longer.
#[derive(Debug, Clone)]
pub struct ChallengeTtls {
    pub ceremony: Duration,
    pub email_verify: Duration,
    pub password_reset: Duration,
}

impl Default for ChallengeTtls {
    fn default() -> Self {
        Self {
            ceremony: Duration::minutes(5),
            email_verify: Duration::hours(1),
            password_reset: Duration::hours(1),
        }
    }
}

impl ChallengeTtls {
    fn for_purpose(&self, purpose: ChallengePurpose) -> Duration {
        match purpose {
            ChallengePurpose::PasskeyRegister | ChallengePurpose::PasskeyAuthenticate => {
                self.ceremony
            }
            ChallengePurpose::EmailVerify => self.email_verify,
            ChallengePurpose::PasswordReset => self.password_reset,
        }
    }
}

/// Generate a fresh 32-byte challenge token, base64url unpadded.
///
/// # Errors
///
/// Returns an error if the system RNG fails.
pub(crate) fn generate_token() -> AuthResult<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate challenge token")?;
    Ok(codec::encode(&bytes))
}

pub struct ChallengeManager<S> {
    store: Arc<S>,
    ttls: ChallengeTtls,
}

impl<S: ChallengeStore> ChallengeManager<S> {
    pub fn new(store: Arc<S>, ttls: ChallengeTtls) -> Self {
        Self { store, ttls }
    }

    /// Issue a fresh single-use challenge bound to `purpose` and the given
    /// origin/RP pair.
    ///
    /// # Errors
    ///
    /// Returns an error if token generation or storage fails.
    pub async fn issue(
        &self,
        purpose: ChallengePurpose,
        account_id: Option<Uuid>,
        origin: &str,
        rp_id: &str,
    ) -> AuthResult<Challenge> {
        let now = Utc::now();
        let challenge = Challenge {
            token: generate_token()?,
            purpose,
            account_id,
            expected_origin: origin.to_string(),
            expected_rp_id: rp_id.to_string(),
            issued_at: now,
            expires_at: now + self.ttls.for_purpose(purpose),
            consumed: false,
        };
        self.store.insert_challenge(challenge.clone()).await?;
        debug!(?purpose, expires_at = %challenge.expires_at, "issued challenge");
        Ok(challenge)
    }

    /// Atomically consume the challenge for `token`. At most one concurrent
    /// caller succeeds; everyone else gets [`AuthError::ChallengeAlreadyConsumed`].
    ///
    /// # Errors
    ///
    /// [`AuthError::ChallengeNotFound`], [`AuthError::ChallengeExpired`],
    /// [`AuthError::ChallengeWrongPurpose`], or
    /// [`AuthError::ChallengeAlreadyConsumed`]; storage failures pass through.
    pub async fn consume(&self, token: &str, purpose: ChallengePurpose) -> AuthResult<Challenge> {
        match self.store.consume_challenge(token, purpose, Utc::now()).await? {
            ConsumeOutcome::Consumed(challenge) => Ok(challenge),
            ConsumeOutcome::NotFound => Err(AuthError::ChallengeNotFound),
            ConsumeOutcome::Expired => Err(AuthError::ChallengeExpired),
            ConsumeOutcome::WrongPurpose => Err(AuthError::ChallengeWrongPurpose),
            ConsumeOutcome::AlreadyConsumed => Err(AuthError::ChallengeAlreadyConsumed),
        }
    }

    /// Garbage-collect expired challenges.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn prune_expired(&self, now: DateTime<Utc>) -> AuthResult<usize> {
        Ok(self.store.prune_expired(now).await?)
    }
}
