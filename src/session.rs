//! Stateless bearer sessions.
//!
//! Claims are a point-in-time snapshot of the account at issuance: a later
//! admin grant or email verification does not alter tokens already in the
//! wild; they pick the change up on refresh. There is no server-side
//! revocation list; logout is client-local token discard. `verify` is the
//! single place in the product that decodes a session token.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::models::Account;

const DEFAULT_TTL_SECONDS: i64 = 24 * 60 * 60;
const ENV_SESSION_KEY: &str = "LINKGATE_SESSION_KEY";
const ENV_SESSION_TTL_SECONDS: &str = "LINKGATE_SESSION_TTL_SECONDS";

/// Claims embedded in a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject account id.
    pub sub: Uuid,
    pub email_verified: bool,
    pub is_admin: bool,
    /// Unix seconds.
    pub iat: i64,
    /// Unix seconds.
    pub exp: i64,
}

/// A freshly minted session.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub claims: SessionClaims,
}

#[derive(Clone)]
pub struct SessionConfig {
    signing_key: SecretString,
    ttl: Duration,
}

impl SessionConfig {
    /// Create a session configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the key is shorter than 32 bytes or the TTL is
    /// not positive.
    pub fn new(signing_key: SecretString, ttl: Duration) -> AuthResult<Self> {
        if signing_key.expose_secret().len() < 32 {
            return Err(AuthError::Storage(anyhow::anyhow!(
                "session signing key must be at least 32 bytes"
            )));
        }
        if ttl <= Duration::zero() {
            return Err(AuthError::Storage(anyhow::anyhow!(
                "session ttl must be positive"
            )));
        }
        Ok(Self { signing_key, ttl })
    }

    /// Build from `LINKGATE_SESSION_KEY` / `LINKGATE_SESSION_TTL_SECONDS`.
    ///
    /// # Errors
    ///
    /// Returns an error when the key variable is missing or invalid.
    pub fn from_env() -> AuthResult<Self> {
        let key = std::env::var(ENV_SESSION_KEY)
            .map_err(|_| AuthError::Storage(anyhow::anyhow!("{ENV_SESSION_KEY} is not set")))?;
        let ttl = std::env::var(ENV_SESSION_TTL_SECONDS)
            .ok()
            .and_then(|value| value.trim().parse::<i64>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_TTL_SECONDS);
        Self::new(SecretString::from(key), Duration::seconds(ttl))
    }
}

/// Mints and verifies session tokens (HS256, server-held key).
pub struct SessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl SessionIssuer {
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        let key = config.signing_key.expose_secret().as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(key),
            decoding: DecodingKey::from_secret(key),
            validation,
            ttl: config.ttl,
        }
    }

    /// Mint a token for `account`, snapshotting its verification and admin
    /// flags.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn mint(&self, account: &Account) -> AuthResult<Session> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: account.id,
            email_verified: account.email_verified,
            is_admin: account.is_admin,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|err| AuthError::Storage(anyhow::anyhow!("failed to sign session: {err}")))?;
        Ok(Session { token, claims })
    }

    /// Verify a bearer token and return its claims.
    ///
    /// # Errors
    ///
    /// [`AuthError::SessionExpired`], [`AuthError::SignatureInvalid`], or
    /// [`AuthError::SessionMalformed`].
    pub fn verify(&self, token: &str) -> AuthResult<SessionClaims> {
        decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::SessionExpired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::SignatureInvalid,
                _ => AuthError::SessionMalformed,
            })
    }
}
