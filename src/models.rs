//! Core data model: accounts, passkey credentials, challenges, resource locks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user account.
///
/// `password_hash` is optional: passkey-only accounts carry none. An account
/// with neither a password nor a passkey cannot authenticate and is only
/// recoverable through an out-of-band reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    /// Normalized (trimmed, lowercased) before storage; unique among
    /// non-deleted accounts.
    pub email: String,
    /// Argon2 PHC string, or `None` for passkey-only accounts.
    pub password_hash: Option<String>,
    pub email_verified: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    /// Soft-delete tombstone. Deleted accounts are excluded from
    /// authentication but retained for audit and restore.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Explicit account lifecycle state derived from the tombstone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Active,
    Deleted,
}

impl Account {
    #[must_use]
    pub fn state(&self) -> AccountState {
        if self.deleted_at.is_some() {
            AccountState::Deleted
        } else {
            AccountState::Active
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == AccountState::Active
    }
}

/// Visibility policy for account lookups. Every query site picks one
/// explicitly; there is no implicit "active only" default buried in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    ActiveOnly,
    IncludeDeleted,
}

/// A WebAuthn passkey bound to an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasskeyCredential {
    /// Opaque credential id minted by the authenticator; globally unique.
    pub id: Vec<u8>,
    pub account_id: Uuid,
    /// COSE-encoded public key as extracted at registration.
    pub public_key: Vec<u8>,
    /// Monotonic authenticator counter. A regression on authentication means
    /// cloned hardware and is rejected without mutating this value.
    pub sign_count: u32,
    /// User-assigned label.
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency version; bumped on every successful write so
    /// concurrent updates to the same credential cannot silently lose data.
    pub version: u64,
}

/// What a one-time challenge was issued for. Consumption checks the purpose,
/// so a token minted for one flow cannot be spent in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengePurpose {
    PasskeyRegister,
    PasskeyAuthenticate,
    EmailVerify,
    PasswordReset,
}

/// A single-use server-held challenge.
///
/// The client only ever holds the opaque token; all ceremony state stays
/// server-side, keyed by it.
#[derive(Debug, Clone)]
pub struct Challenge {
    /// 32 random bytes, base64url unpadded.
    pub token: String,
    pub purpose: ChallengePurpose,
    /// Bound account, or `None` for username-less discovery flows.
    pub account_id: Option<Uuid>,
    /// Origin the ceremony response must echo, fixed at issuance.
    pub expected_origin: String,
    /// Relying-party id the response's rpIdHash must match.
    pub expected_rp_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

impl Challenge {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Secret gate for one shared resource (a short link). Entirely independent
/// of accounts: anonymous visitors satisfy it with the link password alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLock {
    pub resource_id: String,
    /// Argon2 PHC string; `None` means the resource is known but not
    /// password protected.
    pub secret_hash: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}
