//! Persistence seams for the authentication core.
//!
//! Storage drivers live outside this crate; the core talks to four narrow
//! traits. [`memory::MemoryStore`] is the reference implementation and the one
//! the test suite runs against.
//!
//! Contracts implementations must uphold:
//!
//! - [`ChallengeStore::consume_challenge`] is atomic: under concurrent calls
//!   with the same token, exactly one caller receives the challenge and every
//!   other caller sees [`ConsumeOutcome::AlreadyConsumed`]. Expiry is decided
//!   before consumption state, so an expired token reports expired even when
//!   it was never spent.
//! - [`CredentialStore::update_credential`] only applies when the stored
//!   version equals `expected_version`, then bumps it. Concurrent writers to
//!   one credential cannot silently lose updates.
//! - Email uniqueness is scoped to non-deleted accounts.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Account, Challenge, ChallengePurpose, PasskeyCredential, ResourceLock, Visibility};

/// Result of an atomic challenge consumption attempt.
#[derive(Debug)]
pub enum ConsumeOutcome {
    /// This caller won; the challenge is now spent.
    Consumed(Challenge),
    NotFound,
    Expired,
    WrongPurpose,
    AlreadyConsumed,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert_account(&self, account: Account) -> anyhow::Result<()>;

    async fn account_by_id(&self, id: Uuid, visibility: Visibility)
        -> anyhow::Result<Option<Account>>;

    /// Lookup by normalized email.
    async fn account_by_email(
        &self,
        email: &str,
        visibility: Visibility,
    ) -> anyhow::Result<Option<Account>>;

    async fn update_account(&self, account: &Account) -> anyhow::Result<()>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new credential. Returns `false` when the credential id is
    /// already registered (to any account).
    async fn insert_credential(&self, credential: PasskeyCredential) -> anyhow::Result<bool>;

    async fn credential_by_id(&self, id: &[u8]) -> anyhow::Result<Option<PasskeyCredential>>;

    async fn credentials_for_account(
        &self,
        account_id: Uuid,
    ) -> anyhow::Result<Vec<PasskeyCredential>>;

    /// Versioned write: applies `credential` (with its version bumped) only if
    /// the stored version equals `expected_version`. Returns `false` on
    /// conflict.
    async fn update_credential(
        &self,
        credential: &PasskeyCredential,
        expected_version: u64,
    ) -> anyhow::Result<bool>;

    /// Returns `false` when the credential was already absent.
    async fn delete_credential(&self, id: &[u8]) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn insert_challenge(&self, challenge: Challenge) -> anyhow::Result<()>;

    /// Atomically mark-and-return the challenge for `token`.
    async fn consume_challenge(
        &self,
        token: &str,
        purpose: ChallengePurpose,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ConsumeOutcome>;

    /// Drop expired challenges; abandoned ceremonies are garbage, not state.
    /// Returns how many were removed.
    async fn prune_expired(&self, now: DateTime<Utc>) -> anyhow::Result<usize>;
}

#[async_trait]
pub trait LockStore: Send + Sync {
    /// Insert or replace the lock row for a resource.
    async fn upsert_lock(&self, lock: ResourceLock) -> anyhow::Result<()>;

    async fn lock_for_resource(&self, resource_id: &str) -> anyhow::Result<Option<ResourceLock>>;

    /// Returns `false` when no row existed.
    async fn remove_lock(&self, resource_id: &str) -> anyhow::Result<bool>;
}
