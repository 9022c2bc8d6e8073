//! In-memory reference store.
//!
//! Backs the test suite and small single-process deployments. Challenge
//! tokens are hashed before being used as keys so raw tokens never sit in
//! server memory longer than a call; the same discipline the durable stores
//! apply to verification tokens.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use async_trait::async_trait;

use crate::models::{
    Account, Challenge, ChallengePurpose, PasskeyCredential, ResourceLock, Visibility,
};
use crate::store::{
    AccountStore, ChallengeStore, ConsumeOutcome, CredentialStore, LockStore,
};

#[derive(Default)]
pub struct MemoryStore {
    accounts: Mutex<HashMap<Uuid, Account>>,
    credentials: Mutex<HashMap<Vec<u8>, PasskeyCredential>>,
    /// Keyed by SHA-256 of the token.
    challenges: Mutex<HashMap<Vec<u8>, Challenge>>,
    locks: Mutex<HashMap<String, ResourceLock>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn token_key(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

fn visible(account: &Account, visibility: Visibility) -> bool {
    match visibility {
        Visibility::ActiveOnly => account.is_active(),
        Visibility::IncludeDeleted => true,
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn insert_account(&self, account: Account) -> anyhow::Result<()> {
        let mut accounts = self.accounts.lock().await;
        accounts.insert(account.id, account);
        Ok(())
    }

    async fn account_by_id(
        &self,
        id: Uuid,
        visibility: Visibility,
    ) -> anyhow::Result<Option<Account>> {
        let accounts = self.accounts.lock().await;
        Ok(accounts
            .get(&id)
            .filter(|account| visible(account, visibility))
            .cloned())
    }

    async fn account_by_email(
        &self,
        email: &str,
        visibility: Visibility,
    ) -> anyhow::Result<Option<Account>> {
        let accounts = self.accounts.lock().await;
        Ok(accounts
            .values()
            .find(|account| account.email == email && visible(account, visibility))
            .cloned())
    }

    async fn update_account(&self, account: &Account) -> anyhow::Result<()> {
        let mut accounts = self.accounts.lock().await;
        accounts.insert(account.id, account.clone());
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_credential(&self, credential: PasskeyCredential) -> anyhow::Result<bool> {
        let mut credentials = self.credentials.lock().await;
        if credentials.contains_key(&credential.id) {
            return Ok(false);
        }
        credentials.insert(credential.id.clone(), credential);
        Ok(true)
    }

    async fn credential_by_id(&self, id: &[u8]) -> anyhow::Result<Option<PasskeyCredential>> {
        let credentials = self.credentials.lock().await;
        Ok(credentials.get(id).cloned())
    }

    async fn credentials_for_account(
        &self,
        account_id: Uuid,
    ) -> anyhow::Result<Vec<PasskeyCredential>> {
        let credentials = self.credentials.lock().await;
        let mut owned: Vec<PasskeyCredential> = credentials
            .values()
            .filter(|credential| credential.account_id == account_id)
            .cloned()
            .collect();
        owned.sort_by_key(|credential| credential.created_at);
        Ok(owned)
    }

    async fn update_credential(
        &self,
        credential: &PasskeyCredential,
        expected_version: u64,
    ) -> anyhow::Result<bool> {
        let mut credentials = self.credentials.lock().await;
        match credentials.get_mut(&credential.id) {
            Some(stored) if stored.version == expected_version => {
                let mut updated = credential.clone();
                updated.version = expected_version + 1;
                *stored = updated;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }

    async fn delete_credential(&self, id: &[u8]) -> anyhow::Result<bool> {
        let mut credentials = self.credentials.lock().await;
        Ok(credentials.remove(id).is_some())
    }
}

#[async_trait]
impl ChallengeStore for MemoryStore {
    async fn insert_challenge(&self, challenge: Challenge) -> anyhow::Result<()> {
        let mut challenges = self.challenges.lock().await;
        challenges.insert(token_key(&challenge.token), challenge);
        Ok(())
    }

    async fn consume_challenge(
        &self,
        token: &str,
        purpose: ChallengePurpose,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ConsumeOutcome> {
        // The whole decision runs under one lock so two racing consumers can
        // never both observe `consumed == false`.
        let mut challenges = self.challenges.lock().await;
        let Some(challenge) = challenges.get_mut(&token_key(token)) else {
            return Ok(ConsumeOutcome::NotFound);
        };
        // Expiry wins over consumption state.
        if challenge.is_expired(now) {
            return Ok(ConsumeOutcome::Expired);
        }
        if challenge.purpose != purpose {
            return Ok(ConsumeOutcome::WrongPurpose);
        }
        if challenge.consumed {
            return Ok(ConsumeOutcome::AlreadyConsumed);
        }
        challenge.consumed = true;
        Ok(ConsumeOutcome::Consumed(challenge.clone()))
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let mut challenges = self.challenges.lock().await;
        let before = challenges.len();
        challenges.retain(|_, challenge| !challenge.is_expired(now));
        Ok(before - challenges.len())
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn upsert_lock(&self, lock: ResourceLock) -> anyhow::Result<()> {
        let mut locks = self.locks.lock().await;
        locks.insert(lock.resource_id.clone(), lock);
        Ok(())
    }

    async fn lock_for_resource(&self, resource_id: &str) -> anyhow::Result<Option<ResourceLock>> {
        let locks = self.locks.lock().await;
        Ok(locks.get(resource_id).cloned())
    }

    async fn remove_lock(&self, resource_id: &str) -> anyhow::Result<bool> {
        let mut locks = self.locks.lock().await;
        Ok(locks.remove(resource_id).is_some())
    }
}
