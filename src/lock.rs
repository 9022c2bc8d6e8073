//! Per-resource secret gate for password-protected short links.
//!
//! Deliberately independent of accounts and sessions: a visitor following a
//! protected link is anonymous and stays anonymous; a correct secret simply
//! lets the caller reveal the destination. Unlike account challenges the
//! check is repeatable. Secrets get the same treatment as passwords: argon2
//! PHC storage, constant-time verification, never plaintext.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::debug;

use crate::error::{AuthError, AuthResult};
use crate::models::ResourceLock;
use crate::password;
use crate::store::LockStore;

pub struct ResourceLockGate<S> {
    store: Arc<S>,
}

impl<S: LockStore> ResourceLockGate<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Make a resource known to the gate without protecting it.
    ///
    /// The link-management collaborator calls this on link creation so the
    /// gate can distinguish "no such link" from "link without a password".
    ///
    /// # Errors
    ///
    /// Storage failures pass through.
    pub async fn register(&self, resource_id: &str) -> AuthResult<()> {
        self.store
            .upsert_lock(ResourceLock {
                resource_id: resource_id.to_string(),
                secret_hash: None,
                expires_at: None,
            })
            .await?;
        Ok(())
    }

    /// Protect a resource with a secret, replacing any existing lock.
    ///
    /// # Errors
    ///
    /// [`AuthError::WeakPassword`] for secrets below the minimum length;
    /// hashing and storage failures pass through.
    pub async fn protect(
        &self,
        resource_id: &str,
        secret: &SecretString,
        expires_at: Option<DateTime<Utc>>,
    ) -> AuthResult<()> {
        password::check_strength(secret.expose_secret())?;
        let secret_hash = password::hash(secret.expose_secret())?;
        self.store
            .upsert_lock(ResourceLock {
                resource_id: resource_id.to_string(),
                secret_hash: Some(secret_hash),
                expires_at,
            })
            .await?;
        debug!(resource_id, "resource protected");
        Ok(())
    }

    /// Drop the secret but keep the resource known.
    ///
    /// # Errors
    ///
    /// [`AuthError::ResourceNotFound`] when the resource was never registered.
    pub async fn unprotect(&self, resource_id: &str) -> AuthResult<()> {
        let lock = self
            .store
            .lock_for_resource(resource_id)
            .await?
            .ok_or(AuthError::ResourceNotFound)?;
        self.store
            .upsert_lock(ResourceLock {
                secret_hash: None,
                ..lock
            })
            .await?;
        Ok(())
    }

    /// Forget a resource entirely (link deleted). Idempotent.
    ///
    /// # Errors
    ///
    /// Storage failures pass through.
    pub async fn forget(&self, resource_id: &str) -> AuthResult<bool> {
        Ok(self.store.remove_lock(resource_id).await?)
    }

    /// Check a visitor-supplied secret against the resource's lock.
    ///
    /// # Errors
    ///
    /// [`AuthError::ResourceNotFound`] for unknown resources,
    /// [`AuthError::LockExpired`] past the lock's expiry,
    /// [`AuthError::ResourceNotProtected`] when no secret is required, and
    /// [`AuthError::WrongSecret`] when verification fails.
    pub async fn check(&self, resource_id: &str, provided_secret: &str) -> AuthResult<()> {
        let lock = self
            .store
            .lock_for_resource(resource_id)
            .await?
            .ok_or(AuthError::ResourceNotFound)?;

        if let Some(expires_at) = lock.expires_at {
            if Utc::now() >= expires_at {
                return Err(AuthError::LockExpired);
            }
        }

        let Some(secret_hash) = lock.secret_hash.as_deref() else {
            return Err(AuthError::ResourceNotProtected);
        };

        if password::verify(provided_secret, secret_hash) {
            Ok(())
        } else {
            Err(AuthError::WrongSecret)
        }
    }
}
