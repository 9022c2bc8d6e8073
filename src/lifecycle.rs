//! Account lifecycle orchestration.
//!
//! Ties credentials, challenges, sessions, and mail together: registration
//! with email verification, password login, password change/reset, passkey
//! management, and soft deletion. Enumeration-sensitive operations (login,
//! reset requests) return identically shaped results whether or not the
//! account exists; the one accepted leak is `EmailTaken` at registration.

use chrono::Utc;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::challenge::{ChallengeManager, ChallengeTtls};
use crate::ceremony::RpConfig;
use crate::error::{AuthError, AuthResult};
use crate::mailer::Mailer;
use crate::models::{Account, ChallengePurpose, PasskeyCredential, Visibility};
use crate::password;
use crate::session::{Session, SessionIssuer};
use crate::store::{AccountStore, ChallengeStore, CredentialStore};

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

pub struct AccountLifecycle<S> {
    store: Arc<S>,
    challenges: ChallengeManager<S>,
    sessions: Arc<SessionIssuer>,
    mailer: Arc<dyn Mailer>,
    config: RpConfig,
}

impl<S> AccountLifecycle<S>
where
    S: AccountStore + CredentialStore + ChallengeStore,
{
    pub fn new(
        store: Arc<S>,
        config: RpConfig,
        ttls: ChallengeTtls,
        sessions: Arc<SessionIssuer>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            challenges: ChallengeManager::new(Arc::clone(&store), ttls),
            store,
            sessions,
            mailer,
            config,
        }
    }

    /// Create a new unverified account and send the verification email.
    ///
    /// Passkey-only signups pass `None` and add a credential through a
    /// registration ceremony afterwards.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidEmail`], [`AuthError::WeakPassword`], or
    /// [`AuthError::EmailTaken`] (only among non-deleted accounts).
    pub async fn register(
        &self,
        email: &str,
        password: Option<&SecretString>,
    ) -> AuthResult<Account> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }

        let password_hash = match password {
            Some(password) => {
                password::check_strength(password.expose_secret())?;
                Some(password::hash(password.expose_secret())?)
            }
            None => None,
        };

        if self
            .store
            .account_by_email(&email, Visibility::ActiveOnly)
            .await?
            .is_some()
        {
            return Err(AuthError::EmailTaken);
        }

        let account = Account {
            id: Uuid::new_v4(),
            email: email.clone(),
            password_hash,
            email_verified: false,
            is_admin: false,
            created_at: Utc::now(),
            deleted_at: None,
        };
        self.store.insert_account(account.clone()).await?;

        let challenge = self
            .challenges
            .issue(
                ChallengePurpose::EmailVerify,
                Some(account.id),
                self.config.origin(),
                self.config.rp_id(),
            )
            .await?;
        self.mailer
            .send_email_verification(&email, &challenge.token)
            .await?;

        info!(account_id = %account.id, "registered account");
        Ok(account)
    }

    /// Password login.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`] for unknown account, deleted
    /// account, passwordless account, and wrong password alike; the KDF runs
    /// in every case so the paths are indistinguishable in timing too.
    pub async fn login(&self, email: &str, password: &SecretString) -> AuthResult<Session> {
        let email = normalize_email(email);
        let account = self
            .store
            .account_by_email(&email, Visibility::ActiveOnly)
            .await?;

        let stored_hash = account.as_ref().and_then(|acct| acct.password_hash.as_deref());
        if !password::verify_or_burn(password.expose_secret(), stored_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        // stored_hash was Some, so account is too.
        let account = account.ok_or(AuthError::InvalidCredentials)?;
        debug!(account_id = %account.id, "password login succeeded");
        self.sessions.mint(&account)
    }

    /// Change the password after re-verifying the current one.
    ///
    /// # Errors
    ///
    /// [`AuthError::AccountNotFound`], [`AuthError::WrongCurrentPassword`]
    /// (also for passkey-only accounts, which have no password to change), or
    /// [`AuthError::WeakPassword`].
    pub async fn change_password(
        &self,
        account_id: Uuid,
        current: &SecretString,
        new: &SecretString,
    ) -> AuthResult<()> {
        let mut account = self
            .store
            .account_by_id(account_id, Visibility::ActiveOnly)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        if !password::verify_or_burn(current.expose_secret(), account.password_hash.as_deref()) {
            return Err(AuthError::WrongCurrentPassword);
        }
        password::check_strength(new.expose_secret())?;

        account.password_hash = Some(password::hash(new.expose_secret())?);
        self.store.update_account(&account).await?;
        info!(account_id = %account.id, "password changed");
        Ok(())
    }

    /// Consume an email-verification token and mark the account verified.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidOrExpiredToken`] for any unusable token; the exact
    /// reason is deliberately not distinguished.
    pub async fn verify_email(&self, token: &str) -> AuthResult<()> {
        let challenge = self
            .challenges
            .consume(token, ChallengePurpose::EmailVerify)
            .await
            .map_err(|err| match err {
                AuthError::Storage(err) => AuthError::Storage(err),
                _ => AuthError::InvalidOrExpiredToken,
            })?;

        let account_id = challenge.account_id.ok_or(AuthError::InvalidOrExpiredToken)?;
        let mut account = self
            .store
            .account_by_id(account_id, Visibility::ActiveOnly)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        account.email_verified = true;
        self.store.update_account(&account).await?;
        info!(account_id = %account.id, "email verified");
        Ok(())
    }

    /// Request a password reset. Outwardly always succeeds; only a real,
    /// active account produces an outbound email.
    ///
    /// # Errors
    ///
    /// Only storage/mailer failures surface.
    pub async fn request_password_reset(&self, email: &str) -> AuthResult<()> {
        let email = normalize_email(email);
        match self
            .store
            .account_by_email(&email, Visibility::ActiveOnly)
            .await?
        {
            Some(account) => {
                let challenge = self
                    .challenges
                    .issue(
                        ChallengePurpose::PasswordReset,
                        Some(account.id),
                        self.config.origin(),
                        self.config.rp_id(),
                    )
                    .await?;
                self.mailer
                    .send_password_reset(&email, &challenge.token)
                    .await?;
            }
            None => {
                // Burn the same token-generation work so the two paths stay
                // aligned, then drop it.
                let _ = crate::challenge::generate_token()?;
            }
        }
        Ok(())
    }

    /// Consume a reset token and set a new password.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidOrExpiredToken`] or [`AuthError::WeakPassword`].
    pub async fn reset_password(&self, token: &str, new: &SecretString) -> AuthResult<()> {
        password::check_strength(new.expose_secret())?;

        let challenge = self
            .challenges
            .consume(token, ChallengePurpose::PasswordReset)
            .await
            .map_err(|err| match err {
                AuthError::Storage(err) => AuthError::Storage(err),
                _ => AuthError::InvalidOrExpiredToken,
            })?;

        let account_id = challenge.account_id.ok_or(AuthError::InvalidOrExpiredToken)?;
        let mut account = self
            .store
            .account_by_id(account_id, Visibility::ActiveOnly)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        account.password_hash = Some(password::hash(new.expose_secret())?);
        self.store.update_account(&account).await?;
        info!(account_id = %account.id, "password reset");
        Ok(())
    }

    /// Soft-delete an account after re-verifying the password.
    ///
    /// Holding a session is not enough to authorize destruction; the caller
    /// proves the password again. Passkey-only accounts must set a password
    /// (via reset) before they can delete themselves.
    ///
    /// # Errors
    ///
    /// [`AuthError::AccountNotFound`] or [`AuthError::WrongCurrentPassword`].
    pub async fn delete_account(
        &self,
        account_id: Uuid,
        confirming_password: &SecretString,
    ) -> AuthResult<()> {
        let mut account = self
            .store
            .account_by_id(account_id, Visibility::ActiveOnly)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        if !password::verify_or_burn(
            confirming_password.expose_secret(),
            account.password_hash.as_deref(),
        ) {
            return Err(AuthError::WrongCurrentPassword);
        }

        account.deleted_at = Some(Utc::now());
        self.store.update_account(&account).await?;
        info!(account_id = %account.id, "account soft-deleted");
        Ok(())
    }

    /// List an account's passkeys, oldest first.
    ///
    /// # Errors
    ///
    /// Storage failures pass through.
    pub async fn list_passkeys(&self, account_id: Uuid) -> AuthResult<Vec<PasskeyCredential>> {
        Ok(self.store.credentials_for_account(account_id).await?)
    }

    /// Rename a passkey the account owns.
    ///
    /// # Errors
    ///
    /// [`AuthError::CredentialNotFound`] when the credential does not exist
    /// or belongs to someone else.
    pub async fn rename_passkey(
        &self,
        account_id: Uuid,
        credential_id: &[u8],
        name: &str,
    ) -> AuthResult<()> {
        let credential = self
            .store
            .credential_by_id(credential_id)
            .await?
            .filter(|credential| credential.account_id == account_id)
            .ok_or(AuthError::CredentialNotFound)?;

        let mut updated = credential.clone();
        updated.name = name.to_string();
        if !self
            .store
            .update_credential(&updated, credential.version)
            .await?
        {
            return Err(AuthError::Storage(anyhow::anyhow!(
                "concurrent update to credential"
            )));
        }
        Ok(())
    }

    /// Delete a passkey. Idempotent: deleting an absent credential is a
    /// no-op reported as `Ok(false)`.
    ///
    /// Removal is blocked when it would leave an active account with no
    /// password and no other passkey, which would lock it out entirely.
    ///
    /// # Errors
    ///
    /// [`AuthError::AccountNotFound`] or [`AuthError::LastCredential`].
    pub async fn delete_passkey(
        &self,
        account_id: Uuid,
        credential_id: &[u8],
    ) -> AuthResult<bool> {
        let account = self
            .store
            .account_by_id(account_id, Visibility::ActiveOnly)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        let owned = self.store.credentials_for_account(account_id).await?;
        let Some(target) = owned
            .iter()
            .find(|credential| credential.id == credential_id)
        else {
            return Ok(false);
        };

        if account.password_hash.is_none() && owned.len() == 1 {
            return Err(AuthError::LastCredential);
        }

        let removed = self.store.delete_credential(&target.id).await?;
        if removed {
            info!(account_id = %account.id, credential = %target.name, "passkey deleted");
        }
        Ok(removed)
    }
}
