//! WebAuthn ceremony engine.
//!
//! Flow overview:
//! 1) `registration_start` / `authentication_start` issue a single-use
//!    challenge and return the browser options payload. The client holds only
//!    the opaque token; all ceremony state stays server-side.
//! 2) The browser performs the credential operation and returns a response.
//! 3) `*_finish` consumes the challenge named inside the signed client data,
//!    re-checks the origin/RP binding fixed at issuance, verifies the
//!    signature, enforces the sign-count rule, and persists the outcome.
//!
//! Splitting each ceremony around a server-held single-use challenge is what
//! prevents replay; re-checking origin and RP id at finish is what prevents
//! cross-site relay. The monotonic counter is the only freshness signal the
//! authenticator itself provides, so a regression is treated as cloned
//! hardware: rejected, alerted, and stored state left untouched as evidence.

pub mod types;
pub mod verify;

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::challenge::{ChallengeManager, ChallengeTtls};
use crate::codec;
use crate::error::{AuthError, AuthResult};
use crate::mailer::Mailer;
use crate::models::{ChallengePurpose, PasskeyCredential, Visibility};
use crate::session::{Session, SessionIssuer};
use crate::store::{AccountStore, ChallengeStore, CredentialStore};
use types::{
    AuthenticationResponse, CollectedClientData, CreationOptions, CredentialDescriptor,
    CredentialParameters, RegistrationResponse, RelyingParty, RequestOptions, UserEntity,
    ALG_EDDSA, ALG_ES256,
};
use verify::{AuthenticatorData, CoseKey};

const DEFAULT_RP_NAME: &str = "Linkgate";
const ENV_RP_ID: &str = "LINKGATE_RP_ID";
const ENV_RP_NAME: &str = "LINKGATE_RP_NAME";
const ENV_ORIGIN: &str = "LINKGATE_ORIGIN";

const CLIENT_DATA_CREATE: &str = "webauthn.create";
const CLIENT_DATA_GET: &str = "webauthn.get";

/// Relying-party identity every challenge is bound to.
#[derive(Debug, Clone)]
pub struct RpConfig {
    rp_id: String,
    rp_name: String,
    origin: String,
}

impl RpConfig {
    /// Create a validated relying-party configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the RP id is empty or the origin does not parse
    /// as a URL with a host.
    pub fn new(rp_id: &str, rp_name: &str, origin: &str) -> anyhow::Result<Self> {
        let rp_id = rp_id.trim();
        if rp_id.is_empty() {
            anyhow::bail!("relying party id must not be empty");
        }
        Ok(Self {
            rp_id: rp_id.to_string(),
            rp_name: rp_name.trim().to_string(),
            origin: normalize_origin(origin)?,
        })
    }

    /// Build from `LINKGATE_RP_ID` / `LINKGATE_RP_NAME` / `LINKGATE_ORIGIN`.
    ///
    /// # Errors
    ///
    /// Returns an error when required variables are missing or invalid.
    pub fn from_env() -> anyhow::Result<Self> {
        let rp_id = std::env::var(ENV_RP_ID)
            .map_err(|_| anyhow::anyhow!("{ENV_RP_ID} is not set"))?;
        let origin = std::env::var(ENV_ORIGIN)
            .map_err(|_| anyhow::anyhow!("{ENV_ORIGIN} is not set"))?;
        let rp_name = std::env::var(ENV_RP_NAME)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_RP_NAME.to_string());
        Self::new(&rp_id, &rp_name, &origin)
    }

    #[must_use]
    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    #[must_use]
    pub fn rp_name(&self) -> &str {
        &self.rp_name
    }

    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

fn normalize_origin(origin: &str) -> anyhow::Result<String> {
    let parsed = Url::parse(origin).map_err(|_| anyhow::anyhow!("invalid origin URL: {origin}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("origin must include a host: {origin}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    Ok(format!("{}://{}{}", parsed.scheme(), host, port))
}

pub struct CeremonyEngine<S> {
    store: Arc<S>,
    challenges: ChallengeManager<S>,
    sessions: Arc<SessionIssuer>,
    mailer: Arc<dyn Mailer>,
    config: RpConfig,
    ttls: ChallengeTtls,
}

impl<S> CeremonyEngine<S>
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
            challenges: ChallengeManager::new(Arc::clone(&store), ttls.clone()),
            store,
            sessions,
            mailer,
            config,
            ttls,
        }
    }

    fn ceremony_timeout_ms(&self) -> u64 {
        u64::try_from(self.ttls.ceremony.num_milliseconds()).unwrap_or(0)
    }

    /// Begin registering a new passkey for an existing account.
    ///
    /// The exclude list carries the account's registered credential ids so the
    /// client-side authenticator refuses to re-register the same hardware.
    ///
    /// # Errors
    ///
    /// [`AuthError::AccountNotFound`] when the account is missing or deleted;
    /// storage failures pass through.
    pub async fn registration_start(&self, account_id: Uuid) -> AuthResult<CreationOptions> {
        let account = self
            .store
            .account_by_id(account_id, Visibility::ActiveOnly)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        let exclude_credentials = self
            .store
            .credentials_for_account(account.id)
            .await?
            .into_iter()
            .map(|credential| CredentialDescriptor::new(codec::encode(&credential.id)))
            .collect();

        let challenge = self
            .challenges
            .issue(
                ChallengePurpose::PasskeyRegister,
                Some(account.id),
                self.config.origin(),
                self.config.rp_id(),
            )
            .await?;

        Ok(CreationOptions {
            rp: RelyingParty {
                id: self.config.rp_id().to_string(),
                name: self.config.rp_name().to_string(),
            },
            user: UserEntity {
                id: codec::encode(account.id.as_bytes()),
                name: account.email.clone(),
                display_name: account.email,
            },
            challenge: challenge.token,
            pub_key_cred_params: vec![
                CredentialParameters {
                    credential_type: "public-key",
                    alg: ALG_ES256,
                },
                CredentialParameters {
                    credential_type: "public-key",
                    alg: ALG_EDDSA,
                },
            ],
            timeout: self.ceremony_timeout_ms(),
            exclude_credentials,
            attestation: "none",
        })
    }

    /// Verify a registration response and persist the new credential.
    ///
    /// # Errors
    ///
    /// Challenge errors ([`AuthError::ChallengeNotFound`] and friends) when
    /// the embedded token is unusable, [`AuthError::OriginMismatch`] /
    /// [`AuthError::RpIdMismatch`] on binding violations,
    /// [`AuthError::SignatureInvalid`] for bad self-attestation,
    /// [`AuthError::CredentialAlreadyExists`] for duplicate credential ids.
    pub async fn registration_finish(
        &self,
        response: &RegistrationResponse,
        name: &str,
    ) -> AuthResult<PasskeyCredential> {
        let client_data_raw = codec::decode(&response.client_data_json)?;
        let client_data = CollectedClientData::parse(&client_data_raw)?;
        if client_data.ceremony_type != CLIENT_DATA_CREATE {
            return Err(AuthError::CeremonyTypeMismatch);
        }

        // The challenge token is inside the signed client data, so a response
        // built over a different challenge value cannot reach a valid token.
        let challenge = self
            .challenges
            .consume(&client_data.challenge, ChallengePurpose::PasskeyRegister)
            .await?;
        let account_id = challenge.account_id.ok_or(AuthError::ChallengeNotFound)?;

        if client_data.origin != challenge.expected_origin {
            return Err(AuthError::OriginMismatch);
        }

        let attestation_raw = codec::decode(&response.attestation_object)?;
        let attestation = verify::parse_attestation_object(&attestation_raw)?;
        let auth_data = AuthenticatorData::parse(&attestation.auth_data)?;

        if !auth_data.matches_rp_id(&challenge.expected_rp_id) {
            return Err(AuthError::RpIdMismatch);
        }
        if !auth_data.user_present() {
            return Err(AuthError::MalformedResponse);
        }
        let attested = auth_data.attested.ok_or(AuthError::MalformedResponse)?;

        // The envelope's credential id must be the one the authenticator
        // actually attested.
        if codec::decode(&response.id)? != attested.credential_id {
            return Err(AuthError::MalformedResponse);
        }

        let key = CoseKey::parse(&attested.public_key)?;
        if let Some(statement) = &attestation.statement {
            // Packed self-attestation: signed with the credential key itself.
            // Attestation-CA chains are out of scope.
            if statement.has_certificates {
                return Err(AuthError::UnsupportedAlgorithm);
            }
            if statement.alg != i128::from(key.algorithm()) {
                return Err(AuthError::UnsupportedAlgorithm);
            }
            let input = verify::signing_input(&attestation.auth_data, &client_data_raw);
            key.verify(&input, &statement.signature)?;
        }

        let credential = PasskeyCredential {
            id: attested.credential_id,
            account_id,
            public_key: attested.public_key,
            sign_count: auth_data.sign_count,
            name: name.to_string(),
            created_at: Utc::now(),
            last_used_at: None,
            version: 0,
        };
        if !self.store.insert_credential(credential.clone()).await? {
            return Err(AuthError::CredentialAlreadyExists);
        }

        debug!(account_id = %account_id, credential = name, "registered passkey");
        Ok(credential)
    }

    /// Begin passkey authentication.
    ///
    /// An email hint that matches no account still yields a challenge with an
    /// identically shaped payload (empty allow list): existence is not leaked
    /// through error shape, and both paths do the same lookup work.
    ///
    /// # Errors
    ///
    /// Storage failures pass through; an unknown hint is not an error.
    pub async fn authentication_start(&self, email_hint: &str) -> AuthResult<RequestOptions> {
        let email = email_hint.trim().to_lowercase();
        let account = self
            .store
            .account_by_email(&email, Visibility::ActiveOnly)
            .await?;

        let (account_id, allow_credentials) = match account {
            Some(account) => {
                let descriptors = self
                    .store
                    .credentials_for_account(account.id)
                    .await?
                    .into_iter()
                    .map(|credential| CredentialDescriptor::new(codec::encode(&credential.id)))
                    .collect();
                (Some(account.id), descriptors)
            }
            None => (None, Vec::new()),
        };

        let challenge = self
            .challenges
            .issue(
                ChallengePurpose::PasskeyAuthenticate,
                account_id,
                self.config.origin(),
                self.config.rp_id(),
            )
            .await?;

        Ok(RequestOptions {
            challenge: challenge.token,
            rp_id: self.config.rp_id().to_string(),
            timeout: self.ceremony_timeout_ms(),
            allow_credentials,
            user_verification: "preferred",
        })
    }

    /// Verify an assertion and mint a session.
    ///
    /// # Errors
    ///
    /// Challenge errors for an unusable token, [`AuthError::CredentialNotFound`]
    /// when the asserted credential does not resolve,
    /// [`AuthError::OriginMismatch`] / [`AuthError::RpIdMismatch`] on binding
    /// violations, [`AuthError::SignatureInvalid`] for a bad assertion, and
    /// [`AuthError::PossibleCloneDetected`] on a sign-count regression.
    pub async fn authentication_finish(
        &self,
        response: &AuthenticationResponse,
    ) -> AuthResult<Session> {
        let client_data_raw = codec::decode(&response.client_data_json)?;
        let client_data = CollectedClientData::parse(&client_data_raw)?;
        if client_data.ceremony_type != CLIENT_DATA_GET {
            return Err(AuthError::CeremonyTypeMismatch);
        }

        let challenge = self
            .challenges
            .consume(&client_data.challenge, ChallengePurpose::PasskeyAuthenticate)
            .await?;

        if client_data.origin != challenge.expected_origin {
            return Err(AuthError::OriginMismatch);
        }

        let credential_id = codec::decode(&response.id)?;
        let credential = self
            .store
            .credential_by_id(&credential_id)
            .await?
            .ok_or(AuthError::CredentialNotFound)?;

        // A challenge issued with an account hint only authenticates that
        // account's credentials.
        if let Some(bound) = challenge.account_id {
            if bound != credential.account_id {
                return Err(AuthError::CredentialNotFound);
            }
        }

        // Tombstoned accounts are excluded from authentication entirely.
        let account = self
            .store
            .account_by_id(credential.account_id, Visibility::ActiveOnly)
            .await?
            .ok_or(AuthError::CredentialNotFound)?;

        let auth_data_raw = codec::decode(&response.authenticator_data)?;
        let auth_data = AuthenticatorData::parse(&auth_data_raw)?;
        if !auth_data.matches_rp_id(&challenge.expected_rp_id) {
            return Err(AuthError::RpIdMismatch);
        }
        if !auth_data.user_present() {
            return Err(AuthError::MalformedResponse);
        }

        // CPU-bound verification runs on a snapshot; no store locks are held.
        let key = CoseKey::parse(&credential.public_key)?;
        let signature = codec::decode(&response.signature)?;
        let input = verify::signing_input(&auth_data_raw, &client_data_raw);
        key.verify(&input, &signature)?;

        // Strictly increasing, or both zero for counter-less authenticators.
        // On regression the stored value is deliberately not touched: it is
        // the forensic evidence of the clone.
        let counter_ok = auth_data.sign_count > credential.sign_count
            || (auth_data.sign_count == 0 && credential.sign_count == 0);
        if !counter_ok {
            warn!(
                account_id = %account.id,
                credential = %credential.name,
                stored = credential.sign_count,
                presented = auth_data.sign_count,
                "sign count regression; possible cloned credential"
            );
            if let Err(err) = self
                .mailer
                .send_clone_alert(&account.email, &credential.name)
                .await
            {
                warn!("failed to send clone alert: {err}");
            }
            return Err(AuthError::PossibleCloneDetected);
        }

        let mut updated = credential.clone();
        updated.sign_count = auth_data.sign_count;
        updated.last_used_at = Some(Utc::now());
        if !self
            .store
            .update_credential(&updated, credential.version)
            .await?
        {
            return Err(AuthError::Storage(anyhow::anyhow!(
                "concurrent update to credential"
            )));
        }

        debug!(account_id = %account.id, credential = %credential.name, "passkey authentication succeeded");
        self.sessions.mint(&account)
    }
}
