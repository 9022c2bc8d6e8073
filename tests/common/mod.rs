//! Shared test fixtures: an in-process soft authenticator that produces real
//! signed WebAuthn responses, a recording mailer, and engine wiring.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Duration;
use ciborium::Value;
use ed25519_dalek::Signer as _;
use p256::ecdsa::signature::Signer as _;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha20Rng;
use secrecy::SecretString;
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex};

use linkgate::ceremony::types::{AuthenticationResponse, RegistrationResponse};
use linkgate::{
    AccountLifecycle, CeremonyEngine, ChallengeTtls, Mailer, MemoryStore, RpConfig, SessionConfig,
    SessionIssuer,
};

pub const RP_ID: &str = "links.example";
pub const ORIGIN: &str = "https://links.example";

const FLAG_UP: u8 = 0x01;
const FLAG_AT: u8 = 0x40;

pub fn secret(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

/// Everything a ceremony test needs, wired against one in-memory store.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub engine: CeremonyEngine<MemoryStore>,
    pub lifecycle: AccountLifecycle<MemoryStore>,
    pub sessions: Arc<SessionIssuer>,
    pub mailer: Arc<RecordingMailer>,
}

pub fn harness() -> Harness {
    harness_with_origin(ORIGIN)
}

pub fn harness_with_origin(origin: &str) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let config = RpConfig::new(RP_ID, "Linkgate", origin).unwrap();
    let session_config = SessionConfig::new(
        secret("an-hs256-signing-key-of-32-bytes!"),
        Duration::hours(1),
    )
    .unwrap();
    let sessions = Arc::new(SessionIssuer::new(&session_config));
    let mailer = Arc::new(RecordingMailer::default());

    let engine = CeremonyEngine::new(
        Arc::clone(&store),
        config.clone(),
        ChallengeTtls::default(),
        Arc::clone(&sessions),
        Arc::clone(&mailer) as Arc<dyn Mailer>,
    );
    let lifecycle = AccountLifecycle::new(
        Arc::clone(&store),
        config,
        ChallengeTtls::default(),
        Arc::clone(&sessions),
        Arc::clone(&mailer) as Arc<dyn Mailer>,
    );

    Harness {
        store,
        engine,
        lifecycle,
        sessions,
        mailer,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailKind {
    Verification,
    Reset,
    CloneAlert,
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub kind: MailKind,
    pub email: String,
    pub token: String,
}

/// Mailer that records what would have been delivered.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_token(&self, kind: MailKind) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|mail| mail.kind == kind)
            .map(|mail| mail.token.clone())
    }

    fn record(&self, kind: MailKind, email: &str, token: &str) {
        self.sent.lock().unwrap().push(SentMail {
            kind,
            email: email.to_string(),
            token: token.to_string(),
        });
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_email_verification(&self, email: &str, token: &str) -> anyhow::Result<()> {
        self.record(MailKind::Verification, email, token);
        Ok(())
    }

    async fn send_password_reset(&self, email: &str, token: &str) -> anyhow::Result<()> {
        self.record(MailKind::Reset, email, token);
        Ok(())
    }

    async fn send_clone_alert(&self, email: &str, credential_name: &str) -> anyhow::Result<()> {
        self.record(MailKind::CloneAlert, email, credential_name);
        Ok(())
    }
}

enum SoftKey {
    P256(p256::ecdsa::SigningKey),
    Ed25519(ed25519_dalek::SigningKey),
}

/// A deterministic software passkey. Produces responses that are correctly
/// signed over whatever challenge/origin it is asked to answer for, which
/// lets tests exercise both the happy path and deliberate binding mismatches.
pub struct SoftPasskey {
    key: SoftKey,
    pub credential_id: Vec<u8>,
    pub rp_id: String,
    pub origin: String,
}

impl SoftPasskey {
    pub fn p256(seed: u64) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let signing = p256::ecdsa::SigningKey::random(&mut rng);
        let credential_id = Sha256::digest(seed.to_be_bytes()).to_vec();
        Self {
            key: SoftKey::P256(signing),
            credential_id,
            rp_id: RP_ID.to_string(),
            origin: ORIGIN.to_string(),
        }
    }

    pub fn ed25519(seed: u64) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let signing = ed25519_dalek::SigningKey::generate(&mut rng);
        let credential_id = Sha256::digest(seed.to_le_bytes()).to_vec();
        Self {
            key: SoftKey::Ed25519(signing),
            credential_id,
            rp_id: RP_ID.to_string(),
            origin: ORIGIN.to_string(),
        }
    }

    pub fn with_origin(mut self, origin: &str) -> Self {
        self.origin = origin.to_string();
        self
    }

    fn cose_public_key(&self) -> Vec<u8> {
        let map = match &self.key {
            SoftKey::P256(signing) => {
                let point = signing.verifying_key().to_encoded_point(false);
                Value::Map(vec![
                    (Value::Integer(1.into()), Value::Integer(2.into())),
                    (Value::Integer(3.into()), Value::Integer((-7).into())),
                    (Value::Integer((-1).into()), Value::Integer(1.into())),
                    (
                        Value::Integer((-2).into()),
                        Value::Bytes(point.x().unwrap().to_vec()),
                    ),
                    (
                        Value::Integer((-3).into()),
                        Value::Bytes(point.y().unwrap().to_vec()),
                    ),
                ])
            }
            SoftKey::Ed25519(signing) => Value::Map(vec![
                (Value::Integer(1.into()), Value::Integer(1.into())),
                (Value::Integer(3.into()), Value::Integer((-8).into())),
                (Value::Integer((-1).into()), Value::Integer(6.into())),
                (
                    Value::Integer((-2).into()),
                    Value::Bytes(signing.verifying_key().to_bytes().to_vec()),
                ),
            ]),
        };
        let mut out = Vec::new();
        ciborium::ser::into_writer(&map, &mut out).unwrap();
        out
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        match &self.key {
            SoftKey::P256(signing) => {
                let signature: p256::ecdsa::Signature = signing.sign(message);
                signature.to_der().as_bytes().to_vec()
            }
            SoftKey::Ed25519(signing) => signing.sign(message).to_bytes().to_vec(),
        }
    }

    fn client_data(&self, ceremony_type: &str, challenge: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "type": ceremony_type,
            "challenge": challenge,
            "origin": self.origin,
            "crossOrigin": false,
        }))
        .unwrap()
    }

    fn auth_data(&self, sign_count: u32, attested: bool) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&Sha256::digest(self.rp_id.as_bytes()));
        data.push(if attested { FLAG_UP | FLAG_AT } else { FLAG_UP });
        data.extend_from_slice(&sign_count.to_be_bytes());
        if attested {
            data.extend_from_slice(&[0u8; 16]); // aaguid
            let id_len = u16::try_from(self.credential_id.len()).unwrap();
            data.extend_from_slice(&id_len.to_be_bytes());
            data.extend_from_slice(&self.credential_id);
            data.extend_from_slice(&self.cose_public_key());
        }
        data
    }

    /// Answer a registration ceremony ("none" attestation).
    pub fn register(&self, challenge: &str) -> RegistrationResponse {
        let client_data = self.client_data("webauthn.create", challenge);
        let attestation = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("none".into())),
            (Value::Text("attStmt".into()), Value::Map(vec![])),
            (
                Value::Text("authData".into()),
                Value::Bytes(self.auth_data(0, true)),
            ),
        ]);
        let mut attestation_raw = Vec::new();
        ciborium::ser::into_writer(&attestation, &mut attestation_raw).unwrap();

        RegistrationResponse {
            id: b64(&self.credential_id),
            client_data_json: b64(&client_data),
            attestation_object: b64(&attestation_raw),
        }
    }

    /// Answer a registration ceremony with packed self-attestation.
    pub fn register_packed(&self, challenge: &str) -> RegistrationResponse {
        let client_data = self.client_data("webauthn.create", challenge);
        let auth_data = self.auth_data(0, true);

        let mut input = auth_data.clone();
        input.extend_from_slice(&Sha256::digest(&client_data));
        let signature = self.sign(&input);

        let alg: i64 = match &self.key {
            SoftKey::P256(_) => -7,
            SoftKey::Ed25519(_) => -8,
        };
        let attestation = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("packed".into())),
            (
                Value::Text("attStmt".into()),
                Value::Map(vec![
                    (Value::Text("alg".into()), Value::Integer(alg.into())),
                    (Value::Text("sig".into()), Value::Bytes(signature)),
                ]),
            ),
            (Value::Text("authData".into()), Value::Bytes(auth_data)),
        ]);
        let mut attestation_raw = Vec::new();
        ciborium::ser::into_writer(&attestation, &mut attestation_raw).unwrap();

        RegistrationResponse {
            id: b64(&self.credential_id),
            client_data_json: b64(&client_data),
            attestation_object: b64(&attestation_raw),
        }
    }

    /// Answer an authentication ceremony, reporting `sign_count`.
    pub fn authenticate(&self, challenge: &str, sign_count: u32) -> AuthenticationResponse {
        let client_data = self.client_data("webauthn.get", challenge);
        let auth_data = self.auth_data(sign_count, false);

        let mut input = auth_data.clone();
        input.extend_from_slice(&Sha256::digest(&client_data));
        let signature = self.sign(&input);

        AuthenticationResponse {
            id: b64(&self.credential_id),
            client_data_json: b64(&client_data),
            authenticator_data: b64(&auth_data),
            signature: b64(&signature),
        }
    }
}

pub fn b64(data: &[u8]) -> String {
    linkgate::codec::encode(data)
}
