//! Pure cryptographic verification for ceremony responses.
//!
//! Everything in this module is a function of its inputs: authenticator-data
//! parsing, COSE key decoding, and signature verification over
//! `authenticatorData || SHA-256(clientDataJSON)`. Supported credential
//! algorithms are ECDSA P-256 (`ES256`) and Ed25519 (`EdDSA`).

use ciborium::Value;
use ed25519_dalek::{Signature as Ed25519Signature, VerifyingKey as Ed25519VerifyingKey};
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature as P256Signature, VerifyingKey as P256VerifyingKey};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use subtle::ConstantTimeEq;

use crate::ceremony::types::{ALG_EDDSA, ALG_ES256};
use crate::error::{AuthError, AuthResult};

const FLAG_USER_PRESENT: u8 = 0x01;
const FLAG_USER_VERIFIED: u8 = 0x04;
const FLAG_ATTESTED_CREDENTIAL: u8 = 0x40;

/// Credential data embedded in registration authenticator data.
#[derive(Debug, Clone)]
pub struct AttestedCredential {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    /// COSE key, re-encoded from the parsed value.
    pub public_key: Vec<u8>,
}

/// Parsed authenticator data (WebAuthn §6.1 layout).
#[derive(Debug, Clone)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
    pub attested: Option<AttestedCredential>,
}

impl AuthenticatorData {
    /// Parse the fixed header and, when the AT flag is set, the attested
    /// credential block.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MalformedResponse`] on truncated or inconsistent
    /// input.
    pub fn parse(raw: &[u8]) -> AuthResult<Self> {
        if raw.len() < 37 {
            return Err(AuthError::MalformedResponse);
        }
        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&raw[..32]);
        let flags = raw[32];
        let sign_count = u32::from_be_bytes([raw[33], raw[34], raw[35], raw[36]]);

        let attested = if flags & FLAG_ATTESTED_CREDENTIAL != 0 {
            Some(parse_attested_credential(&raw[37..])?)
        } else {
            None
        };

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested,
        })
    }

    #[must_use]
    pub fn user_present(&self) -> bool {
        self.flags & FLAG_USER_PRESENT != 0
    }

    #[must_use]
    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_USER_VERIFIED != 0
    }

    /// Constant-time comparison of the rpIdHash against SHA-256 of `rp_id`.
    #[must_use]
    pub fn matches_rp_id(&self, rp_id: &str) -> bool {
        let expected = Sha256::digest(rp_id.as_bytes());
        expected.as_slice().ct_eq(&self.rp_id_hash).into()
    }
}

fn parse_attested_credential(raw: &[u8]) -> AuthResult<AttestedCredential> {
    // aaguid (16) || credentialIdLength (2, BE) || credentialId || COSE key
    if raw.len() < 18 {
        return Err(AuthError::MalformedResponse);
    }
    let mut aaguid = [0u8; 16];
    aaguid.copy_from_slice(&raw[..16]);
    let id_len = usize::from(u16::from_be_bytes([raw[16], raw[17]]));
    if id_len == 0 || raw.len() < 18 + id_len {
        return Err(AuthError::MalformedResponse);
    }
    let credential_id = raw[18..18 + id_len].to_vec();

    // The COSE key is one CBOR item; extensions may follow it.
    let mut cursor = Cursor::new(&raw[18 + id_len..]);
    let key: Value = ciborium::de::from_reader(&mut cursor)
        .map_err(|_| AuthError::MalformedResponse)?;
    let mut public_key = Vec::new();
    ciborium::ser::into_writer(&key, &mut public_key)
        .map_err(|_| AuthError::MalformedResponse)?;

    Ok(AttestedCredential {
        aaguid,
        credential_id,
        public_key,
    })
}

/// A decoded COSE credential public key.
#[derive(Debug, Clone)]
pub enum CoseKey {
    EcdsaP256(P256VerifyingKey),
    Ed25519(Ed25519VerifyingKey),
}

impl CoseKey {
    /// Decode a COSE_Key map.
    ///
    /// # Errors
    ///
    /// [`AuthError::UnsupportedAlgorithm`] for key types/algorithms outside
    /// ES256 and EdDSA; [`AuthError::MalformedResponse`] for structurally
    /// invalid keys.
    pub fn parse(cose: &[u8]) -> AuthResult<Self> {
        let value: Value =
            ciborium::de::from_reader(cose).map_err(|_| AuthError::MalformedResponse)?;
        let Value::Map(entries) = value else {
            return Err(AuthError::MalformedResponse);
        };

        let kty = map_int(&entries, 1).ok_or(AuthError::MalformedResponse)?;
        let alg = map_int(&entries, 3).ok_or(AuthError::MalformedResponse)?;
        let crv = map_int(&entries, -1).ok_or(AuthError::MalformedResponse)?;

        match (kty, alg, crv) {
            // EC2 / ES256 / P-256
            (2, a, 1) if a == i128::from(ALG_ES256) => {
                let x = map_bytes(&entries, -2).ok_or(AuthError::MalformedResponse)?;
                let y = map_bytes(&entries, -3).ok_or(AuthError::MalformedResponse)?;
                if x.len() != 32 || y.len() != 32 {
                    return Err(AuthError::MalformedResponse);
                }
                let mut sec1 = Vec::with_capacity(65);
                sec1.push(0x04);
                sec1.extend_from_slice(x);
                sec1.extend_from_slice(y);
                let key = P256VerifyingKey::from_sec1_bytes(&sec1)
                    .map_err(|_| AuthError::MalformedResponse)?;
                Ok(Self::EcdsaP256(key))
            }
            // OKP / EdDSA / Ed25519
            (1, a, 6) if a == i128::from(ALG_EDDSA) => {
                let x = map_bytes(&entries, -2).ok_or(AuthError::MalformedResponse)?;
                let bytes: [u8; 32] = x.try_into().map_err(|_| AuthError::MalformedResponse)?;
                let key = Ed25519VerifyingKey::from_bytes(&bytes)
                    .map_err(|_| AuthError::MalformedResponse)?;
                Ok(Self::Ed25519(key))
            }
            _ => Err(AuthError::UnsupportedAlgorithm),
        }
    }

    /// COSE algorithm identifier of this key.
    #[must_use]
    pub fn algorithm(&self) -> i64 {
        match self {
            Self::EcdsaP256(_) => ALG_ES256,
            Self::Ed25519(_) => ALG_EDDSA,
        }
    }

    /// Verify `signature` over `message`. ES256 signatures are ASN.1 DER;
    /// EdDSA signatures are the raw 64 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SignatureInvalid`] when the signature does not
    /// verify or cannot be decoded.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> AuthResult<()> {
        match self {
            Self::EcdsaP256(key) => {
                let signature =
                    P256Signature::from_der(signature).map_err(|_| AuthError::SignatureInvalid)?;
                key.verify(message, &signature)
                    .map_err(|_| AuthError::SignatureInvalid)
            }
            Self::Ed25519(key) => {
                let signature = Ed25519Signature::from_slice(signature)
                    .map_err(|_| AuthError::SignatureInvalid)?;
                key.verify(message, &signature)
                    .map_err(|_| AuthError::SignatureInvalid)
            }
        }
    }
}

fn map_int(entries: &[(Value, Value)], label: i128) -> Option<i128> {
    entries.iter().find_map(|(key, value)| match (key, value) {
        (Value::Integer(k), Value::Integer(v)) if i128::from(*k) == label => {
            Some(i128::from(*v))
        }
        _ => None,
    })
}

fn map_bytes<'a>(entries: &'a [(Value, Value)], label: i128) -> Option<&'a [u8]> {
    entries.iter().find_map(|(key, value)| match (key, value) {
        (Value::Integer(k), Value::Bytes(v)) if i128::from(*k) == label => Some(v.as_slice()),
        _ => None,
    })
}

fn map_get<'a>(entries: &'a [(Value, Value)], label: &str) -> Option<&'a Value> {
    entries.iter().find_map(|(key, value)| match key {
        Value::Text(k) if k == label => Some(value),
        _ => None,
    })
}

/// A parsed attestation object.
#[derive(Debug)]
pub struct AttestationObject {
    pub format: String,
    /// Raw authenticator data bytes (also the attestation signing input).
    pub auth_data: Vec<u8>,
    /// Self-attestation statement, when the format carries one.
    pub statement: Option<PackedStatement>,
}

#[derive(Debug)]
pub struct PackedStatement {
    pub alg: i128,
    pub signature: Vec<u8>,
    pub has_certificates: bool,
}

/// Decode the CBOR attestation object envelope.
///
/// # Errors
///
/// [`AuthError::MalformedResponse`] when the CBOR structure is not the
/// expected map, [`AuthError::UnsupportedAlgorithm`] for attestation formats
/// other than `none` and `packed`.
pub fn parse_attestation_object(raw: &[u8]) -> AuthResult<AttestationObject> {
    let value: Value = ciborium::de::from_reader(raw).map_err(|_| AuthError::MalformedResponse)?;
    let Value::Map(entries) = value else {
        return Err(AuthError::MalformedResponse);
    };

    let format = match map_get(&entries, "fmt") {
        Some(Value::Text(fmt)) => fmt.clone(),
        _ => return Err(AuthError::MalformedResponse),
    };
    let auth_data = match map_get(&entries, "authData") {
        Some(Value::Bytes(bytes)) => bytes.clone(),
        _ => return Err(AuthError::MalformedResponse),
    };
    let statement_entries = match map_get(&entries, "attStmt") {
        Some(Value::Map(map)) => map,
        _ => return Err(AuthError::MalformedResponse),
    };

    let statement = match format.as_str() {
        "none" => None,
        "packed" => {
            let alg = match map_get(statement_entries, "alg") {
                Some(Value::Integer(alg)) => i128::from(*alg),
                _ => return Err(AuthError::MalformedResponse),
            };
            let signature = match map_get(statement_entries, "sig") {
                Some(Value::Bytes(bytes)) => bytes.clone(),
                _ => return Err(AuthError::MalformedResponse),
            };
            let has_certificates = map_get(statement_entries, "x5c").is_some();
            Some(PackedStatement {
                alg,
                signature,
                has_certificates,
            })
        }
        _ => return Err(AuthError::UnsupportedAlgorithm),
    };

    Ok(AttestationObject {
        format,
        auth_data,
        statement,
    })
}

/// SHA-256 of the raw clientDataJSON bytes, the second half of every
/// ceremony signing input.
#[must_use]
pub fn client_data_hash(client_data_json: &[u8]) -> [u8; 32] {
    Sha256::digest(client_data_json).into()
}

/// Build the assertion/attestation signing input.
#[must_use]
pub fn signing_input(auth_data: &[u8], client_data_json: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(auth_data.len() + 32);
    input.extend_from_slice(auth_data);
    input.extend_from_slice(&client_data_hash(client_data_json));
    input
}
