//! Wire envelopes for the WebAuthn ceremonies.
//!
//! Every binary field is transported as unpadded base64url (see
//! [`crate::codec`]). Envelopes this crate defines reject unknown fields;
//! `clientDataJSON` is produced by browsers, which add keys over time, so it
//! is parsed into the fields the protocol checks and tolerates the rest.

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// COSE algorithm identifiers the engine accepts.
pub const ALG_ES256: i64 = -7;
pub const ALG_EDDSA: i64 = -8;

#[derive(Debug, Clone, Serialize)]
pub struct RelyingParty {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    /// Account id bytes, base64url.
    pub id: String,
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialParameters {
    #[serde(rename = "type")]
    pub credential_type: &'static str,
    pub alg: i64,
}

/// Reference to an already-registered credential, used in exclude/allow lists.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialDescriptor {
    #[serde(rename = "type")]
    pub credential_type: &'static str,
    /// Credential id, base64url.
    pub id: String,
}

impl CredentialDescriptor {
    #[must_use]
    pub fn new(id: String) -> Self {
        Self {
            credential_type: "public-key",
            id,
        }
    }
}

/// Options payload for `navigator.credentials.create`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationOptions {
    pub rp: RelyingParty,
    pub user: UserEntity,
    pub challenge: String,
    pub pub_key_cred_params: Vec<CredentialParameters>,
    /// Milliseconds.
    pub timeout: u64,
    /// Credential ids the authenticator must refuse to re-register, derived
    /// from the account's stored credentials.
    pub exclude_credentials: Vec<CredentialDescriptor>,
    pub attestation: &'static str,
}

/// Options payload for `navigator.credentials.get`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    pub challenge: String,
    pub rp_id: String,
    /// Milliseconds.
    pub timeout: u64,
    /// The hinted account's credential ids; empty when the hint matched
    /// nothing, with an otherwise identical payload shape.
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub user_verification: &'static str,
}

/// Client response finishing a registration ceremony.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegistrationResponse {
    /// Credential id, base64url.
    pub id: String,
    /// Raw clientDataJSON bytes, base64url.
    pub client_data_json: String,
    /// CBOR attestation object, base64url.
    pub attestation_object: String,
}

/// Client response finishing an authentication ceremony.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuthenticationResponse {
    /// Credential id, base64url.
    pub id: String,
    /// Raw clientDataJSON bytes, base64url.
    pub client_data_json: String,
    /// Raw authenticator data bytes, base64url.
    pub authenticator_data: String,
    /// Assertion signature, base64url (DER for ES256, 64 bytes for EdDSA).
    pub signature: String,
}

/// The fields of clientDataJSON the protocol verifies.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub ceremony_type: String,
    /// Echo of the issued challenge token (base64url of the challenge bytes).
    pub challenge: String,
    pub origin: String,
    #[serde(rename = "crossOrigin", default)]
    pub cross_origin: bool,
}

impl CollectedClientData {
    /// Parse raw clientDataJSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MalformedResponse`] when the payload is not the
    /// expected JSON shape.
    pub fn parse(raw: &[u8]) -> AuthResult<Self> {
        serde_json::from_slice(raw).map_err(|_| AuthError::MalformedResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_data_tolerates_extra_browser_fields() {
        let raw = br#"{
            "type": "webauthn.get",
            "challenge": "abc",
            "origin": "https://links.example",
            "crossOrigin": false,
            "other_keys_can_be_added_here": "ignore me"
        }"#;
        let parsed = CollectedClientData::parse(raw).unwrap();
        assert_eq!(parsed.ceremony_type, "webauthn.get");
        assert_eq!(parsed.challenge, "abc");
        assert!(!parsed.cross_origin);
    }

    #[test]
    fn client_data_requires_core_fields() {
        let raw = br#"{"type": "webauthn.get", "origin": "https://links.example"}"#;
        assert!(matches!(
            CollectedClientData::parse(raw),
            Err(AuthError::MalformedResponse)
        ));
    }

    #[test]
    fn finish_envelopes_reject_unknown_fields() {
        let raw = r#"{
            "id": "abc",
            "clientDataJSON": "e30",
            "attestationObject": "e30",
            "extra": true
        }"#;
        assert!(serde_json::from_str::<RegistrationResponse>(raw).is_err());
    }
}
