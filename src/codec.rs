//! Base64url transport codec.
//!
//! Every binary field that crosses the wire (challenges, credential ids,
//! authenticator payloads) goes through this pair. The encoding is unpadded
//! base64url; padded or non-url-safe input is rejected rather than fixed up.

use base64ct::{Base64UrlUnpadded, Encoding};

use crate::error::{AuthError, AuthResult};

/// Encode bytes as unpadded base64url.
#[must_use]
pub fn encode(data: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(data)
}

/// Decode an unpadded base64url string.
///
/// # Errors
///
/// Returns [`AuthError::MalformedResponse`] if the input is not valid
/// unpadded base64url.
pub fn decode(data: &str) -> AuthResult<Vec<u8>> {
    Base64UrlUnpadded::decode_vec(data).map_err(|_| AuthError::MalformedResponse)
}
