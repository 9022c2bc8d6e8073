//! Error taxonomy for the authentication core.
//!
//! Every failure a caller can act on is a distinct variant; enumeration-sensitive
//! paths (login, password-reset requests, authentication start) collapse their
//! internal failures into a single outward variant before returning.

use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Generic login failure. Covers unknown account, wrong password, deleted
    /// account, and passwordless account alike so the shapes are identical.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// Registration with an email already held by a non-deleted account.
    /// The one accepted enumeration leak.
    #[error("email already registered")]
    EmailTaken,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("password does not meet minimum requirements")]
    WeakPassword,

    #[error("challenge not found")]
    ChallengeNotFound,
    #[error("challenge expired")]
    ChallengeExpired,
    /// A concurrent consumer won the race. Non-retryable.
    #[error("challenge already consumed")]
    ChallengeAlreadyConsumed,
    #[error("challenge issued for a different purpose")]
    ChallengeWrongPurpose,

    #[error("client data type does not match the ceremony")]
    CeremonyTypeMismatch,
    #[error("response origin does not match the issued challenge")]
    OriginMismatch,
    #[error("relying party id hash does not match")]
    RpIdMismatch,
    #[error("invalid signature")]
    SignatureInvalid,
    #[error("unsupported credential algorithm")]
    UnsupportedAlgorithm,
    #[error("malformed ceremony response")]
    MalformedResponse,
    /// Sign count regression: the credential may have been cloned. Surfaced
    /// distinctly so the account owner can be alerted out-of-band.
    #[error("authenticator sign count regressed; possible cloned credential")]
    PossibleCloneDetected,
    #[error("credential already registered")]
    CredentialAlreadyExists,
    #[error("credential not found")]
    CredentialNotFound,
    /// Removing this credential would leave the account with no way to
    /// authenticate.
    #[error("cannot remove the last usable credential")]
    LastCredential,

    #[error("account not found")]
    AccountNotFound,
    #[error("wrong current password")]
    WrongCurrentPassword,
    /// Verification or reset token that is unknown, expired, or already used.
    /// Deliberately indistinct.
    #[error("invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("session expired")]
    SessionExpired,
    #[error("malformed session token")]
    SessionMalformed,

    #[error("wrong resource secret")]
    WrongSecret,
    #[error("resource is not password protected")]
    ResourceNotProtected,
    #[error("resource not found")]
    ResourceNotFound,
    #[error("resource lock expired")]
    LockExpired,

    #[error("password hashing failed")]
    Hash,
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}
