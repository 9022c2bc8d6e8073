//! # Linkgate (authentication core)
//!
//! `linkgate` is the identity and access-control core of a self-hosted
//! short-link service. It owns everything with protocol state or
//! cryptographic correctness requirements and nothing else:
//!
//! - **Accounts & credentials**: password (argon2) and any number of WebAuthn
//!   passkeys per account, with an explicit active/deleted lifecycle.
//! - **Ceremonies**: passkey registration and authentication split around
//!   server-held, single-use challenges; ECDSA P-256 and Ed25519 credentials;
//!   sign-count clone detection.
//! - **Challenges**: one-time tokens shared by ceremonies, email
//!   verification, and password reset, with atomic consumption.
//! - **Sessions**: stateless HS256 bearer tokens snapshotting the account's
//!   verified/admin flags at issuance. [`session::SessionIssuer::verify`] is
//!   the single decode point the rest of the product authorizes against.
//! - **Resource locks**: the per-link password gate, fully decoupled from
//!   account identity so anonymous visitors can open protected links.
//!
//! Link CRUD, analytics, QR rendering, rate limiting, HTTP routing, and SMTP
//! delivery are external collaborators; they consume this crate through the
//! types re-exported below and the [`store`] and [`mailer`] seams.

pub mod ceremony;
pub mod challenge;
pub mod codec;
pub mod error;
pub mod lifecycle;
pub mod lock;
pub mod mailer;
pub mod models;
pub mod password;
pub mod session;
pub mod store;

pub use ceremony::{CeremonyEngine, RpConfig};
pub use challenge::{ChallengeManager, ChallengeTtls};
pub use error::{AuthError, AuthResult};
pub use lifecycle::AccountLifecycle;
pub use lock::ResourceLockGate;
pub use mailer::{Mailer, NullMailer};
pub use models::{
    Account, AccountState, Challenge, ChallengePurpose, PasskeyCredential, ResourceLock,
    Visibility,
};
pub use session::{Session, SessionClaims, SessionConfig, SessionIssuer};
pub use store::memory::MemoryStore;
