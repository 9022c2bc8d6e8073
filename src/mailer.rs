//! Outbound email seam.
//!
//! Delivery (SMTP, templating) is an external collaborator; the core only
//! decides *when* mail goes out: verification links at registration, reset
//! links on request, and the clone-detection alert, which is the one failure
//! class that must reach the account owner rather than fail quietly.

use async_trait::async_trait;
use tracing::debug;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email_verification(&self, email: &str, token: &str) -> anyhow::Result<()>;

    async fn send_password_reset(&self, email: &str, token: &str) -> anyhow::Result<()>;

    /// Sent when an authentication is rejected for a sign-count regression.
    async fn send_clone_alert(&self, email: &str, credential_name: &str) -> anyhow::Result<()>;
}

/// Mailer that drops everything on the floor (with a debug trace). Useful for
/// tests and for deployments that handle notification elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMailer;

#[async_trait]
impl Mailer for NullMailer {
    async fn send_email_verification(&self, email: &str, _token: &str) -> anyhow::Result<()> {
        debug!(%email, "skipping verification email (null mailer)");
        Ok(())
    }

    async fn send_password_reset(&self, email: &str, _token: &str) -> anyhow::Result<()> {
        debug!(%email, "skipping password reset email (null mailer)");
        Ok(())
    }

    async fn send_clone_alert(&self, email: &str, credential_name: &str) -> anyhow::Result<()> {
        debug!(%email, credential_name, "skipping clone alert (null mailer)");
        Ok(())
    }
}
