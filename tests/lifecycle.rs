//! Account lifecycle flows: signup, verification, login, password change and
//! reset, passkey management, and deletion.

mod common;

use common::{harness, secret, Harness, MailKind, SoftPasskey};
use linkgate::store::AccountStore;
use linkgate::{Account, AuthError, Visibility};

const PASSWORD: &str = "correct horse battery";

async fn signup(harness: &Harness, email: &str) -> Account {
    harness
        .lifecycle
        .register(email, Some(&secret(PASSWORD)))
        .await
        .unwrap()
}

#[tokio::test]
async fn signup_verify_login_round_trip() {
    let harness = harness();
    let account = signup(&harness, "alice@example.com").await;
    assert!(!account.email_verified);

    let token = harness.mailer.last_token(MailKind::Verification).unwrap();
    harness.lifecycle.verify_email(&token).await.unwrap();

    let session = harness
        .lifecycle
        .login("alice@example.com", &secret(PASSWORD))
        .await
        .unwrap();
    let claims = harness.sessions.verify(&session.token).unwrap();
    assert_eq!(claims.sub, account.id);
    assert!(claims.email_verified);
}

#[tokio::test]
async fn email_is_normalized_before_uniqueness_and_login() {
    let harness = harness();
    signup(&harness, "  Bob@Example.COM ").await;

    assert!(matches!(
        harness
            .lifecycle
            .register("bob@example.com", Some(&secret(PASSWORD)))
            .await,
        Err(AuthError::EmailTaken)
    ));
    harness
        .lifecycle
        .login("BOB@example.com", &secret(PASSWORD))
        .await
        .unwrap();
}

#[tokio::test]
async fn verification_token_is_single_use() {
    let harness = harness();
    signup(&harness, "carol@example.com").await;

    let token = harness.mailer.last_token(MailKind::Verification).unwrap();
    harness.lifecycle.verify_email(&token).await.unwrap();
    assert!(matches!(
        harness.lifecycle.verify_email(&token).await,
        Err(AuthError::InvalidOrExpiredToken)
    ));
}

#[tokio::test]
async fn login_failures_are_uniform() {
    let harness = harness();
    signup(&harness, "dave@example.com").await;

    // Wrong password, unknown account, and passkey-only account all collapse
    // into the same error.
    assert!(matches!(
        harness
            .lifecycle
            .login("dave@example.com", &secret("not the password"))
            .await,
        Err(AuthError::InvalidCredentials)
    ));
    assert!(matches!(
        harness
            .lifecycle
            .login("nobody@example.com", &secret(PASSWORD))
            .await,
        Err(AuthError::InvalidCredentials)
    ));

    harness
        .lifecycle
        .register("keyonly@example.com", None)
        .await
        .unwrap();
    assert!(matches!(
        harness
            .lifecycle
            .login("keyonly@example.com", &secret(PASSWORD))
            .await,
        Err(AuthError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn change_password_invalidates_the_old_one() {
    let harness = harness();
    let account = signup(&harness, "erin@example.com").await;

    harness
        .lifecycle
        .change_password(account.id, &secret(PASSWORD), &secret("a brand new phrase"))
        .await
        .unwrap();

    assert!(matches!(
        harness
            .lifecycle
            .login("erin@example.com", &secret(PASSWORD))
            .await,
        Err(AuthError::InvalidCredentials)
    ));
    harness
        .lifecycle
        .login("erin@example.com", &secret("a brand new phrase"))
        .await
        .unwrap();
}

#[tokio::test]
async fn change_password_requires_the_current_one() {
    let harness = harness();
    let account = signup(&harness, "frank@example.com").await;

    assert!(matches!(
        harness
            .lifecycle
            .change_password(account.id, &secret("guess"), &secret("a brand new phrase"))
            .await,
        Err(AuthError::WrongCurrentPassword)
    ));
    assert!(matches!(
        harness
            .lifecycle
            .change_password(account.id, &secret(PASSWORD), &secret("short"))
            .await,
        Err(AuthError::WeakPassword)
    ));
}

#[tokio::test]
async fn reset_request_is_silent_about_account_existence() {
    let harness = harness();
    signup(&harness, "grace@example.com").await;
    let mails_before = harness.mailer.sent().len();

    // Both calls succeed identically; only the real address produces mail.
    harness
        .lifecycle
        .request_password_reset("ghost@example.com")
        .await
        .unwrap();
    assert_eq!(harness.mailer.sent().len(), mails_before);

    harness
        .lifecycle
        .request_password_reset("grace@example.com")
        .await
        .unwrap();
    assert_eq!(harness.mailer.sent().len(), mails_before + 1);

    let token = harness.mailer.last_token(MailKind::Reset).unwrap();
    harness
        .lifecycle
        .reset_password(&token, &secret("a brand new phrase"))
        .await
        .unwrap();
    harness
        .lifecycle
        .login("grace@example.com", &secret("a brand new phrase"))
        .await
        .unwrap();
}

#[tokio::test]
async fn reset_token_survives_a_weak_password_attempt() {
    let harness = harness();
    signup(&harness, "heidi@example.com").await;
    harness
        .lifecycle
        .request_password_reset("heidi@example.com")
        .await
        .unwrap();
    let token = harness.mailer.last_token(MailKind::Reset).unwrap();

    // Strength is checked before the token is spent.
    assert!(matches!(
        harness.lifecycle.reset_password(&token, &secret("short")).await,
        Err(AuthError::WeakPassword)
    ));
    harness
        .lifecycle
        .reset_password(&token, &secret("a brand new phrase"))
        .await
        .unwrap();
}

#[tokio::test]
async fn deleted_account_disappears_from_login_and_frees_the_email() {
    let harness = harness();
    let account = signup(&harness, "ivan@example.com").await;

    assert!(matches!(
        harness
            .lifecycle
            .delete_account(account.id, &secret("wrong"))
            .await,
        Err(AuthError::WrongCurrentPassword)
    ));
    harness
        .lifecycle
        .delete_account(account.id, &secret(PASSWORD))
        .await
        .unwrap();

    assert!(matches!(
        harness
            .lifecycle
            .login("ivan@example.com", &secret(PASSWORD))
            .await,
        Err(AuthError::InvalidCredentials)
    ));

    // The tombstone is still reachable for audit, but not for auth flows.
    let tombstone = harness
        .store
        .account_by_id(account.id, Visibility::IncludeDeleted)
        .await
        .unwrap()
        .unwrap();
    assert!(tombstone.deleted_at.is_some());

    // The address can be registered again.
    signup(&harness, "ivan@example.com").await;
}

#[tokio::test]
async fn passkey_rename_is_scoped_to_the_owner() {
    let harness = harness();
    let passkey = SoftPasskey::p256(21);
    let owner = signup(&harness, "judy@example.com").await;
    let other = signup(&harness, "mallory@example.com").await;

    let options = harness.engine.registration_start(owner.id).await.unwrap();
    harness
        .engine
        .registration_finish(&passkey.register(&options.challenge), "laptop")
        .await
        .unwrap();

    assert!(matches!(
        harness
            .lifecycle
            .rename_passkey(other.id, &passkey.credential_id, "stolen")
            .await,
        Err(AuthError::CredentialNotFound)
    ));

    harness
        .lifecycle
        .rename_passkey(owner.id, &passkey.credential_id, "work laptop")
        .await
        .unwrap();
    let listed = harness.lifecycle.list_passkeys(owner.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "work laptop");
}

#[tokio::test]
async fn last_passkey_of_a_passwordless_account_cannot_be_deleted() {
    let harness = harness();
    let passkey = SoftPasskey::p256(22);
    let account = harness
        .lifecycle
        .register("keyonly2@example.com", None)
        .await
        .unwrap();

    let options = harness.engine.registration_start(account.id).await.unwrap();
    harness
        .engine
        .registration_finish(&passkey.register(&options.challenge), "phone")
        .await
        .unwrap();

    assert!(matches!(
        harness
            .lifecycle
            .delete_passkey(account.id, &passkey.credential_id)
            .await,
        Err(AuthError::LastCredential)
    ));

    // A second passkey unblocks removal of the first.
    let backup = SoftPasskey::ed25519(23);
    let options = harness.engine.registration_start(account.id).await.unwrap();
    harness
        .engine
        .registration_finish(&backup.register(&options.challenge), "backup")
        .await
        .unwrap();

    assert!(harness
        .lifecycle
        .delete_passkey(account.id, &passkey.credential_id)
        .await
        .unwrap());
    // Idempotent: a second delete reports nothing removed.
    assert!(!harness
        .lifecycle
        .delete_passkey(account.id, &passkey.credential_id)
        .await
        .unwrap());
}

#[tokio::test]
async fn last_passkey_with_a_password_fallback_can_go() {
    let harness = harness();
    let passkey = SoftPasskey::p256(24);
    let account = signup(&harness, "niaj@example.com").await;

    let options = harness.engine.registration_start(account.id).await.unwrap();
    harness
        .engine
        .registration_finish(&passkey.register(&options.challenge), "phone")
        .await
        .unwrap();

    assert!(harness
        .lifecycle
        .delete_passkey(account.id, &passkey.credential_id)
        .await
        .unwrap());
}

#[tokio::test]
async fn malformed_addresses_are_refused_at_signup() {
    let harness = harness();
    for email in ["plainaddress", "a@b", "spaces in@example.com"] {
        assert!(matches!(
            harness
                .lifecycle
                .register(email, Some(&secret(PASSWORD)))
                .await,
            Err(AuthError::InvalidEmail)
        ));
    }
}
