//! Integration tests for the account and session lifecycle.
//!
//! These tests verify:
//! 1. The links queued for outbound mail drive email verification and
//!    password reset end to end, the way a frontend follows them
//! 2. Session tokens issued at login validate, supersede and revoke
//!    through the credential cache
//! 3. Sessions stay independent across users and survive a refresh
//! 4. A password reset rotates the credential and ends live sessions
//!
//! Everything runs against the in-memory store and cache.

use std::sync::Arc;

use inkwell::auth::session::{Registration, SessionService};
use inkwell::auth::token::TokenSecrets;
use inkwell::auth::token::TokenService;
use inkwell::cache::CredentialCache;
use inkwell::config::Config;
use inkwell::jobs::queue::MemoryQueue;
use inkwell::jobs::Job;
use inkwell::store::memory::MemoryStore;

fn test_config() -> Config {
    Config {
        port: 0,
        database_url: String::new(),
        redis_url: String::new(),
        access_token_secret: "access-secret".into(),
        refresh_token_secret: "refresh-secret".into(),
        verify_email_secret: "verify-secret".into(),
        reset_password_secret: "reset-secret".into(),
        frontend_url: "https://app.test".into(),
        contact_email: "support@app.test".into(),
        mail_api_url: None,
        mail_api_key: None,
        mail_from: "no-reply@app.test".into(),
        media_store_url: "memory://".into(),
        media_public_url: "https://cdn.app.test".into(),
        upload_spool_dir: std::env::temp_dir().display().to_string(),
        cors_origins: vec![],
        job_max_attempts: 3,
    }
}

struct Harness {
    sessions: SessionService,
    queue: MemoryQueue,
}

fn harness() -> Harness {
    let users: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let queue = MemoryQueue::new();
    let cfg = test_config();
    let secrets = TokenSecrets::from_config(&cfg);
    let tokens = TokenService::new(CredentialCache::in_memory(), users.clone(), &secrets);
    let sessions = SessionService::new(users, tokens, Arc::new(queue.clone()), &cfg);
    Harness { sessions, queue }
}

fn registration(email: &str) -> Registration {
    Registration {
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        email: email.into(),
        password: "Str0ng!pass".into(),
        bio: None,
    }
}

/// Pull the action link out of the single queued mail, the way the
/// recipient would click it. Drains the queue.
fn queued_link(queue: &MemoryQueue) -> String {
    let jobs = queue.drain();
    assert_eq!(jobs.len(), 1, "expected exactly one queued mail");
    match jobs.into_iter().next().unwrap() {
        Job::SendEmail(mail) => mail.context.link,
        other => panic!("unexpected job {:?}", other),
    }
}

fn link_token(link: &str) -> String {
    link.split("token=").nth(1).unwrap().to_string()
}

mod verification_link_tests {
    use super::*;
    use inkwell::errors::AppError;

    /// The emailed link, not the database row, is what the user has.
    #[tokio::test]
    async fn test_emailed_link_verifies_and_unlocks_login() {
        let h = harness();
        h.sessions.register(registration("ada@calc.org")).await.unwrap();

        let link = queued_link(&h.queue);
        assert!(link.starts_with("https://app.test/verify-email?token="));

        let err = h
            .sessions
            .login("ada@calc.org", "Str0ng!pass", false)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));

        h.sessions.verify_email(&link_token(&link)).await.unwrap();
        h.sessions
            .login("ada@calc.org", "Str0ng!pass", false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_verification_link_is_single_use() {
        let h = harness();
        h.sessions.register(registration("ada@calc.org")).await.unwrap();
        let token = link_token(&queued_link(&h.queue));

        h.sessions.verify_email(&token).await.unwrap();
        let err = h.sessions.verify_email(&token).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_resend_replaces_the_outstanding_link() {
        let h = harness();
        h.sessions.register(registration("ada@calc.org")).await.unwrap();
        let first = link_token(&queued_link(&h.queue));

        h.sessions.resend_verification("ada@calc.org").await.unwrap();
        let second = link_token(&queued_link(&h.queue));

        // the superseded link no longer matches the stored token
        assert!(h.sessions.verify_email(&first).await.is_err());
        h.sessions.verify_email(&second).await.unwrap();
    }
}

mod session_token_tests {
    use super::*;
    use inkwell::auth::token::{REFRESH_REMEMBER_TTL_MS, REFRESH_TTL_MS};
    use inkwell::errors::AppError;

    /// Register, follow the verification link and log in.
    async fn login(h: &Harness, email: &str, remember: bool) -> inkwell::auth::session::LoginSession {
        h.sessions.register(registration(email)).await.unwrap();
        let token = link_token(&queued_link(&h.queue));
        h.sessions.verify_email(&token).await.unwrap();
        h.sessions.login(email, "Str0ng!pass", remember).await.unwrap()
    }

    #[tokio::test]
    async fn test_login_tokens_validate_through_the_token_service() {
        let h = harness();
        let session = login(&h, "ada@calc.org", false).await;

        let who = h
            .sessions
            .tokens()
            .validate_access(&session.access_token)
            .await
            .unwrap();
        assert_eq!(who.email, "ada@calc.org");

        let refresh = h
            .sessions
            .tokens()
            .validate_refresh(&session.refresh_token)
            .await
            .unwrap();
        assert_eq!(refresh.principal.id, who.id);
        assert_eq!(session.refresh_ttl_ms, REFRESH_TTL_MS);
    }

    #[tokio::test]
    async fn test_remember_me_extends_the_refresh_window() {
        let h = harness();
        let session = login(&h, "ada@calc.org", true).await;
        assert_eq!(session.refresh_ttl_ms, REFRESH_REMEMBER_TTL_MS);
        h.sessions
            .tokens()
            .validate_refresh(&session.refresh_token)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_second_login_supersedes_the_first_session() {
        let h = harness();
        let first = login(&h, "ada@calc.org", false).await;
        let second = h
            .sessions
            .login("ada@calc.org", "Str0ng!pass", false)
            .await
            .unwrap();

        assert!(h
            .sessions
            .tokens()
            .validate_access(&second.access_token)
            .await
            .is_ok());
        let err = h
            .sessions
            .tokens()
            .validate_access(&first.access_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_refresh_mints_access_without_rotating_refresh() {
        let h = harness();
        let session = login(&h, "ada@calc.org", false).await;

        let presented = h
            .sessions
            .tokens()
            .validate_refresh(&session.refresh_token)
            .await
            .unwrap();
        let new_access = h.sessions.refresh(&presented).await.unwrap();

        // the fresh access token replaces the login one
        assert!(h.sessions.tokens().validate_access(&new_access).await.is_ok());
        assert!(h
            .sessions
            .tokens()
            .validate_access(&session.access_token)
            .await
            .is_err());

        // the refresh token is left as issued
        h.sessions
            .tokens()
            .validate_refresh(&session.refresh_token)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_logout_ends_both_tokens() {
        let h = harness();
        let session = login(&h, "ada@calc.org", false).await;
        let who = h
            .sessions
            .tokens()
            .validate_access(&session.access_token)
            .await
            .unwrap();

        h.sessions.logout(who.id).await.unwrap();

        assert!(h
            .sessions
            .tokens()
            .validate_access(&session.access_token)
            .await
            .is_err());
        assert!(h
            .sessions
            .tokens()
            .validate_refresh(&session.refresh_token)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_sessions_are_scoped_per_user() {
        let h = harness();
        let ada = login(&h, "ada@calc.org", false).await;
        let grace = login(&h, "grace@navy.mil", false).await;

        let ada_id = h
            .sessions
            .tokens()
            .validate_access(&ada.access_token)
            .await
            .unwrap()
            .id;
        h.sessions.logout(ada_id).await.unwrap();

        assert!(h
            .sessions
            .tokens()
            .validate_access(&ada.access_token)
            .await
            .is_err());
        assert!(h
            .sessions
            .tokens()
            .validate_access(&grace.access_token)
            .await
            .is_ok());
    }
}

mod password_reset_tests {
    use super::*;
    use inkwell::errors::AppError;

    async fn verified_account(h: &Harness, email: &str) {
        h.sessions.register(registration(email)).await.unwrap();
        let token = link_token(&queued_link(&h.queue));
        h.sessions.verify_email(&token).await.unwrap();
    }

    #[tokio::test]
    async fn test_emailed_reset_link_rotates_password_and_ends_sessions() {
        let h = harness();
        verified_account(&h, "ada@calc.org").await;
        let session = h
            .sessions
            .login("ada@calc.org", "Str0ng!pass", false)
            .await
            .unwrap();

        h.sessions.forgot_password("ada@calc.org").await.unwrap();
        let link = queued_link(&h.queue);
        assert!(link.starts_with("https://app.test/reset-password?token="));

        h.sessions
            .reset_password(&link_token(&link), "An0ther!pass")
            .await
            .unwrap();

        // live session is gone along with the old password
        assert!(h
            .sessions
            .tokens()
            .validate_access(&session.access_token)
            .await
            .is_err());
        assert!(h
            .sessions
            .login("ada@calc.org", "Str0ng!pass", false)
            .await
            .is_err());
        h.sessions
            .login("ada@calc.org", "An0ther!pass", false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_used_reset_link_cannot_be_replayed() {
        let h = harness();
        verified_account(&h, "ada@calc.org").await;

        h.sessions.forgot_password("ada@calc.org").await.unwrap();
        let token = link_token(&queued_link(&h.queue));

        h.sessions.reset_password(&token, "An0ther!pass").await.unwrap();
        let err = h
            .sessions
            .reset_password(&token, "Th1rd!passwd")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_forgot_password_is_silent_for_unknown_addresses() {
        let h = harness();
        h.sessions.forgot_password("nobody@calc.org").await.unwrap();
        assert!(h.queue.is_empty());
    }
}
