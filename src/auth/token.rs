use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::CredentialCache;
use crate::config::Config;
use crate::errors::AppError;
use crate::models::user::Principal;
use crate::store::{UserFilter, UserStore};

/// Access tokens live 15 minutes.
pub const ACCESS_TTL_MS: u64 = 15 * 60 * 1000;
/// Refresh tokens live one day, or seven with "remember me".
pub const REFRESH_TTL_MS: u64 = 86_400_000;
pub const REFRESH_REMEMBER_TTL_MS: u64 = 604_800_000;

const VERIFY_TTL_SECS: i64 = 60 * 60;
const EMAIL_CHANGE_TTL_SECS: i64 = 10 * 60;
const RESET_TTL_SECS: i64 = 10 * 60;

pub fn refresh_ttl_ms(remember: bool) -> u64 {
    if remember {
        REFRESH_REMEMBER_TTL_MS
    } else {
        REFRESH_TTL_MS
    }
}

/// Session token kinds. Each subject holds at most one live token per
/// kind, cached under the key this type derives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn cache_key(&self, sub: Uuid) -> String {
        match self {
            TokenKind::Access => format!("access:{}", sub),
            TokenKind::Refresh => format!("refresh:{}", sub),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    email: String,
    /// Unique per issue. Two tokens minted in the same second must still
    /// be distinct strings, or superseding could not be observed.
    jti: String,
    iat: i64,
    exp: i64,
}

/// Claims of the single-use link tokens (verification, password reset).
/// These carry an email instead of a subject id and never touch the
/// credential cache; the matching row column makes them single-use.
#[derive(Debug, Serialize, Deserialize)]
struct LinkClaims {
    email: String,
    /// Unique per issue; a re-sent link must replace the stored token,
    /// which only works when the strings differ.
    jti: String,
    iat: i64,
    exp: i64,
}

/// Result of a refresh-token validation: the session layer needs the
/// presented token alongside the principal to finish rotation.
#[derive(Debug, Clone)]
pub struct RefreshPrincipal {
    pub principal: Principal,
    pub refresh_token: String,
}

/// One secret per token purpose so a leaked link-token secret cannot
/// mint session tokens.
#[derive(Clone)]
pub struct TokenSecrets {
    pub access: String,
    pub refresh: String,
    pub verify: String,
    pub reset: String,
}

impl TokenSecrets {
    pub fn from_config(cfg: &Config) -> Self {
        TokenSecrets {
            access: cfg.access_token_secret.clone(),
            refresh: cfg.refresh_token_secret.clone(),
            verify: cfg.verify_email_secret.clone(),
            reset: cfg.reset_password_secret.clone(),
        }
    }
}

/// Issues, validates and revokes the platform's tokens.
///
/// The credential cache is the source of truth: a token only validates
/// while the cache holds that exact string under the subject's key, so
/// issuing supersedes and deleting revokes, signature validity aside.
#[derive(Clone)]
pub struct TokenService {
    cache: CredentialCache,
    users: Arc<dyn UserStore>,
    access_enc: EncodingKey,
    access_dec: DecodingKey,
    refresh_enc: EncodingKey,
    refresh_dec: DecodingKey,
    verify_enc: EncodingKey,
    verify_dec: DecodingKey,
    reset_enc: EncodingKey,
    reset_dec: DecodingKey,
}

impl TokenService {
    pub fn new(cache: CredentialCache, users: Arc<dyn UserStore>, secrets: &TokenSecrets) -> Self {
        Self {
            cache,
            users,
            access_enc: EncodingKey::from_secret(secrets.access.as_bytes()),
            access_dec: DecodingKey::from_secret(secrets.access.as_bytes()),
            refresh_enc: EncodingKey::from_secret(secrets.refresh.as_bytes()),
            refresh_dec: DecodingKey::from_secret(secrets.refresh.as_bytes()),
            verify_enc: EncodingKey::from_secret(secrets.verify.as_bytes()),
            verify_dec: DecodingKey::from_secret(secrets.verify.as_bytes()),
            reset_enc: EncodingKey::from_secret(secrets.reset.as_bytes()),
            reset_dec: DecodingKey::from_secret(secrets.reset.as_bytes()),
        }
    }

    // ── Session tokens ──────────────────────────────────────────────

    /// Sign a 15-minute access token and cache it under `access:{sub}`.
    /// Overwrites the previous one: the old token stops validating now.
    pub async fn issue_access(&self, sub: Uuid, email: &str) -> Result<String, AppError> {
        let token = sign_session(&self.access_enc, sub, email, ACCESS_TTL_MS)?;
        self.cache
            .set(&TokenKind::Access.cache_key(sub), &token, ACCESS_TTL_MS)
            .await?;
        Ok(token)
    }

    /// Sign a refresh token (1 day, 7 with `remember`) and cache it under
    /// `refresh:{sub}`, superseding the previous one.
    pub async fn issue_refresh(
        &self,
        sub: Uuid,
        email: &str,
        remember: bool,
    ) -> Result<String, AppError> {
        let ttl = refresh_ttl_ms(remember);
        let token = sign_session(&self.refresh_enc, sub, email, ttl)?;
        self.cache
            .set(&TokenKind::Refresh.cache_key(sub), &token, ttl)
            .await?;
        Ok(token)
    }

    pub async fn validate_access(&self, token: &str) -> Result<Principal, AppError> {
        let sub = self
            .checked_subject(token, &self.access_dec, TokenKind::Access)
            .await?;
        self.load_principal(sub).await
    }

    pub async fn validate_refresh(&self, token: &str) -> Result<RefreshPrincipal, AppError> {
        let sub = self
            .checked_subject(token, &self.refresh_dec, TokenKind::Refresh)
            .await?;
        let principal = self.load_principal(sub).await?;
        Ok(RefreshPrincipal {
            principal,
            refresh_token: token.to_string(),
        })
    }

    pub async fn revoke(&self, sub: Uuid, kind: TokenKind) -> Result<(), AppError> {
        self.cache.del(&kind.cache_key(sub)).await
    }

    /// Drop both session entries for a subject. Used by logout and by
    /// account-state changes that must end live sessions.
    pub async fn revoke_all(&self, sub: Uuid) -> Result<(), AppError> {
        self.cache.del(&TokenKind::Access.cache_key(sub)).await?;
        self.cache.del(&TokenKind::Refresh.cache_key(sub)).await
    }

    /// Signature + expiry, then the fingerprint rule: the cache entry for
    /// this subject and kind must hold exactly the presented string. A
    /// miss, a mismatch or an expired entry all read as unauthenticated.
    async fn checked_subject(
        &self,
        token: &str,
        key: &DecodingKey,
        kind: TokenKind,
    ) -> Result<Uuid, AppError> {
        let data = decode::<SessionClaims>(token, key, &session_validation())
            .map_err(|_| AppError::Unauthenticated)?;
        let sub = Uuid::parse_str(&data.claims.sub).map_err(|_| AppError::Unauthenticated)?;

        match self.cache.get(&kind.cache_key(sub)).await? {
            Some(cached) if cached == token => Ok(sub),
            _ => Err(AppError::Unauthenticated),
        }
    }

    /// Fresh row read. Role and status in the principal reflect the
    /// account as it is now; a deleted or unverified account fails here
    /// no matter what the token says.
    async fn load_principal(&self, sub: Uuid) -> Result<Principal, AppError> {
        let filter = UserFilter {
            id: Some(sub),
            verified: Some(true),
            ..Default::default()
        };
        let user = self
            .users
            .find_one(&filter)
            .await?
            .ok_or(AppError::Unauthenticated)?;
        Ok(Principal::from(&user))
    }

    // ── Single-use link tokens ──────────────────────────────────────

    pub fn sign_verification(&self, email: &str) -> Result<String, AppError> {
        sign_link(&self.verify_enc, email, VERIFY_TTL_SECS)
    }

    /// Same secret as signup verification but a tighter window; an email
    /// change waits for confirmation from the new inbox.
    pub fn sign_email_change(&self, email: &str) -> Result<String, AppError> {
        sign_link(&self.verify_enc, email, EMAIL_CHANGE_TTL_SECS)
    }

    pub fn verify_verification(&self, token: &str) -> Result<String, AppError> {
        decode_link(token, &self.verify_dec)
            .ok_or_else(|| AppError::Validation("invalid verification token".into()))
    }

    pub fn sign_reset(&self, email: &str) -> Result<String, AppError> {
        sign_link(&self.reset_enc, email, RESET_TTL_SECS)
    }

    pub fn verify_reset(&self, token: &str) -> Result<String, AppError> {
        decode_link(token, &self.reset_dec)
            .ok_or_else(|| AppError::Validation("invalid reset token".into()))
    }
}

fn session_validation() -> Validation {
    let mut validation = Validation::default();
    validation.leeway = 0;
    validation
}

fn sign_session(key: &EncodingKey, sub: Uuid, email: &str, ttl_ms: u64) -> Result<String, AppError> {
    let now = Utc::now().timestamp();
    let claims = SessionClaims {
        sub: sub.to_string(),
        email: email.to_string(),
        jti: Uuid::new_v4().to_string(),
        iat: now,
        exp: now + (ttl_ms / 1000) as i64,
    };
    encode(&Header::default(), &claims, key).map_err(|e| AppError::Internal(e.into()))
}

fn sign_link(key: &EncodingKey, email: &str, ttl_secs: i64) -> Result<String, AppError> {
    let now = Utc::now().timestamp();
    let claims = LinkClaims {
        email: email.to_string(),
        jti: Uuid::new_v4().to_string(),
        iat: now,
        exp: now + ttl_secs,
    };
    encode(&Header::default(), &claims, key).map_err(|e| AppError::Internal(e.into()))
}

fn decode_link(token: &str, key: &DecodingKey) -> Option<String> {
    decode::<LinkClaims>(token, key, &session_validation())
        .ok()
        .map(|data| data.claims.email)
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::{AccountStatus, Role};
    use crate::store::memory::MemoryStore;
    use crate::store::NewUser;

    fn secrets() -> TokenSecrets {
        TokenSecrets {
            access: "access-secret".into(),
            refresh: "refresh-secret".into(),
            verify: "verify-secret".into(),
            reset: "reset-secret".into(),
        }
    }

    async fn service_with_user(verified: bool) -> (TokenService, Uuid, String) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .create(NewUser {
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                email: "ada@calc.org".into(),
                password: "hash".into(),
                bio: None,
                avatar: None,
                role: Role::Editor,
                status: AccountStatus::Active,
                verified,
                verification_token: None,
            })
            .await
            .unwrap();
        let svc = TokenService::new(CredentialCache::in_memory(), store, &secrets());
        (svc, user.id, user.email)
    }

    #[tokio::test]
    async fn test_issue_then_validate_returns_principal() {
        let (svc, sub, email) = service_with_user(true).await;
        let token = svc.issue_access(sub, &email).await.unwrap();
        let principal = svc.validate_access(&token).await.unwrap();
        assert_eq!(principal.id, sub);
        assert_eq!(principal.email, email);
        assert_eq!(principal.role, Role::Editor);
        assert_eq!(principal.status, AccountStatus::Active);
    }

    #[tokio::test]
    async fn test_reissue_supersedes_previous_token() {
        let (svc, sub, email) = service_with_user(true).await;
        let first = svc.issue_access(sub, &email).await.unwrap();
        let second = svc.issue_access(sub, &email).await.unwrap();
        assert_ne!(first, second);

        assert!(svc.validate_access(&second).await.is_ok());
        let err = svc.validate_access(&first).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_revoke_beats_valid_signature() {
        let (svc, sub, email) = service_with_user(true).await;
        let token = svc.issue_access(sub, &email).await.unwrap();
        svc.revoke(sub, TokenKind::Access).await.unwrap();
        let err = svc.validate_access(&token).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_revoke_all_kills_both_kinds() {
        let (svc, sub, email) = service_with_user(true).await;
        let access = svc.issue_access(sub, &email).await.unwrap();
        let refresh = svc.issue_refresh(sub, &email, false).await.unwrap();
        svc.revoke_all(sub).await.unwrap();
        assert!(svc.validate_access(&access).await.is_err());
        assert!(svc.validate_refresh(&refresh).await.is_err());
    }

    #[tokio::test]
    async fn test_foreign_signature_rejected() {
        let (svc, sub, email) = service_with_user(true).await;
        svc.issue_access(sub, &email).await.unwrap();
        let forged = sign_session(
            &EncodingKey::from_secret(b"other-secret"),
            sub,
            &email,
            ACCESS_TTL_MS,
        )
        .unwrap();
        assert!(svc.validate_access(&forged).await.is_err());
    }

    #[tokio::test]
    async fn test_refresh_token_of_unverified_account_fails() {
        let (svc, sub, email) = service_with_user(false).await;
        let refresh = svc.issue_refresh(sub, &email, true).await.unwrap();
        let err = svc.validate_refresh(&refresh).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_validate_refresh_echoes_presented_token() {
        let (svc, sub, email) = service_with_user(true).await;
        let refresh = svc.issue_refresh(sub, &email, false).await.unwrap();
        let session = svc.validate_refresh(&refresh).await.unwrap();
        assert_eq!(session.refresh_token, refresh);
        assert_eq!(session.principal.id, sub);
    }

    #[test]
    fn test_refresh_ttl_constants() {
        assert_eq!(refresh_ttl_ms(false), 86_400_000);
        assert_eq!(refresh_ttl_ms(true), 604_800_000);
        assert_eq!(ACCESS_TTL_MS, 900_000);
    }

    #[test]
    fn test_link_tokens_are_purpose_bound() {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let svc = TokenService::new(CredentialCache::in_memory(), store, &secrets());
        let verification = svc.sign_verification("a@b.c").unwrap();
        assert_eq!(svc.verify_verification(&verification).unwrap(), "a@b.c");
        // a verification token must not pass as a reset token
        assert!(svc.verify_reset(&verification).is_err());
    }
}
