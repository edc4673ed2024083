//! Account and session flows: registration, verification, login/logout,
//! password reset, profile updates and the admin user management surface.
//!
//! Every flow keeps the same order: validate identity, authorize, mutate,
//! then enqueue side effects. Mail and media work never runs inline.

use std::sync::Arc;

use uuid::Uuid;

use crate::auth::password;
use crate::auth::token::{refresh_ttl_ms, RefreshPrincipal, TokenService};
use crate::config::Config;
use crate::errors::AppError;
use crate::jobs::{DeleteProfilePicture, Job, JobQueue, SpooledUpload};
use crate::mail::Email;
use crate::models::user::{default_avatar_url, AccountStatus, Principal, Role, User};
use crate::store::{NewUser, Page, PageMeta, SortOrder, UserFilter, UserPatch, UserStore};

const DUPLICATE_EMAIL: &str = "email address already in use";
const INVALID_VERIFICATION: &str = "invalid verification token";

#[derive(Debug, Clone)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub bio: Option<String>,
}

/// Tokens handed back by a successful login. The refresh token goes into
/// an HttpOnly cookie whose max-age must match `refresh_ttl_ms`.
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_ttl_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<SpooledUpload>,
}

/// Admin-created account. Role, status and verified come from the caller
/// instead of the registration defaults.
#[derive(Debug, Clone)]
pub struct NewUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub bio: Option<String>,
    pub role: Role,
    pub status: AccountStatus,
    pub verified: bool,
    pub avatar: Option<SpooledUpload>,
}

#[derive(Debug, Clone, Default)]
pub struct AdminUserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    pub status: Option<AccountStatus>,
    pub verified: Option<bool>,
    pub avatar: Option<SpooledUpload>,
}

impl AdminUserUpdate {
    /// True when the patch would change the account's own role, status or
    /// verified flag. Admins must not lock themselves out.
    fn downgrades(&self, current: &User) -> bool {
        self.role.is_some_and(|r| r != current.role)
            || self.status.is_some_and(|s| s != current.status)
            || self.verified.is_some_and(|v| v != current.verified)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserListQuery {
    pub role: Option<Role>,
    pub status: Option<AccountStatus>,
    pub verified: Option<bool>,
    pub search: Option<String>,
    pub sort: SortOrder,
    pub page: Option<Page>,
}

#[derive(Clone)]
pub struct SessionService {
    users: Arc<dyn UserStore>,
    tokens: TokenService,
    queue: Arc<dyn JobQueue>,
    frontend_url: String,
    contact_email: String,
}

impl SessionService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: TokenService,
        queue: Arc<dyn JobQueue>,
        cfg: &Config,
    ) -> Self {
        Self {
            users,
            tokens,
            queue,
            frontend_url: cfg.frontend_url.trim_end_matches('/').to_string(),
            contact_email: cfg.contact_email.clone(),
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    // ── Registration & verification ─────────────────────────────────

    /// Create an account and queue the verification mail. The very first
    /// account on a fresh install becomes the active admin; everyone else
    /// starts as an inactive user and has to verify before logging in.
    pub async fn register(&self, reg: Registration) -> Result<User, AppError> {
        if self
            .users
            .find_one(&UserFilter::by_email(&reg.email))
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(DUPLICATE_EMAIL.into()));
        }

        let first_account = self.users.count(&UserFilter::default()).await? == 0;
        let (role, status) = if first_account {
            (Role::Admin, AccountStatus::Active)
        } else {
            (Role::User, AccountStatus::Inactive)
        };

        let token = self.tokens.sign_verification(&reg.email)?;
        let user = self
            .users
            .create(NewUser {
                avatar: Some(default_avatar_url(&reg.first_name, &reg.last_name)),
                password: password::hash(&reg.password)?,
                first_name: reg.first_name,
                last_name: reg.last_name,
                email: reg.email,
                bio: reg.bio,
                role,
                status,
                verified: false,
                verification_token: Some(token.clone()),
            })
            .await?;

        self.queue_verification_mail(&user.email, &token).await?;
        tracing::info!(user_id = %user.id, first_account, "account registered");
        Ok(user)
    }

    /// Redeem a verification link. Covers both signup confirmation and a
    /// pending email change; which one is decided by the address embedded
    /// in the token.
    pub async fn verify_email(&self, token: &str) -> Result<(), AppError> {
        let email = self.tokens.verify_verification(token)?;
        let filter = UserFilter {
            verification_token: Some(token.to_string()),
            ..Default::default()
        };
        let user = self
            .users
            .find_one(&filter)
            .await?
            .ok_or_else(|| AppError::Validation(INVALID_VERIFICATION.into()))?;

        let patch = if user.new_email.as_deref() == Some(email.as_str()) {
            // pending address change, confirmed from the new inbox
            UserPatch {
                email: Some(email),
                new_email: Some(None),
                verification_token: Some(None),
                verified: Some(true),
                ..Default::default()
            }
        } else if user.email == email {
            UserPatch {
                verified: Some(true),
                verification_token: Some(None),
                ..Default::default()
            }
        } else {
            return Err(AppError::Validation(INVALID_VERIFICATION.into()));
        };

        self.users.update_one(user.id, patch).await?;
        Ok(())
    }

    /// Always reports success so the endpoint cannot be used to probe for
    /// registered addresses. Only actually re-sends for an unverified
    /// account with an outstanding token.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AppError> {
        let Some(user) = self.users.find_one(&UserFilter::by_email(email)).await? else {
            return Ok(());
        };
        if user.verified || user.verification_token.is_none() {
            return Ok(());
        }

        let token = self.tokens.sign_verification(&user.email)?;
        self.users
            .update_one(
                user.id,
                UserPatch {
                    verification_token: Some(Some(token.clone())),
                    ..Default::default()
                },
            )
            .await?;
        self.queue_verification_mail(&user.email, &token).await?;
        Ok(())
    }

    // ── Login & session lifecycle ───────────────────────────────────

    /// A missing account, an unverified account and a wrong password all
    /// produce the same InvalidCredentials answer.
    pub async fn login(
        &self,
        email: &str,
        password_attempt: &str,
        remember: bool,
    ) -> Result<LoginSession, AppError> {
        let filter = UserFilter {
            email: Some(email.to_string()),
            verified: Some(true),
            ..Default::default()
        };
        let user = self
            .users
            .find_one(&filter)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !password::verify(password_attempt, &user.password)? {
            return Err(AppError::InvalidCredentials);
        }

        let access_token = self.tokens.issue_access(user.id, &user.email).await?;
        let refresh_token = self
            .tokens
            .issue_refresh(user.id, &user.email, remember)
            .await?;

        tracing::info!(user_id = %user.id, remember, "login");
        Ok(LoginSession {
            access_token,
            refresh_token,
            refresh_ttl_ms: refresh_ttl_ms(remember),
        })
    }

    pub async fn profile(&self, who: &Principal) -> Result<User, AppError> {
        self.users.find_one_or_fail(&UserFilter::by_id(who.id)).await
    }

    /// Mint a fresh access token for a validated refresh session. The
    /// refresh token itself is left as issued.
    pub async fn refresh(&self, session: &RefreshPrincipal) -> Result<String, AppError> {
        self.tokens
            .issue_access(session.principal.id, &session.principal.email)
            .await
    }

    /// Drops both cached tokens; the presented ones stop validating even
    /// though their signatures stay valid until expiry.
    pub async fn logout(&self, sub: Uuid) -> Result<(), AppError> {
        self.tokens.revoke_all(sub).await?;
        tracing::info!(user_id = %sub, "logout");
        Ok(())
    }

    // ── Password reset ──────────────────────────────────────────────

    /// Silent like resend_verification: the response never says whether
    /// the address exists.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AppError> {
        let filter = UserFilter {
            email: Some(email.to_string()),
            verified: Some(true),
            ..Default::default()
        };
        let Some(user) = self.users.find_one(&filter).await? else {
            return Ok(());
        };

        let token = self.tokens.sign_reset(&user.email)?;
        self.users
            .update_one(
                user.id,
                UserPatch {
                    reset_token: Some(Some(token.clone())),
                    ..Default::default()
                },
            )
            .await?;

        let link = format!("{}/reset-password?token={}", self.frontend_url, token);
        self.queue
            .enqueue(Job::SendEmail(Email::reset_password(
                &user.email,
                link,
                &self.contact_email,
            )))
            .await?;
        Ok(())
    }

    /// The row must still hold this exact token; a second redemption of a
    /// used link fails the lookup. Ends all live sessions.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AppError> {
        self.tokens.verify_reset(token)?;
        let filter = UserFilter {
            reset_token: Some(token.to_string()),
            ..Default::default()
        };
        let user = self.users.find_one_or_fail(&filter).await?;

        self.users
            .update_one(
                user.id,
                UserPatch {
                    password: Some(password::hash(new_password)?),
                    reset_token: Some(None),
                    ..Default::default()
                },
            )
            .await?;
        self.tokens.revoke_all(user.id).await?;
        tracing::info!(user_id = %user.id, "password reset");
        Ok(())
    }

    // ── Profile ─────────────────────────────────────────────────────

    /// Self-service profile edit. An email change does not take effect
    /// directly: the new address is parked in `new_email` and flips once
    /// the verification link mailed to it is used.
    pub async fn update_profile(
        &self,
        who: &Principal,
        update: ProfileUpdate,
    ) -> Result<User, AppError> {
        who.require_active()?;

        let mut patch = UserPatch {
            first_name: update.first_name,
            last_name: update.last_name,
            bio: update.bio,
            ..Default::default()
        };

        let mut pending_mail = None;
        if let Some(new_email) = update.email.filter(|e| *e != who.email) {
            if self
                .users
                .find_one(&UserFilter::by_email(&new_email))
                .await?
                .is_some()
            {
                return Err(AppError::Conflict(DUPLICATE_EMAIL.into()));
            }
            let token = self.tokens.sign_email_change(&new_email)?;
            patch.new_email = Some(Some(new_email.clone()));
            patch.verification_token = Some(Some(token.clone()));
            pending_mail = Some((new_email, token));
        }

        let user = self.users.update_one(who.id, patch).await?;

        if let Some((new_email, token)) = pending_mail {
            self.queue_verification_mail(&new_email, &token).await?;
        }
        if let Some(upload) = update.avatar {
            self.queue.enqueue(upload.into_profile_picture_job(who.id)).await?;
        }
        Ok(user)
    }

    // ── Admin user management ───────────────────────────────────────

    pub async fn add_user(&self, req: NewUserRequest) -> Result<User, AppError> {
        if self
            .users
            .find_one(&UserFilter::by_email(&req.email))
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(DUPLICATE_EMAIL.into()));
        }

        let user = self
            .users
            .create(NewUser {
                avatar: Some(default_avatar_url(&req.first_name, &req.last_name)),
                password: password::hash(&req.password)?,
                first_name: req.first_name,
                last_name: req.last_name,
                email: req.email,
                bio: req.bio,
                role: req.role,
                status: req.status,
                verified: req.verified,
                verification_token: None,
            })
            .await?;

        if let Some(upload) = req.avatar {
            self.queue.enqueue(upload.into_profile_picture_job(user.id)).await?;
        }
        tracing::info!(user_id = %user.id, role = user.role.as_str(), "user added by admin");
        Ok(user)
    }

    pub async fn list_users(
        &self,
        query: UserListQuery,
    ) -> Result<(Vec<User>, PageMeta), AppError> {
        let filter = UserFilter {
            role: query.role,
            status: query.status,
            verified: query.verified,
            search: query.search,
            ..Default::default()
        };
        let users = self
            .users
            .find_page(&filter, query.page.as_ref(), query.sort)
            .await?;
        let count = self.users.count(&filter).await?;
        Ok((users, PageMeta::new(count, query.page.as_ref())))
    }

    pub async fn get_user(&self, id: Uuid) -> Result<User, AppError> {
        self.users.find_one_or_fail(&UserFilter::by_id(id)).await
    }

    pub async fn update_user(
        &self,
        admin: &Principal,
        id: Uuid,
        update: AdminUserUpdate,
    ) -> Result<User, AppError> {
        let user = self.users.find_one_or_fail(&UserFilter::by_id(id)).await?;

        if user.id == admin.id && update.downgrades(&user) {
            return Err(AppError::Forbidden);
        }
        if let Some(email) = update.email.as_deref() {
            if email != user.email
                && self
                    .users
                    .find_one(&UserFilter::by_email(email))
                    .await?
                    .is_some()
            {
                return Err(AppError::Conflict(DUPLICATE_EMAIL.into()));
            }
        }

        let verified_flip = update.verified.is_some_and(|v| v != user.verified);
        let mut patch = UserPatch {
            first_name: update.first_name,
            last_name: update.last_name,
            email: update.email,
            bio: update.bio,
            role: update.role,
            status: update.status,
            verified: update.verified,
            ..Default::default()
        };
        if let Some(pw) = update.password {
            patch.password = Some(password::hash(&pw)?);
        }

        let updated = self.users.update_one(id, patch).await?;

        if let Some(upload) = update.avatar {
            self.queue.enqueue(upload.into_profile_picture_job(id)).await?;
        }
        if verified_flip {
            // a verification change must end the account's live sessions
            self.tokens.revoke_all(id).await?;
            tracing::info!(user_id = %id, "sessions revoked after verified flip");
        }
        Ok(updated)
    }

    pub async fn delete_user(&self, admin: &Principal, id: Uuid) -> Result<User, AppError> {
        let user = self.users.find_one_or_fail(&UserFilter::by_id(id)).await?;
        if user.id == admin.id {
            return Err(AppError::Forbidden);
        }

        let deleted = self.users.delete_one(id).await?;
        self.tokens.revoke_all(id).await?;

        if let Some(file_id) = deleted.avatar_id.clone() {
            self.queue
                .enqueue(Job::DeleteProfilePicture(DeleteProfilePicture { file_id }))
                .await?;
        }
        tracing::info!(user_id = %id, "user deleted by admin");
        Ok(deleted)
    }

    // ── Helpers ─────────────────────────────────────────────────────

    async fn queue_verification_mail(&self, to: &str, token: &str) -> Result<(), AppError> {
        let link = format!("{}/verify-email?token={}", self.frontend_url, token);
        self.queue
            .enqueue(Job::SendEmail(Email::verify_email(
                to,
                link,
                &self.contact_email,
            )))
            .await
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
