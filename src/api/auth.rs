use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::auth::password;
use crate::auth::session::{ProfileUpdate, Registration};
use crate::auth::token::RefreshPrincipal;
use crate::errors::AppError;
use crate::models::user::{Principal, PublicUser};
use crate::AppState;

use super::upload::MultipartForm;
use super::{validate, AppJson};

// ── Request DTOs ────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    first_name: String,
    last_name: String,
    email: String,
    password: String,
    password_confirmation: String,
    #[serde(default)]
    bio: Option<String>,
}

impl RegisterRequest {
    fn validate(&self) -> Result<(), AppError> {
        validate::require(&self.first_name, "first_name")?;
        validate::require(&self.last_name, "last_name")?;
        validate::email(&self.email)?;
        password::validate_strength(&self.password)?;
        validate::confirmed(&self.password, &self.password_confirmation)?;
        validate::require_if_present(self.bio.as_deref(), "bio")
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenRequest {
    token: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailRequest {
    email: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    email: String,
    password: String,
    #[serde(default)]
    remember: Option<bool>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetPasswordRequest {
    token: String,
    password: String,
    password_confirmation: String,
}

impl ResetPasswordRequest {
    fn validate(&self) -> Result<(), AppError> {
        validate::require(&self.token, "token")?;
        password::validate_strength(&self.password)?;
        validate::confirmed(&self.password, &self.password_confirmation)
    }
}

// ── Cookie plumbing ─────────────────────────────────────────────────────

/// The refresh token travels only in this cookie: HttpOnly keeps scripts
/// away from it and SameSite=Strict keeps it off cross-site requests.
fn session_cookie(token: &str, max_age_ms: u64) -> [(header::HeaderName, String); 1] {
    [(
        header::SET_COOKIE,
        format!(
            "token={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
            token,
            max_age_ms / 1000
        ),
    )]
}

fn clear_session_cookie() -> [(header::HeaderName, String); 1] {
    [(
        header::SET_COOKIE,
        "token=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0".to_string(),
    )]
}

// ── Handlers ────────────────────────────────────────────────────────────

/// POST /api/v1/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    body.validate()?;
    state
        .sessions
        .register(Registration {
            first_name: body.first_name,
            last_name: body.last_name,
            email: body.email,
            password: body.password,
            bio: body.bio,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "registered ! check email for confirmation link" })),
    ))
}

/// POST /api/v1/auth/verify-email
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<TokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate::require(&body.token, "token")?;
    state.sessions.verify_email(&body.token).await?;
    Ok(Json(json!({
        "message": "email address verified, you may login now !"
    })))
}

/// POST /api/v1/auth/resend-verification
pub async fn resend_verification(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<EmailRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate::email(&body.email)?;
    state.sessions.resend_verification(&body.email).await?;
    Ok(Json(json!({
        "message": "a verification link will be sent to your email"
    })))
}

/// POST /api/v1/auth/login — answers with the access token and plants the
/// refresh cookie.
pub async fn login(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate::email(&body.email)?;
    validate::require(&body.password, "password")?;

    let session = state
        .sessions
        .login(&body.email, &body.password, body.remember.unwrap_or(false))
        .await?;

    Ok((
        session_cookie(&session.refresh_token, session.refresh_ttl_ms),
        Json(json!({
            "message": "Logged in successfully",
            "access_token": session.access_token,
        })),
    ))
}

/// GET /api/v1/auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(who): Extension<Principal>,
) -> Result<Json<PublicUser>, AppError> {
    let user = state.sessions.profile(&who).await?;
    Ok(Json(PublicUser::from(&user)))
}

/// POST /api/v1/auth/refresh — cookie-guarded; hands out a fresh access
/// token without touching the refresh session.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<RefreshPrincipal>,
) -> Result<impl IntoResponse, AppError> {
    let access_token = state.sessions.refresh(&session).await?;
    Ok(Json(json!({ "access_token": access_token })))
}

/// POST /api/v1/auth/logout — cookie-guarded; ends both sessions and
/// expires the cookie.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<RefreshPrincipal>,
) -> Result<impl IntoResponse, AppError> {
    state.sessions.logout(session.principal.id).await?;
    Ok((
        clear_session_cookie(),
        Json(json!({
            "message": "logged out successfully",
            "access_token": null,
        })),
    ))
}

/// POST /api/v1/auth/forgot-password
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<EmailRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate::email(&body.email)?;
    state.sessions.forgot_password(&body.email).await?;
    Ok(Json(json!({ "message": "reset link will be sent shortly" })))
}

/// POST /api/v1/auth/reset-password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    body.validate()?;
    state
        .sessions
        .reset_password(&body.token, &body.password)
        .await?;
    Ok(Json(json!({ "message": "password reset successful" })))
}

/// PATCH /api/v1/auth/update-profile — multipart; optional avatar image.
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(who): Extension<Principal>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = MultipartForm::read(
        &mut multipart,
        "avatar",
        &["first_name", "last_name", "email", "bio"],
        &state.config.upload_spool_dir,
    )
    .await?;

    let update = ProfileUpdate {
        first_name: form.take("first_name"),
        last_name: form.take("last_name"),
        email: form.take("email"),
        bio: form.take("bio"),
        avatar: form.upload.take(),
    };
    validate::require_if_present(update.first_name.as_deref(), "first_name")?;
    validate::require_if_present(update.last_name.as_deref(), "last_name")?;
    validate::email_if_present(update.email.as_deref())?;
    validate::require_if_present(update.bio.as_deref(), "bio")?;

    let email_changes = update.email.as_deref().is_some_and(|e| e != who.email);
    let user = state.sessions.update_profile(&who, update).await?;

    let message = if email_changes {
        "profile updated, verification link sent to new email address"
    } else {
        "profile updated"
    };
    Ok(Json(json!({
        "message": message,
        "data": PublicUser::from(&user),
    })))
}

// ── Tests ───────────────────────────────────────────────────────────────
