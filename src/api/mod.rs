use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequest, FromRequestParts, Query, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, post},
    Json, Router,
};
use serde::de::DeserializeOwned;

use crate::errors::AppError;
use crate::models::user::Principal;
use crate::AppState;

pub mod auth;
pub mod blogs;
pub mod upload;
pub mod users;
pub mod validate;

/// Build the versioned API router. All routes are relative; the caller
/// mounts this under `/api/v1`.
pub fn api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let access_guard = middleware::from_fn_with_state(state.clone(), require_access);
    let refresh_guard = middleware::from_fn_with_state(state, require_refresh);

    let public = Router::new()
        .route("/register", post(auth::register))
        .route("/verify-email", post(auth::verify_email))
        .route("/resend-verification", post(auth::resend_verification))
        .route("/login", post(auth::login))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password));

    // refresh-cookie sessions: the only two routes that accept the cookie
    let session = Router::new()
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .layer(refresh_guard);

    let profile = Router::new()
        .route("/me", get(auth::me))
        .route("/update-profile", patch(auth::update_profile))
        .layer(access_guard.clone());

    let admin = Router::new()
        .route("/users", post(users::add_user).get(users::list_users))
        .route(
            "/users/:id",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .layer(middleware::from_fn(require_admin))
        .layer(access_guard.clone());

    let blogs = Router::new()
        .route("/", post(blogs::create).get(blogs::list))
        .route(
            "/slug/:slug",
            get(blogs::get_by_slug)
                .patch(blogs::update_by_slug)
                .delete(blogs::delete_by_slug),
        )
        .route(
            "/id/:id",
            get(blogs::get_by_id)
                .patch(blogs::update_by_id)
                .delete(blogs::delete_by_id),
        )
        .route("/update-status/slug/:slug", patch(blogs::update_status_by_slug))
        .route("/update-status/id/:id", patch(blogs::update_status_by_id))
        .layer(access_guard);

    Router::new()
        .nest("/auth", public.merge(session).merge(profile).merge(admin))
        .nest("/blogs", blogs)
        .fallback(fallback_404)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

// ── Guards ──────────────────────────────────────────────────────────────

/// Validates the `Authorization: Bearer` access token and stores the
/// resolved Principal in request extensions. Runs the full check: JWT
/// signature, cached-copy equality, fresh verified-account read.
async fn require_access(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers()).ok_or(AppError::Unauthenticated)?;
    let principal = state.tokens.validate_access(&token).await?;
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

/// Validates the refresh token carried in the `token` cookie. The
/// handlers behind this guard get the presented token too, not just the
/// principal.
async fn require_refresh(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = refresh_cookie_value(req.headers()).ok_or(AppError::Unauthenticated)?;
    let session = state.tokens.validate_refresh(&token).await?;
    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

/// Admin surface gate: the authenticated account must hold the admin role
/// and be active. Layered inside the access guard.
async fn require_admin(req: Request, next: Next) -> Result<Response, AppError> {
    let who = req
        .extensions()
        .get::<Principal>()
        .ok_or(AppError::Unauthenticated)?;
    who.require_admin()?;
    who.require_active()?;
    Ok(next.run(req).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
}

fn refresh_cookie_value(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';')
        .filter_map(|part| part.trim().strip_prefix("token="))
        .map(str::to_string)
        .next()
}

/// Route params are taken as strings so a malformed id comes back through
/// the error envelope rather than axum's plain-text path rejection.
fn parse_id(raw: &str) -> Result<uuid::Uuid, AppError> {
    raw.parse()
        .map_err(|_| AppError::Validation("id must be a UUID".into()))
}

// ── Extractors ──────────────────────────────────────────────────────────

/// `Json` that reports malformed or unknown-field bodies through the
/// standard error envelope instead of axum's plain-text rejection.
pub struct AppJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(AppError::Validation(rejection.body_text())),
        }
    }
}

/// Same treatment for query strings.
pub struct AppQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(AppQuery(value)),
            Err(rejection) => Err(AppError::Validation(rejection.body_text())),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
