//! Admin user management. Every route here sits behind the access guard
//! plus the admin gate; handlers still pass the caller down so the
//! service can refuse self-destructive edits.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::auth::password;
use crate::auth::session::{AdminUserUpdate, NewUserRequest, UserListQuery};
use crate::errors::AppError;
use crate::models::user::{AccountStatus, AdminUser, Principal, Role};
use crate::store::Page;
use crate::AppState;

use super::upload::MultipartForm;
use super::{parse_id, validate, AppQuery};

const ADD_USER_FIELDS: [&str; 9] = [
    "first_name",
    "last_name",
    "email",
    "password",
    "password_confirmation",
    "bio",
    "role",
    "status",
    "verified",
];

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListUsersParams {
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    verified: Option<String>,
    #[serde(default)]
    sort: Option<String>,
    #[serde(default)]
    page: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
}

impl ListUsersParams {
    fn into_query(self) -> Result<UserListQuery, AppError> {
        let mut query = UserListQuery {
            search: self.search,
            page: Page::from_query(self.page, self.limit),
            ..Default::default()
        };
        if let Some(role) = self.role.as_deref() {
            query.role = Some(validate::role(role)?);
        }
        if let Some(status) = self.status.as_deref() {
            query.status = Some(validate::account_status(status)?);
        }
        if let Some(verified) = self.verified.as_deref() {
            query.verified = Some(validate::boolean(verified, "verified")?);
        }
        if let Some(sort) = self.sort.as_deref() {
            query.sort = validate::sort_order(sort)?;
        }
        Ok(query)
    }
}

// ── Handlers ────────────────────────────────────────────────────────────

/// POST /api/v1/auth/users — multipart; optional avatar image.
pub async fn add_user(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = MultipartForm::read(
        &mut multipart,
        "avatar",
        &ADD_USER_FIELDS,
        &state.config.upload_spool_dir,
    )
    .await?;

    let first_name = form.take("first_name").unwrap_or_default();
    let last_name = form.take("last_name").unwrap_or_default();
    let email = form.take("email").unwrap_or_default();
    let pw = form.take("password").unwrap_or_default();
    let confirmation = form.take("password_confirmation").unwrap_or_default();
    let bio = form.take("bio");

    validate::require(&first_name, "first_name")?;
    validate::require(&last_name, "last_name")?;
    validate::email(&email)?;
    password::validate_strength(&pw)?;
    validate::confirmed(&pw, &confirmation)?;
    validate::require_if_present(bio.as_deref(), "bio")?;

    let role = match form.take("role") {
        Some(raw) => validate::role(&raw)?,
        None => Role::User,
    };
    let status = match form.take("status") {
        Some(raw) => validate::account_status(&raw)?,
        None => AccountStatus::Inactive,
    };
    let verified = match form.take("verified") {
        Some(raw) => validate::boolean(&raw, "verified")?,
        None => true,
    };

    let user = state
        .sessions
        .add_user(NewUserRequest {
            first_name,
            last_name,
            email,
            password: pw,
            bio,
            role,
            status,
            verified,
            avatar: form.upload.take(),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "user added successfully",
            "data": AdminUser::from(&user),
        })),
    ))
}

/// GET /api/v1/auth/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<ListUsersParams>,
) -> Result<impl IntoResponse, AppError> {
    let (users, meta) = state.sessions.list_users(params.into_query()?).await?;
    let data: Vec<AdminUser> = users.iter().map(AdminUser::from).collect();
    Ok(Json(json!({
        "message": "users fetched successfully",
        "data": data,
        "meta": meta,
    })))
}

/// GET /api/v1/auth/users/:id
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.sessions.get_user(parse_id(&id)?).await?;
    Ok(Json(json!({ "data": AdminUser::from(&user) })))
}

/// PATCH /api/v1/auth/users/:id — multipart; optional avatar image.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(who): Extension<Principal>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let mut form = MultipartForm::read(
        &mut multipart,
        "avatar",
        &ADD_USER_FIELDS,
        &state.config.upload_spool_dir,
    )
    .await?;

    let mut update = AdminUserUpdate {
        first_name: form.take("first_name"),
        last_name: form.take("last_name"),
        email: form.take("email"),
        bio: form.take("bio"),
        password: form.take("password"),
        avatar: form.upload.take(),
        ..Default::default()
    };
    validate::require_if_present(update.first_name.as_deref(), "first_name")?;
    validate::require_if_present(update.last_name.as_deref(), "last_name")?;
    validate::email_if_present(update.email.as_deref())?;
    validate::require_if_present(update.bio.as_deref(), "bio")?;
    if let Some(pw) = update.password.as_deref() {
        password::validate_strength(pw)?;
        let confirmation = form.take("password_confirmation").unwrap_or_default();
        validate::confirmed(pw, &confirmation)?;
    }
    if let Some(raw) = form.take("role") {
        update.role = Some(validate::role(&raw)?);
    }
    if let Some(raw) = form.take("status") {
        update.status = Some(validate::account_status(&raw)?);
    }
    if let Some(raw) = form.take("verified") {
        update.verified = Some(validate::boolean(&raw, "verified")?);
    }

    let user = state.sessions.update_user(&who, id, update).await?;
    Ok(Json(json!({
        "message": "user updated successfully",
        "data": AdminUser::from(&user),
    })))
}

/// DELETE /api/v1/auth/users/:id
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(who): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.sessions.delete_user(&who, parse_id(&id)?).await?;
    Ok(Json(json!({
        "message": "user deleted successfully",
        "data": AdminUser::from(&user),
    })))
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SortOrder;

    #[test]
    fn test_list_params_map_onto_query() {
        let params = ListUsersParams {
            search: Some("ada".into()),
            role: Some("editor".into()),
            status: None,
            verified: Some("false".into()),
            sort: Some("asc".into()),
            page: Some(2),
            limit: Some(20),
        };
        let query = params.into_query().unwrap();
        assert_eq!(query.role, Some(Role::Editor));
        assert_eq!(query.verified, Some(false));
        assert_eq!(query.sort, SortOrder::Asc);
        let page = query.page.unwrap();
        assert_eq!((page.page, page.limit), (2, 20));
    }

    #[test]
    fn test_list_params_reject_unknown_enum_values() {
        let params = ListUsersParams {
            search: None,
            role: Some("supervisor".into()),
            status: None,
            verified: None,
            sort: None,
            page: None,
            limit: None,
        };
        assert!(params.into_query().is_err());
    }
}
