//! Blog post handlers. Every record is addressable by slug or by id, so
//! the get/update/delete routes come in pairs that share one body.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::blogs::{BlogListQuery, BlogUpdate, NewBlogRequest};
use crate::errors::AppError;
use crate::models::user::Principal;
use crate::store::{BlogKey, Page};
use crate::AppState;

use super::upload::MultipartForm;
use super::{parse_id, validate, AppJson, AppQuery};

const CREATE_FIELDS: [&str; 4] = ["title", "content", "meta", "tags"];
const UPDATE_FIELDS: [&str; 5] = ["title", "content", "meta", "tags", "update_slug"];

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListBlogsParams {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    page: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
}

impl ListBlogsParams {
    fn into_query(self) -> Result<BlogListQuery, AppError> {
        let mut query = BlogListQuery {
            slug: self.slug,
            page: Page::from_query(self.page, self.limit),
            ..Default::default()
        };
        if let Some(status) = self.status.as_deref() {
            query.status = Some(validate::blog_status(status)?);
        }
        if let Some(author) = self.author.as_deref() {
            query.author = Some(
                author
                    .parse()
                    .map_err(|_| AppError::Validation("author must be a UUID".into()))?,
            );
        }
        if let Some(id) = self.id.as_deref() {
            query.id = Some(parse_id(id)?);
        }
        Ok(query)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateStatusRequest {
    status: String,
}

// ── Handlers ────────────────────────────────────────────────────────────

/// POST /api/v1/blogs — multipart; cover image is mandatory.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(who): Extension<Principal>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = MultipartForm::read(
        &mut multipart,
        "image",
        &CREATE_FIELDS,
        &state.config.upload_spool_dir,
    )
    .await?;

    let title = form.take("title").unwrap_or_default();
    let content = form.take("content").unwrap_or_default();
    let meta = form.take("meta").unwrap_or_default();
    let tags = form.take_all("tags");

    validate::require(&title, "title")?;
    validate::require(&content, "content")?;
    validate::require(&meta, "meta")?;
    validate::max_tags(&tags)?;
    let image = form
        .upload
        .take()
        .ok_or_else(|| AppError::Validation("image should not be empty".into()))?;

    let blog = state
        .blogs
        .create(
            &who,
            NewBlogRequest {
                title,
                content,
                meta,
                tags,
                image,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "blog created successfully",
            "data": blog,
        })),
    ))
}

/// GET /api/v1/blogs
pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(who): Extension<Principal>,
    AppQuery(params): AppQuery<ListBlogsParams>,
) -> Result<impl IntoResponse, AppError> {
    let (blogs, meta) = state.blogs.list(&who, params.into_query()?).await?;
    Ok(Json(json!({ "data": blogs, "meta": meta })))
}

pub async fn get_by_slug(
    State(state): State<Arc<AppState>>,
    Extension(who): Extension<Principal>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    get_one(&state, &who, BlogKey::Slug(slug)).await
}

pub async fn get_by_id(
    State(state): State<Arc<AppState>>,
    Extension(who): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    get_one(&state, &who, BlogKey::Id(parse_id(&id)?)).await
}

async fn get_one(
    state: &AppState,
    who: &Principal,
    key: BlogKey,
) -> Result<Json<Value>, AppError> {
    let blog = state.blogs.get(who, &key).await?;
    Ok(Json(json!({ "data": blog })))
}

pub async fn update_by_slug(
    State(state): State<Arc<AppState>>,
    Extension(who): Extension<Principal>,
    Path(slug): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    update_one(&state, &who, BlogKey::Slug(slug), multipart).await
}

pub async fn update_by_id(
    State(state): State<Arc<AppState>>,
    Extension(who): Extension<Principal>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    update_one(&state, &who, BlogKey::Id(parse_id(&id)?), multipart).await
}

/// PATCH /api/v1/blogs/{slug,id}/.. — multipart; every field optional.
async fn update_one(
    state: &AppState,
    who: &Principal,
    key: BlogKey,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let mut form = MultipartForm::read(
        &mut multipart,
        "image",
        &UPDATE_FIELDS,
        &state.config.upload_spool_dir,
    )
    .await?;

    let mut update = BlogUpdate {
        title: form.take("title"),
        content: form.take("content"),
        meta: form.take("meta"),
        ..Default::default()
    };
    validate::require_if_present(update.title.as_deref(), "title")?;
    validate::require_if_present(update.content.as_deref(), "content")?;
    validate::require_if_present(update.meta.as_deref(), "meta")?;
    let tags = form.take_all("tags");
    if !tags.is_empty() {
        validate::max_tags(&tags)?;
        update.tags = Some(tags);
    }
    if let Some(raw) = form.take("update_slug") {
        update.update_slug = validate::boolean(&raw, "update_slug")?;
    }
    update.image = form.upload.take();

    let blog = state.blogs.update(who, &key, update).await?;
    Ok(Json(json!({
        "message": "blogpost updated",
        "data": blog,
    })))
}

pub async fn update_status_by_slug(
    State(state): State<Arc<AppState>>,
    Extension(who): Extension<Principal>,
    Path(slug): Path<String>,
    AppJson(body): AppJson<UpdateStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    update_status(&state, &who, BlogKey::Slug(slug), &body.status).await
}

pub async fn update_status_by_id(
    State(state): State<Arc<AppState>>,
    Extension(who): Extension<Principal>,
    Path(id): Path<String>,
    AppJson(body): AppJson<UpdateStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    update_status(&state, &who, BlogKey::Id(parse_id(&id)?), &body.status).await
}

async fn update_status(
    state: &AppState,
    who: &Principal,
    key: BlogKey,
    status: &str,
) -> Result<Json<Value>, AppError> {
    let target = validate::blog_status(status)?;
    let blog = state.blogs.update_status(who, &key, target).await?;
    Ok(Json(json!({
        "message": format!("blogpost {}", blog.status.as_str()),
        "data": blog,
    })))
}

pub async fn delete_by_slug(
    State(state): State<Arc<AppState>>,
    Extension(who): Extension<Principal>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    delete_one(&state, &who, BlogKey::Slug(slug)).await
}

pub async fn delete_by_id(
    State(state): State<Arc<AppState>>,
    Extension(who): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    delete_one(&state, &who, BlogKey::Id(parse_id(&id)?)).await
}

async fn delete_one(
    state: &AppState,
    who: &Principal,
    key: BlogKey,
) -> Result<Json<Value>, AppError> {
    let blog = state.blogs.delete(who, &key).await?;
    Ok(Json(json!({
        "message": "blogpost deleted",
        "data": blog,
    })))
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::blog::BlogStatus;

    #[test]
    fn test_list_params_map_onto_query() {
        let params = ListBlogsParams {
            status: Some("published".into()),
            author: Some("7f0d6c66-2f78-4f5b-9d1a-93e9a1c7a111".into()),
            slug: None,
            id: None,
            page: Some(1),
            limit: Some(5),
        };
        let query = params.into_query().unwrap();
        assert_eq!(query.status, Some(BlogStatus::Published));
        assert!(query.author.is_some());
        assert!(query.page.is_some());
    }

    #[test]
    fn test_list_params_reject_bad_status_and_author() {
        let bad_status = ListBlogsParams {
            status: Some("archived".into()),
            author: None,
            slug: None,
            id: None,
            page: None,
            limit: None,
        };
        assert!(bad_status.into_query().is_err());

        let bad_author = ListBlogsParams {
            status: None,
            author: Some("not-a-uuid".into()),
            slug: None,
            id: None,
            page: None,
            limit: None,
        };
        assert!(bad_author.into_query().is_err());
    }
}
