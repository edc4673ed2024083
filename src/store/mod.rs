pub mod media;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::blog::{Blog, BlogStatus};
use crate::models::user::{AccountStatus, Role, User};

/// Requested page of a listing. Absent means "everything".
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    /// Query-param resolution: neither param paginates nothing, a lone
    /// `page` gets the default limit of 10, a lone `limit` starts at page
    /// 1, and negative values are taken absolute.
    pub fn from_query(page: Option<i64>, limit: Option<i64>) -> Option<Page> {
        if page.is_none() && limit.is_none() {
            return None;
        }
        let limit = match limit.map(i64::abs) {
            Some(0) | None => 10,
            Some(l) => l,
        };
        let page = page.map(i64::abs).unwrap_or(1).max(1);
        Some(Page { page, limit })
    }

    pub fn skip(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

/// Listing envelope metadata. Pagination fields are omitted when the list
/// was not paginated.
#[derive(Debug, Clone, Serialize)]
pub struct PageMeta {
    pub count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<i64>,
}

impl PageMeta {
    pub fn new(count: i64, page: Option<&Page>) -> Self {
        PageMeta {
            count,
            limit: page.map(|p| p.limit),
            page: page.map(|p| p.page),
            skip: page.map(|p| p.skip()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

// ── Users ───────────────────────────────────────────────────────────────

/// Conjunctive filter over the `users` table. `search` is a
/// case-insensitive substring match across first name, last name and
/// email.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub id: Option<Uuid>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub status: Option<AccountStatus>,
    pub verified: Option<bool>,
    pub verification_token: Option<String>,
    pub reset_token: Option<String>,
    pub search: Option<String>,
}

impl UserFilter {
    pub fn by_id(id: Uuid) -> Self {
        UserFilter {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn by_email(email: &str) -> Self {
        UserFilter {
            email: Some(email.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub role: Role,
    pub status: AccountStatus,
    pub verified: bool,
    pub verification_token: Option<String>,
}

/// Partial update. `None` leaves a column untouched; the nested options
/// distinguish "set to null" from "leave alone" for the nullable
/// link-token columns.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub avatar_id: Option<String>,
    pub role: Option<Role>,
    pub status: Option<AccountStatus>,
    pub verified: Option<bool>,
    pub verification_token: Option<Option<String>>,
    pub new_email: Option<Option<String>>,
    pub reset_token: Option<Option<String>>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_one(&self, filter: &UserFilter) -> Result<Option<User>, AppError>;

    async fn find_one_or_fail(&self, filter: &UserFilter) -> Result<User, AppError> {
        self.find_one(filter)
            .await?
            .ok_or(AppError::NotFound("user"))
    }

    async fn create(&self, user: NewUser) -> Result<User, AppError>;

    /// Returns the updated row; missing id fails with NotFound.
    async fn update_one(&self, id: Uuid, patch: UserPatch) -> Result<User, AppError>;

    /// Returns the deleted row; missing id fails with NotFound.
    async fn delete_one(&self, id: Uuid) -> Result<User, AppError>;

    async fn count(&self, filter: &UserFilter) -> Result<i64, AppError>;

    async fn find_page(
        &self,
        filter: &UserFilter,
        page: Option<&Page>,
        sort: SortOrder,
    ) -> Result<Vec<User>, AppError>;
}

// ── Blogs ───────────────────────────────────────────────────────────────

/// Posts are addressed by id internally and by slug on the public surface.
#[derive(Debug, Clone)]
pub enum BlogKey {
    Id(Uuid),
    Slug(String),
}

#[derive(Debug, Clone, Default)]
pub struct BlogFilter {
    pub id: Option<Uuid>,
    pub slug: Option<String>,
    pub user_id: Option<Uuid>,
    pub status: Option<BlogStatus>,
}

impl BlogFilter {
    pub fn by_key(key: &BlogKey) -> Self {
        match key {
            BlogKey::Id(id) => BlogFilter {
                id: Some(*id),
                ..Default::default()
            },
            BlogKey::Slug(slug) => BlogFilter {
                slug: Some(slug.clone()),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewBlog {
    pub user_id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub meta: String,
    pub tags: Vec<String>,
    pub status: BlogStatus,
}

#[derive(Debug, Clone, Default)]
pub struct BlogPatch {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub meta: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: Option<BlogStatus>,
    pub image_link: Option<String>,
    pub image_id: Option<String>,
}

#[async_trait]
pub trait BlogStore: Send + Sync {
    async fn find_one(&self, filter: &BlogFilter) -> Result<Option<Blog>, AppError>;

    async fn find_one_or_fail(&self, filter: &BlogFilter) -> Result<Blog, AppError> {
        self.find_one(filter)
            .await?
            .ok_or(AppError::NotFound("blog"))
    }

    async fn create(&self, blog: NewBlog) -> Result<Blog, AppError>;

    async fn update_one(&self, key: &BlogKey, patch: BlogPatch) -> Result<Blog, AppError>;

    async fn delete_one(&self, key: &BlogKey) -> Result<Blog, AppError>;

    async fn count(&self, filter: &BlogFilter) -> Result<i64, AppError>;

    async fn find_page(
        &self,
        filter: &BlogFilter,
        page: Option<&Page>,
        sort: SortOrder,
    ) -> Result<Vec<Blog>, AppError>;
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_params_means_unpaginated() {
        assert!(Page::from_query(None, None).is_none());
    }

    #[test]
    fn test_lone_page_defaults_limit_10() {
        let p = Page::from_query(Some(3), None).unwrap();
        assert_eq!((p.page, p.limit, p.skip()), (3, 10, 20));
    }

    #[test]
    fn test_lone_limit_defaults_page_1() {
        let p = Page::from_query(None, Some(25)).unwrap();
        assert_eq!((p.page, p.limit, p.skip()), (1, 25, 0));
    }

    #[test]
    fn test_negative_values_taken_absolute() {
        let p = Page::from_query(Some(-2), Some(-5)).unwrap();
        assert_eq!((p.page, p.limit, p.skip()), (2, 5, 5));
    }

    #[test]
    fn test_zero_limit_falls_back_to_default() {
        let p = Page::from_query(Some(1), Some(0)).unwrap();
        assert_eq!(p.limit, 10);
    }

    #[test]
    fn test_meta_omits_pagination_when_absent() {
        let meta = PageMeta::new(7, None);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json, serde_json::json!({ "count": 7 }));
    }
}
