use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::blog::Blog;
use crate::models::user::User;
use crate::store::{
    BlogFilter, BlogKey, BlogPatch, BlogStore, NewBlog, NewUser, Page, SortOrder, UserFilter,
    UserPatch, UserStore,
};

/// In-process store with the same contract as `PgStore`. Backs the test
/// suites and lets the binary run without a database.
#[derive(Clone, Default)]
pub struct MemoryStore {
    users: Arc<DashMap<Uuid, User>>,
    blogs: Arc<DashMap<Uuid, Blog>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn user_matches(u: &User, f: &UserFilter) -> bool {
    if f.id.is_some_and(|id| u.id != id) {
        return false;
    }
    if f.email.as_ref().is_some_and(|e| &u.email != e) {
        return false;
    }
    if f.role.is_some_and(|r| u.role != r) {
        return false;
    }
    if f.status.is_some_and(|s| u.status != s) {
        return false;
    }
    if f.verified.is_some_and(|v| u.verified != v) {
        return false;
    }
    if f.verification_token
        .as_ref()
        .is_some_and(|t| u.verification_token.as_ref() != Some(t))
    {
        return false;
    }
    if f.reset_token
        .as_ref()
        .is_some_and(|t| u.reset_token.as_ref() != Some(t))
    {
        return false;
    }
    if let Some(search) = &f.search {
        let needle = search.to_lowercase();
        let hit = u.first_name.to_lowercase().contains(&needle)
            || u.last_name.to_lowercase().contains(&needle)
            || u.email.to_lowercase().contains(&needle);
        if !hit {
            return false;
        }
    }
    true
}

fn blog_matches(b: &Blog, f: &BlogFilter) -> bool {
    if f.id.is_some_and(|id| b.id != id) {
        return false;
    }
    if f.slug.as_ref().is_some_and(|s| &b.slug != s) {
        return false;
    }
    if f.user_id.is_some_and(|u| b.user_id != u) {
        return false;
    }
    if f.status.is_some_and(|s| b.status != s) {
        return false;
    }
    true
}

fn paginate<T>(mut rows: Vec<T>, page: Option<&Page>) -> Vec<T> {
    if let Some(p) = page {
        let skip = p.skip().max(0) as usize;
        if skip >= rows.len() {
            return Vec::new();
        }
        rows = rows.split_off(skip);
        rows.truncate(p.limit.max(0) as usize);
    }
    rows
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_one(&self, filter: &UserFilter) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .iter()
            .find(|r| user_matches(r.value(), filter))
            .map(|r| r.value().clone()))
    }

    async fn create(&self, user: NewUser) -> Result<User, AppError> {
        let now = Utc::now();
        let row = User {
            id: Uuid::new_v4(),
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            password: user.password,
            bio: user.bio,
            avatar: user.avatar,
            avatar_id: None,
            role: user.role,
            status: user.status,
            verified: user.verified,
            verification_token: user.verification_token,
            new_email: None,
            reset_token: None,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_one(&self, id: Uuid, patch: UserPatch) -> Result<User, AppError> {
        let mut entry = self.users.get_mut(&id).ok_or(AppError::NotFound("user"))?;
        let u = entry.value_mut();
        if let Some(v) = patch.first_name {
            u.first_name = v;
        }
        if let Some(v) = patch.last_name {
            u.last_name = v;
        }
        if let Some(v) = patch.email {
            u.email = v;
        }
        if let Some(v) = patch.password {
            u.password = v;
        }
        if let Some(v) = patch.bio {
            u.bio = Some(v);
        }
        if let Some(v) = patch.avatar {
            u.avatar = Some(v);
        }
        if let Some(v) = patch.avatar_id {
            u.avatar_id = Some(v);
        }
        if let Some(v) = patch.role {
            u.role = v;
        }
        if let Some(v) = patch.status {
            u.status = v;
        }
        if let Some(v) = patch.verified {
            u.verified = v;
        }
        if let Some(v) = patch.verification_token {
            u.verification_token = v;
        }
        if let Some(v) = patch.new_email {
            u.new_email = v;
        }
        if let Some(v) = patch.reset_token {
            u.reset_token = v;
        }
        u.updated_at = Utc::now();
        Ok(u.clone())
    }

    async fn delete_one(&self, id: Uuid) -> Result<User, AppError> {
        self.users
            .remove(&id)
            .map(|(_, u)| u)
            .ok_or(AppError::NotFound("user"))
    }

    async fn count(&self, filter: &UserFilter) -> Result<i64, AppError> {
        Ok(self
            .users
            .iter()
            .filter(|r| user_matches(r.value(), filter))
            .count() as i64)
    }

    async fn find_page(
        &self,
        filter: &UserFilter,
        page: Option<&Page>,
        sort: SortOrder,
    ) -> Result<Vec<User>, AppError> {
        let mut rows: Vec<User> = self
            .users
            .iter()
            .filter(|r| user_matches(r.value(), filter))
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by_key(|u| (u.created_at, u.id));
        if sort == SortOrder::Desc {
            rows.reverse();
        }
        Ok(paginate(rows, page))
    }
}

#[async_trait]
impl BlogStore for MemoryStore {
    async fn find_one(&self, filter: &BlogFilter) -> Result<Option<Blog>, AppError> {
        Ok(self
            .blogs
            .iter()
            .find(|r| blog_matches(r.value(), filter))
            .map(|r| r.value().clone()))
    }

    async fn create(&self, blog: NewBlog) -> Result<Blog, AppError> {
        let now = Utc::now();
        let row = Blog {
            id: Uuid::new_v4(),
            user_id: blog.user_id,
            title: blog.title,
            slug: blog.slug,
            content: blog.content,
            meta: blog.meta,
            tags: blog.tags,
            status: blog.status,
            image_link: None,
            image_id: None,
            created_at: now,
            updated_at: now,
        };
        self.blogs.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_one(&self, key: &BlogKey, patch: BlogPatch) -> Result<Blog, AppError> {
        let id = self.resolve(key)?;
        let mut entry = self.blogs.get_mut(&id).ok_or(AppError::NotFound("blog"))?;
        let b = entry.value_mut();
        if let Some(v) = patch.title {
            b.title = v;
        }
        if let Some(v) = patch.slug {
            b.slug = v;
        }
        if let Some(v) = patch.content {
            b.content = v;
        }
        if let Some(v) = patch.meta {
            b.meta = v;
        }
        if let Some(v) = patch.tags {
            b.tags = v;
        }
        if let Some(v) = patch.status {
            b.status = v;
        }
        if let Some(v) = patch.image_link {
            b.image_link = Some(v);
        }
        if let Some(v) = patch.image_id {
            b.image_id = Some(v);
        }
        b.updated_at = Utc::now();
        Ok(b.clone())
    }

    async fn delete_one(&self, key: &BlogKey) -> Result<Blog, AppError> {
        let id = self.resolve(key)?;
        self.blogs
            .remove(&id)
            .map(|(_, b)| b)
            .ok_or(AppError::NotFound("blog"))
    }

    async fn count(&self, filter: &BlogFilter) -> Result<i64, AppError> {
        Ok(self
            .blogs
            .iter()
            .filter(|r| blog_matches(r.value(), filter))
            .count() as i64)
    }

    async fn find_page(
        &self,
        filter: &BlogFilter,
        page: Option<&Page>,
        sort: SortOrder,
    ) -> Result<Vec<Blog>, AppError> {
        let mut rows: Vec<Blog> = self
            .blogs
            .iter()
            .filter(|r| blog_matches(r.value(), filter))
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by_key(|b| (b.created_at, b.id));
        if sort == SortOrder::Desc {
            rows.reverse();
        }
        Ok(paginate(rows, page))
    }
}

impl MemoryStore {
    fn resolve(&self, key: &BlogKey) -> Result<Uuid, AppError> {
        match key {
            BlogKey::Id(id) => Ok(*id),
            BlogKey::Slug(slug) => self
                .blogs
                .iter()
                .find(|r| &r.value().slug == slug)
                .map(|r| r.value().id)
                .ok_or(AppError::NotFound("blog")),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::{AccountStatus, Role};

    fn new_user(first: &str, last: &str, email: &str) -> NewUser {
        NewUser {
            first_name: first.into(),
            last_name: last.into(),
            email: email.into(),
            password: "hash".into(),
            bio: None,
            avatar: None,
            role: Role::User,
            status: AccountStatus::Active,
            verified: true,
            verification_token: None,
        }
    }

    // MemoryStore implements both store traits, so method calls on the
    // concrete type are ambiguous. Tests go through trait bindings the
    // way production code does.

    #[tokio::test]
    async fn test_search_is_case_insensitive_across_fields() {
        let store = MemoryStore::new();
        let users: &dyn UserStore = &store;
        users.create(new_user("Ada", "Lovelace", "ada@calc.org")).await.unwrap();
        users.create(new_user("Grace", "Hopper", "grace@navy.mil")).await.unwrap();

        let filter = UserFilter {
            search: Some("LOVE".into()),
            ..Default::default()
        };
        let hits = users.find_page(&filter, None, SortOrder::Desc).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].first_name, "Ada");

        let by_email = UserFilter {
            search: Some("navy".into()),
            ..Default::default()
        };
        assert_eq!(users.count(&by_email).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_page_slices_after_sort() {
        let store = MemoryStore::new();
        let users: &dyn UserStore = &store;
        for i in 0..5 {
            users
                .create(new_user("U", "Ser", &format!("u{}@x.io", i)))
                .await
                .unwrap();
        }
        let page = Page { page: 2, limit: 2 };
        let rows = users
            .find_page(&UserFilter::default(), Some(&page), SortOrder::Asc)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        let last = users
            .find_page(&UserFilter::default(), Some(&Page { page: 3, limit: 2 }), SortOrder::Asc)
            .await
            .unwrap();
        assert_eq!(last.len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_user_is_not_found() {
        let store = MemoryStore::new();
        let users: &dyn UserStore = &store;
        let err = users
            .update_one(Uuid::new_v4(), UserPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound("user")));
    }

    #[tokio::test]
    async fn test_nested_option_clears_token_column() {
        let store = MemoryStore::new();
        let users: &dyn UserStore = &store;
        let mut spec = new_user("A", "B", "a@b.c");
        spec.verification_token = Some("tok".into());
        let u = users.create(spec).await.unwrap();

        let updated = users
            .update_one(
                u.id,
                UserPatch {
                    verification_token: Some(None),
                    verified: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.verification_token, None);
        assert!(updated.verified);
    }

    #[tokio::test]
    async fn test_blog_addressed_by_slug_and_id() {
        let store = MemoryStore::new();
        let blogs: &dyn BlogStore = &store;
        let b = blogs
            .create(NewBlog {
                user_id: Uuid::new_v4(),
                title: "T".into(),
                slug: "t-aabbccdd".into(),
                content: "c".into(),
                meta: "m".into(),
                tags: vec!["rust".into()],
                status: crate::models::blog::BlogStatus::Draft,
            })
            .await
            .unwrap();

        let by_slug = blogs
            .update_one(
                &BlogKey::Slug("t-aabbccdd".into()),
                BlogPatch {
                    title: Some("T2".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(by_slug.title, "T2");

        let gone = blogs.delete_one(&BlogKey::Id(b.id)).await.unwrap();
        assert_eq!(gone.id, b.id);
        assert!(blogs
            .delete_one(&BlogKey::Slug("t-aabbccdd".into()))
            .await
            .is_err());
    }
}
