use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::blog::Blog;
use crate::models::user::User;
use crate::store::{
    BlogFilter, BlogKey, BlogPatch, BlogStore, NewBlog, NewUser, Page, SortOrder, UserFilter,
    UserPatch, UserStore,
};

const USER_COLS: &str = "id, first_name, last_name, email, password, bio, avatar, avatar_id, \
     role, status, verified, verification_token, new_email, reset_token, created_at, updated_at";

const BLOG_COLS: &str = "id, user_id, title, slug, content, meta, tags, status, image_link, \
     image_id, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

// ── Filter → WHERE clause ───────────────────────────────────────────────

fn push_user_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    if let Some(id) = filter.id {
        qb.push(" AND id = ").push_bind(id);
    }
    if let Some(email) = &filter.email {
        qb.push(" AND email = ").push_bind(email.clone());
    }
    if let Some(role) = filter.role {
        qb.push(" AND role = ").push_bind(role);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(verified) = filter.verified {
        qb.push(" AND verified = ").push_bind(verified);
    }
    if let Some(token) = &filter.verification_token {
        qb.push(" AND verification_token = ").push_bind(token.clone());
    }
    if let Some(token) = &filter.reset_token {
        qb.push(" AND reset_token = ").push_bind(token.clone());
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", search);
        qb.push(" AND (first_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR last_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn push_blog_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &BlogFilter) {
    if let Some(id) = filter.id {
        qb.push(" AND id = ").push_bind(id);
    }
    if let Some(slug) = &filter.slug {
        qb.push(" AND slug = ").push_bind(slug.clone());
    }
    if let Some(user_id) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
}

fn push_order_and_page(qb: &mut QueryBuilder<'_, Postgres>, page: Option<&Page>, sort: SortOrder) {
    qb.push(match sort {
        SortOrder::Asc => " ORDER BY created_at ASC",
        SortOrder::Desc => " ORDER BY created_at DESC",
    });
    if let Some(p) = page {
        qb.push(" LIMIT ").push_bind(p.limit);
        qb.push(" OFFSET ").push_bind(p.skip());
    }
}

// ── UserStore ───────────────────────────────────────────────────────────

#[async_trait]
impl UserStore for PgStore {
    async fn find_one(&self, filter: &UserFilter) -> Result<Option<User>, AppError> {
        let mut qb = QueryBuilder::new(format!("SELECT {} FROM users WHERE 1=1", USER_COLS));
        push_user_filter(&mut qb, filter);
        qb.push(" LIMIT 1");
        let user = qb
            .build_query_as::<User>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn create(&self, user: NewUser) -> Result<User, AppError> {
        let row = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (first_name, last_name, email, password, bio, avatar, role, status, verified, verification_token) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {}",
            USER_COLS
        ))
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password)
        .bind(&user.bio)
        .bind(&user.avatar)
        .bind(user.role)
        .bind(user.status)
        .bind(user.verified)
        .bind(&user.verification_token)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_one(&self, id: Uuid, patch: UserPatch) -> Result<User, AppError> {
        let mut qb = QueryBuilder::new("UPDATE users SET updated_at = now()");
        if let Some(v) = patch.first_name {
            qb.push(", first_name = ").push_bind(v);
        }
        if let Some(v) = patch.last_name {
            qb.push(", last_name = ").push_bind(v);
        }
        if let Some(v) = patch.email {
            qb.push(", email = ").push_bind(v);
        }
        if let Some(v) = patch.password {
            qb.push(", password = ").push_bind(v);
        }
        if let Some(v) = patch.bio {
            qb.push(", bio = ").push_bind(v);
        }
        if let Some(v) = patch.avatar {
            qb.push(", avatar = ").push_bind(v);
        }
        if let Some(v) = patch.avatar_id {
            qb.push(", avatar_id = ").push_bind(v);
        }
        if let Some(v) = patch.role {
            qb.push(", role = ").push_bind(v);
        }
        if let Some(v) = patch.status {
            qb.push(", status = ").push_bind(v);
        }
        if let Some(v) = patch.verified {
            qb.push(", verified = ").push_bind(v);
        }
        if let Some(v) = patch.verification_token {
            qb.push(", verification_token = ").push_bind(v);
        }
        if let Some(v) = patch.new_email {
            qb.push(", new_email = ").push_bind(v);
        }
        if let Some(v) = patch.reset_token {
            qb.push(", reset_token = ").push_bind(v);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(" RETURNING ").push(USER_COLS);

        qb.build_query_as::<User>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound("user"))
    }

    async fn delete_one(&self, id: Uuid) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(&format!(
            "DELETE FROM users WHERE id = $1 RETURNING {}",
            USER_COLS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound("user"))
    }

    async fn count(&self, filter: &UserFilter) -> Result<i64, AppError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM users WHERE 1=1");
        push_user_filter(&mut qb, filter);
        let count = qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn find_page(
        &self,
        filter: &UserFilter,
        page: Option<&Page>,
        sort: SortOrder,
    ) -> Result<Vec<User>, AppError> {
        let mut qb = QueryBuilder::new(format!("SELECT {} FROM users WHERE 1=1", USER_COLS));
        push_user_filter(&mut qb, filter);
        push_order_and_page(&mut qb, page, sort);
        let rows = qb.build_query_as::<User>().fetch_all(&self.pool).await?;
        Ok(rows)
    }
}

// ── BlogStore ───────────────────────────────────────────────────────────

#[async_trait]
impl BlogStore for PgStore {
    async fn find_one(&self, filter: &BlogFilter) -> Result<Option<Blog>, AppError> {
        let mut qb = QueryBuilder::new(format!("SELECT {} FROM blogs WHERE 1=1", BLOG_COLS));
        push_blog_filter(&mut qb, filter);
        qb.push(" LIMIT 1");
        let blog = qb
            .build_query_as::<Blog>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(blog)
    }

    async fn create(&self, blog: NewBlog) -> Result<Blog, AppError> {
        let row = sqlx::query_as::<_, Blog>(&format!(
            "INSERT INTO blogs (user_id, title, slug, content, meta, tags, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {}",
            BLOG_COLS
        ))
        .bind(blog.user_id)
        .bind(&blog.title)
        .bind(&blog.slug)
        .bind(&blog.content)
        .bind(&blog.meta)
        .bind(&blog.tags)
        .bind(blog.status)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_one(&self, key: &BlogKey, patch: BlogPatch) -> Result<Blog, AppError> {
        let mut qb = QueryBuilder::new("UPDATE blogs SET updated_at = now()");
        if let Some(v) = patch.title {
            qb.push(", title = ").push_bind(v);
        }
        if let Some(v) = patch.slug {
            qb.push(", slug = ").push_bind(v);
        }
        if let Some(v) = patch.content {
            qb.push(", content = ").push_bind(v);
        }
        if let Some(v) = patch.meta {
            qb.push(", meta = ").push_bind(v);
        }
        if let Some(v) = patch.tags {
            qb.push(", tags = ").push_bind(v);
        }
        if let Some(v) = patch.status {
            qb.push(", status = ").push_bind(v);
        }
        if let Some(v) = patch.image_link {
            qb.push(", image_link = ").push_bind(v);
        }
        if let Some(v) = patch.image_id {
            qb.push(", image_id = ").push_bind(v);
        }
        match key {
            BlogKey::Id(id) => {
                qb.push(" WHERE id = ").push_bind(*id);
            }
            BlogKey::Slug(slug) => {
                qb.push(" WHERE slug = ").push_bind(slug.clone());
            }
        }
        qb.push(" RETURNING ").push(BLOG_COLS);

        qb.build_query_as::<Blog>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound("blog"))
    }

    async fn delete_one(&self, key: &BlogKey) -> Result<Blog, AppError> {
        let mut qb = QueryBuilder::new("DELETE FROM blogs");
        match key {
            BlogKey::Id(id) => {
                qb.push(" WHERE id = ").push_bind(*id);
            }
            BlogKey::Slug(slug) => {
                qb.push(" WHERE slug = ").push_bind(slug.clone());
            }
        }
        qb.push(" RETURNING ").push(BLOG_COLS);

        qb.build_query_as::<Blog>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound("blog"))
    }

    async fn count(&self, filter: &BlogFilter) -> Result<i64, AppError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM blogs WHERE 1=1");
        push_blog_filter(&mut qb, filter);
        let count = qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn find_page(
        &self,
        filter: &BlogFilter,
        page: Option<&Page>,
        sort: SortOrder,
    ) -> Result<Vec<Blog>, AppError> {
        let mut qb = QueryBuilder::new(format!("SELECT {} FROM blogs WHERE 1=1", BLOG_COLS));
        push_blog_filter(&mut qb, filter);
        push_order_and_page(&mut qb, page, sort);
        let rows = qb.build_query_as::<Blog>().fetch_all(&self.pool).await?;
        Ok(rows)
    }
}
