//! Blog post flows behind the capability policy: every operation fetches
//! first, authorizes against the live row, then acts.

use std::sync::Arc;

use uuid::Uuid;

use crate::authz::authorize;
use crate::errors::AppError;
use crate::jobs::{JobQueue, SpooledUpload};
use crate::models::blog::{generate_slug, Blog, BlogAction, BlogPolicy, BlogStatus};
use crate::models::user::Principal;
use crate::store::{BlogFilter, BlogKey, BlogPatch, BlogStore, NewBlog, Page, PageMeta, SortOrder};

/// New post. Every post starts as a draft; the cover image is mandatory
/// and processed out of band.
#[derive(Debug, Clone)]
pub struct NewBlogRequest {
    pub title: String,
    pub content: String,
    pub meta: String,
    pub tags: Vec<String>,
    pub image: SpooledUpload,
}

#[derive(Debug, Clone, Default)]
pub struct BlogUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub meta: Option<String>,
    pub tags: Option<Vec<String>>,
    /// Re-derive the slug from the (new or current) title.
    pub update_slug: bool,
    pub image: Option<SpooledUpload>,
}

#[derive(Debug, Clone, Default)]
pub struct BlogListQuery {
    pub author: Option<Uuid>,
    pub id: Option<Uuid>,
    pub slug: Option<String>,
    pub status: Option<BlogStatus>,
    pub sort: SortOrder,
    pub page: Option<Page>,
}

#[derive(Clone)]
pub struct BlogService {
    blogs: Arc<dyn BlogStore>,
    queue: Arc<dyn JobQueue>,
}

impl BlogService {
    pub fn new(blogs: Arc<dyn BlogStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self { blogs, queue }
    }

    pub async fn create(&self, who: &Principal, req: NewBlogRequest) -> Result<Blog, AppError> {
        authorize(&BlogPolicy, who, BlogAction::Create, None, None)?;

        let blog = self
            .blogs
            .create(NewBlog {
                user_id: who.id,
                slug: generate_slug(&req.title),
                title: req.title,
                content: req.content,
                meta: req.meta,
                tags: req.tags,
                status: BlogStatus::Draft,
            })
            .await?;

        self.queue.enqueue(req.image.into_blog_image_job(blog.id)).await?;
        tracing::info!(blog_id = %blog.id, author = %who.id, "blog created");
        Ok(blog)
    }

    /// Staff see everything and may narrow by author, id, slug or status.
    /// Everyone else is pinned to their own posts; only the status filter
    /// survives from their query.
    pub async fn list(
        &self,
        who: &Principal,
        query: BlogListQuery,
    ) -> Result<(Vec<Blog>, PageMeta), AppError> {
        authorize(&BlogPolicy, who, BlogAction::ReadAll, None, None)?;

        let filter = if who.is_staff() {
            BlogFilter {
                id: query.id,
                slug: query.slug,
                user_id: query.author,
                status: query.status,
            }
        } else {
            BlogFilter {
                user_id: Some(who.id),
                status: query.status,
                ..Default::default()
            }
        };

        let blogs = self
            .blogs
            .find_page(&filter, query.page.as_ref(), query.sort)
            .await?;
        let count = self.blogs.count(&filter).await?;
        Ok((blogs, PageMeta::new(count, query.page.as_ref())))
    }

    /// A missing post is NotFound; an existing post outside the caller's
    /// scope is Forbidden. The fetch happens first so the two stay
    /// distinguishable.
    pub async fn get(&self, who: &Principal, key: &BlogKey) -> Result<Blog, AppError> {
        let blog = self.blogs.find_one_or_fail(&BlogFilter::by_key(key)).await?;
        authorize(&BlogPolicy, who, BlogAction::Read, Some(&blog), None)?;
        Ok(blog)
    }

    pub async fn update(
        &self,
        who: &Principal,
        key: &BlogKey,
        update: BlogUpdate,
    ) -> Result<Blog, AppError> {
        let blog = self.blogs.find_one_or_fail(&BlogFilter::by_key(key)).await?;
        authorize(&BlogPolicy, who, BlogAction::Update, Some(&blog), None)?;

        let mut patch = BlogPatch {
            title: update.title,
            content: update.content,
            meta: update.meta,
            tags: update.tags,
            ..Default::default()
        };
        if update.update_slug {
            let title = patch.title.as_deref().unwrap_or(&blog.title);
            patch.slug = Some(generate_slug(title));
        }

        let updated = self.blogs.update_one(key, patch).await?;

        if let Some(image) = update.image {
            self.queue.enqueue(image.into_blog_image_job(updated.id)).await?;
        }
        Ok(updated)
    }

    pub async fn update_status(
        &self,
        who: &Principal,
        key: &BlogKey,
        target: BlogStatus,
    ) -> Result<Blog, AppError> {
        let blog = self.blogs.find_one_or_fail(&BlogFilter::by_key(key)).await?;
        authorize(&BlogPolicy, who, BlogAction::UpdateStatus, Some(&blog), Some(&target))?;

        let updated = self
            .blogs
            .update_one(
                key,
                BlogPatch {
                    status: Some(target),
                    ..Default::default()
                },
            )
            .await?;
        tracing::info!(blog_id = %updated.id, status = target.as_str(), "blog status changed");
        Ok(updated)
    }

    pub async fn delete(&self, who: &Principal, key: &BlogKey) -> Result<Blog, AppError> {
        let blog = self.blogs.find_one_or_fail(&BlogFilter::by_key(key)).await?;
        authorize(&BlogPolicy, who, BlogAction::Destroy, Some(&blog), None)?;

        let deleted = self.blogs.delete_one(key).await?;
        tracing::info!(blog_id = %deleted.id, "blog deleted");
        Ok(deleted)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
