//! Job execution. Every handler must tolerate redelivery: the queue
//! promises at-least-once, so a handler can run again after a crash that
//! happened anywhere between reserve and ack.

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::errors::AppError;
use crate::jobs::{DeleteProfilePicture, Job, UploadBlogImage, UploadProfilePicture};
use crate::mail::{Email, Mailer};
use crate::store::media::MediaStore;
use crate::store::{BlogKey, BlogPatch, UserFilter, UserPatch, UserStore};
use crate::store::{BlogFilter, BlogStore};

/// Cap on old-asset deletes. Replacing an image must not hang on a slow
/// storage backend; the orphan costs pennies, a stuck worker costs jobs.
const REMOVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a handler may touch. Handlers reach external systems only
/// through these seams so the suite can run them against in-memory
/// doubles.
#[derive(Clone)]
pub struct JobContext {
    pub users: Arc<dyn UserStore>,
    pub blogs: Arc<dyn BlogStore>,
    pub mailer: Arc<dyn Mailer>,
    pub media: Arc<dyn MediaStore>,
}

/// Run one job to completion. An `Err` here means the delivery should be
/// retried; handlers resolve terminal conditions (missing rows, spent
/// spool files) to `Ok` themselves.
pub async fn dispatch(ctx: &JobContext, job: &Job) -> Result<()> {
    match job {
        Job::SendEmail(email) => send_email(ctx, email).await,
        Job::UploadProfilePicture(j) => upload_profile_picture(ctx, j).await,
        Job::UploadBlogImage(j) => upload_blog_image(ctx, j).await,
        Job::DeleteProfilePicture(j) => {
            if !delete_profile_picture(ctx, j).await {
                tracing::warn!(file_id = %j.file_id, "profile picture delete reported failure");
            }
            Ok(())
        }
    }
}

async fn send_email(ctx: &JobContext, email: &Email) -> Result<()> {
    ctx.mailer.send(email).await?;
    tracing::info!(to = %email.to, subject = %email.subject, "email sent");
    Ok(())
}

async fn upload_profile_picture(ctx: &JobContext, job: &UploadProfilePicture) -> Result<()> {
    // Spool file first. It is deleted as the last step of a successful
    // run, so its absence marks a redelivery of finished work.
    let bytes = match tokio::fs::read(&job.path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!(path = %job.path, "spooled upload already consumed, nothing to do");
            return Ok(());
        }
        Err(e) => return Err(e).context("failed to read spooled upload"),
    };

    let Some(user) = ctx.users.find_one(&UserFilter::by_id(job.user_id)).await? else {
        tracing::warn!(user_id = %job.user_id, "upload target user no longer exists");
        cleanup_spool(&job.path).await;
        return Ok(());
    };

    if let Some(old_id) = user.avatar_id.as_deref() {
        remove_best_effort(ctx.media.as_ref(), old_id).await;
    }

    let asset = ctx
        .media
        .upload(bytes, &job.content_type, &job.folder)
        .await?;

    let patch = UserPatch {
        avatar: Some(asset.url.clone()),
        avatar_id: Some(asset.id.clone()),
        ..Default::default()
    };
    match ctx.users.update_one(job.user_id, patch).await {
        Ok(_) => {}
        Err(AppError::NotFound(_)) => {
            tracing::warn!(user_id = %job.user_id, "user deleted mid-upload, dropping new asset");
            remove_best_effort(ctx.media.as_ref(), &asset.id).await;
        }
        Err(e) => return Err(e.into()),
    }

    cleanup_spool(&job.path).await;
    Ok(())
}

async fn upload_blog_image(ctx: &JobContext, job: &UploadBlogImage) -> Result<()> {
    let bytes = match tokio::fs::read(&job.path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!(path = %job.path, "spooled upload already consumed, nothing to do");
            return Ok(());
        }
        Err(e) => return Err(e).context("failed to read spooled upload"),
    };

    let key = BlogKey::Id(job.blog_id);
    let Some(blog) = ctx.blogs.find_one(&BlogFilter::by_key(&key)).await? else {
        tracing::warn!(blog_id = %job.blog_id, "upload target blog no longer exists");
        cleanup_spool(&job.path).await;
        return Ok(());
    };

    if let Some(old_id) = blog.image_id.as_deref() {
        remove_best_effort(ctx.media.as_ref(), old_id).await;
    }

    let asset = ctx
        .media
        .upload(bytes, &job.content_type, &job.folder)
        .await?;

    let patch = BlogPatch {
        image_link: Some(asset.url.clone()),
        image_id: Some(asset.id.clone()),
        ..Default::default()
    };
    match ctx.blogs.update_one(&key, patch).await {
        Ok(_) => {}
        Err(AppError::NotFound(_)) => {
            tracing::warn!(blog_id = %job.blog_id, "blog deleted mid-upload, dropping new asset");
            remove_best_effort(ctx.media.as_ref(), &asset.id).await;
        }
        Err(e) => return Err(e.into()),
    }

    cleanup_spool(&job.path).await;
    Ok(())
}

/// Remove a stored asset. Returns whether the delete went through; a
/// failure is logged and absorbed so account deletion never blocks on
/// storage trouble.
async fn delete_profile_picture(ctx: &JobContext, job: &DeleteProfilePicture) -> bool {
    match ctx.media.remove(&job.file_id).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(file_id = %job.file_id, error = %e, "failed to remove stored asset");
            false
        }
    }
}

/// Delete an asset without letting the main flow fail or stall on it.
async fn remove_best_effort(media: &dyn MediaStore, id: &str) {
    match tokio::time::timeout(REMOVE_TIMEOUT, media.remove(id)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(asset_id = %id, error = %e, "failed to remove replaced asset")
        }
        Err(_) => tracing::warn!(asset_id = %id, "timed out removing replaced asset"),
    }
}

async fn cleanup_spool(path: &str) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            tracing::warn!(path = %path, error = %e, "failed to remove spooled upload");
        }
    }
}
