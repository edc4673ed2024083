pub mod handlers;
pub mod queue;
pub mod runner;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::mail::Email;

/// Everything the background worker knows how to run.
///
/// The wire shape is `{ "task": name, "data": payload }`. Payloads carry
/// durable data only: ids, spooled file paths, rendered contexts. Nothing
/// in here may reference an open connection, stream or request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", content = "data", rename_all = "camelCase")]
pub enum Job {
    SendEmail(Email),
    UploadProfilePicture(UploadProfilePicture),
    UploadBlogImage(UploadBlogImage),
    DeleteProfilePicture(DeleteProfilePicture),
}

impl Job {
    pub fn task_name(&self) -> &'static str {
        match self {
            Job::SendEmail(_) => "sendEmail",
            Job::UploadProfilePicture(_) => "uploadProfilePicture",
            Job::UploadBlogImage(_) => "uploadBlogImage",
            Job::DeleteProfilePicture(_) => "deleteProfilePicture",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadProfilePicture {
    pub user_id: Uuid,
    /// Spooled upload on local disk. The job owns this file and removes
    /// it once processed; a missing file means the work already happened.
    pub path: String,
    pub content_type: String,
    pub folder: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadBlogImage {
    pub blog_id: Uuid,
    pub path: String,
    pub content_type: String,
    pub folder: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteProfilePicture {
    pub file_id: String,
}

/// An upload already written to the spool directory, ready to become a
/// job payload. The request that produced it may be long gone by the time
/// the worker reads the file.
#[derive(Debug, Clone, PartialEq)]
pub struct SpooledUpload {
    pub path: String,
    pub content_type: String,
}

impl SpooledUpload {
    pub fn into_profile_picture_job(self, user_id: Uuid) -> Job {
        Job::UploadProfilePicture(UploadProfilePicture {
            user_id,
            path: self.path,
            content_type: self.content_type,
            folder: "profile-pictures".to_string(),
        })
    }

    pub fn into_blog_image_job(self, blog_id: Uuid) -> Job {
        Job::UploadBlogImage(UploadBlogImage {
            blog_id,
            path: self.path,
            content_type: self.content_type,
            folder: "blogs".to_string(),
        })
    }
}

/// Producer side of the job pipeline.
///
/// `enqueue` returns once the job is durably queued and never waits on
/// execution; request handlers must not block on side effects.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> Result<(), AppError>;
}

// ── Tests ───────────────────────────────────────────────────────────────
