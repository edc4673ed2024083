//! MediaStore — pluggable storage for uploaded image assets.
//!
//! Backends are selected by the `MEDIA_STORE_URL` scheme:
//!
//! ```text
//! # S3
//! MEDIA_STORE_URL=s3://my-bucket?region=us-east-1
//!
//! # MinIO (self-hosted S3-compatible)
//! MEDIA_STORE_URL=s3://my-bucket?endpoint=http://minio:9000&region=us-east-1
//!
//! # Local filesystem (dev default)
//! MEDIA_STORE_URL=file:///tmp/inkwell-media
//!
//! # Process-local memory (tests)
//! MEDIA_STORE_URL=memory://
//! ```
//!
//! Assets live under `{folder}/{uuid}.{ext}`; the asset id *is* the object
//! key, so a delete needs nothing but the id.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use object_store::{path::Path, ObjectStore};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct StoredAsset {
    /// Publicly reachable URL for the asset.
    pub url: String,
    /// Storage id used for later deletion.
    pub id: String,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Store an image and return its public URL + storage id.
    async fn upload(&self, bytes: Vec<u8>, content_type: &str, folder: &str)
        -> Result<StoredAsset>;

    /// Remove an asset. Deleting an id that no longer exists is not an
    /// error; re-deletes must stay silent.
    async fn remove(&self, id: &str) -> Result<()>;
}

pub struct ObjectMediaStore {
    store: Arc<dyn ObjectStore>,
    public_base: String,
}

impl ObjectMediaStore {
    /// Build from a `MEDIA_STORE_URL`-style URL and the public base URL
    /// prepended to asset keys.
    pub fn from_url(url: &str, public_base: &str) -> Result<Self> {
        let store = build_object_store(url)?;
        tracing::info!(url = %url, "MediaStore: using object store backend");
        Ok(Self {
            store: Arc::from(store),
            public_base: public_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MediaStore for ObjectMediaStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
        folder: &str,
    ) -> Result<StoredAsset> {
        let ext = extension_for(content_type)
            .with_context(|| format!("unsupported media content type: {}", content_type))?;
        let key = format!("{}/{}.{}", folder, Uuid::new_v4(), ext);
        let path = Path::from(key.clone());

        self.store
            .put(&path, bytes.into())
            .await
            .context("failed to put asset to object store")?;

        tracing::debug!(key = %key, "asset stored");
        Ok(StoredAsset {
            url: format!("{}/{}", self.public_base, key),
            id: key,
        })
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let path = Path::from(id);
        match self.store.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e).context("failed to delete asset from object store"),
        }
    }
}

/// Accepted upload types and their stored extensions.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        _ => None,
    }
}

/// Parse a media store URL and return the backing implementation.
fn build_object_store(url: &str) -> Result<Box<dyn ObjectStore>> {
    if url.starts_with("memory://") {
        return Ok(Box::new(object_store::memory::InMemory::new()));
    }

    if url.starts_with("file://") {
        let path = url.trim_start_matches("file://");
        std::fs::create_dir_all(path)
            .with_context(|| format!("failed to create media directory {}", path))?;
        let store = object_store::local::LocalFileSystem::new_with_prefix(path)
            .context("failed to create local file system object store")?;
        return Ok(Box::new(store));
    }

    if url.starts_with("s3://") {
        // Parse the bucket name from s3://bucket-name?...
        let without_scheme = url.trim_start_matches("s3://");
        let bucket = without_scheme.split('?').next().unwrap_or(without_scheme);

        // Check for custom endpoint (MinIO)
        let endpoint = parse_query_param(url, "endpoint");
        let region = parse_query_param(url, "region").unwrap_or_else(|| "us-east-1".to_string());

        let mut builder = object_store::aws::AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(&region);

        if let Some(ep) = endpoint {
            builder = builder.with_endpoint(&ep).with_allow_http(true);
        }

        // Credentials from env: AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY
        // (or instance metadata / IAM role in production)
        if let Ok(key) = std::env::var("AWS_ACCESS_KEY_ID") {
            if let Ok(secret) = std::env::var("AWS_SECRET_ACCESS_KEY") {
                builder = builder
                    .with_access_key_id(key)
                    .with_secret_access_key(secret);
            }
        }

        let store = builder.build().context("failed to build S3 object store")?;
        return Ok(Box::new(store));
    }

    anyhow::bail!("unsupported MEDIA_STORE_URL scheme: {}", url)
}

fn parse_query_param(url: &str, key: &str) -> Option<String> {
    let query = url.split('?').nth(1)?;
    for part in query.split('&') {
        let mut kv = part.splitn(2, '=');
        if kv.next() == Some(key) {
            return kv
                .next()
                .map(|v| urlencoding::decode(v).unwrap_or_default().into_owned());
        }
    }
    None
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store() -> ObjectMediaStore {
        ObjectMediaStore::from_url("memory://", "http://cdn.local/media").unwrap()
    }

    #[tokio::test]
    async fn test_upload_builds_key_and_public_url() {
        let store = memory_store();
        let asset = store
            .upload(vec![1, 2, 3], "image/png", "profile-pictures")
            .await
            .unwrap();
        assert!(asset.id.starts_with("profile-pictures/"));
        assert!(asset.id.ends_with(".png"));
        assert_eq!(asset.url, format!("http://cdn.local/media/{}", asset.id));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let store = memory_store();
        let asset = store
            .upload(vec![9], "image/jpeg", "blogs")
            .await
            .unwrap();
        store.remove(&asset.id).await.unwrap();
        // second delete of the same id is silent
        store.remove(&asset.id).await.unwrap();
        // and so is a delete of an id that never existed
        store.remove("blogs/nope.jpg").await.unwrap();
    }

    #[tokio::test]
    async fn test_unsupported_content_type_is_rejected() {
        let store = memory_store();
        let err = store.upload(vec![0], "image/gif", "blogs").await;
        assert!(err.is_err());
    }

    #[test]
    fn test_extension_mapping() {
        assert_eq!(extension_for("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for("image/jpg"), Some("jpg"));
        assert_eq!(extension_for("image/png"), Some("png"));
        assert_eq!(extension_for("application/pdf"), None);
    }
}
