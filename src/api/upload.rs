//! Multipart intake: whitelisted text fields plus at most one image,
//! spooled to local disk so the request can finish before any storage
//! work happens.

use axum::extract::multipart::Multipart;
use uuid::Uuid;

use crate::errors::AppError;
use crate::jobs::SpooledUpload;

/// Upload cap, matching the public contract.
pub const MAX_UPLOAD_BYTES: usize = 1024 * 1024;

const ALLOWED_TYPES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];

/// A fully read multipart form. Text fields keep arrival order and may
/// repeat (`tags`); the image, when present, is already on disk.
pub struct MultipartForm {
    texts: Vec<(String, String)>,
    pub upload: Option<SpooledUpload>,
}

impl MultipartForm {
    /// Drain the request body. `file_field` names the one part treated as
    /// an image; every text part must be listed in `text_fields` or the
    /// whole request is rejected on first contact.
    pub async fn read(
        multipart: &mut Multipart,
        file_field: &str,
        text_fields: &[&str],
        spool_dir: &str,
    ) -> Result<Self, AppError> {
        let mut form = MultipartForm {
            texts: Vec::new(),
            upload: None,
        };

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                return Err(AppError::Validation(
                    "multipart field is missing a name".into(),
                ));
            };

            if name == file_field {
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_default();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(e.body_text()))?;
                if bytes.is_empty() {
                    continue;
                }
                if !ALLOWED_TYPES.contains(&content_type.as_str()) {
                    return Err(AppError::Validation(format!(
                        "{} must be a jpg, jpeg or png image",
                        file_field
                    )));
                }
                if bytes.len() > MAX_UPLOAD_BYTES {
                    return Err(AppError::Validation(format!(
                        "{} must not exceed 1 MB",
                        file_field
                    )));
                }
                form.upload = Some(spool(&bytes, &content_type, spool_dir).await?);
            } else if text_fields.contains(&name.as_str()) {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(e.body_text()))?;
                form.texts.push((name, value));
            } else {
                return Err(AppError::Validation(format!(
                    "property {} should not exist",
                    name
                )));
            }
        }

        Ok(form)
    }

    /// First occurrence, moved out.
    pub fn take(&mut self, name: &str) -> Option<String> {
        let idx = self.texts.iter().position(|(n, _)| n == name)?;
        Some(self.texts.remove(idx).1)
    }

    /// Every occurrence, in arrival order.
    pub fn take_all(&mut self, name: &str) -> Vec<String> {
        let mut values = Vec::new();
        while let Some(v) = self.take(name) {
            values.push(v);
        }
        values
    }
}

async fn spool(bytes: &[u8], content_type: &str, spool_dir: &str) -> Result<SpooledUpload, AppError> {
    let ext = match content_type {
        "image/png" => "png",
        _ => "jpg",
    };
    let path = format!("{}/{}.{}", spool_dir.trim_end_matches('/'), Uuid::new_v4(), ext);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to spool upload: {}", e)))?;
    Ok(SpooledUpload {
        path,
        content_type: content_type.to_string(),
    })
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn form_with(texts: Vec<(&str, &str)>) -> MultipartForm {
        MultipartForm {
            texts: texts
                .into_iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
            upload: None,
        }
    }

    #[test]
    fn test_take_removes_first_occurrence() {
        let mut form = form_with(vec![("title", "One"), ("title", "Two")]);
        assert_eq!(form.take("title").as_deref(), Some("One"));
        assert_eq!(form.take("title").as_deref(), Some("Two"));
        assert_eq!(form.take("title"), None);
    }

    #[test]
    fn test_take_all_preserves_order() {
        let mut form = form_with(vec![("tags", "rust"), ("meta", "m"), ("tags", "tokio")]);
        assert_eq!(form.take_all("tags"), vec!["rust", "tokio"]);
        assert_eq!(form.take("meta").as_deref(), Some("m"));
    }

    #[tokio::test]
    async fn test_spool_writes_with_extension() {
        let dir = std::env::temp_dir().join("spool-test");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let dir = dir.display().to_string();

        let upload = spool(b"png-bytes", "image/png", &dir).await.unwrap();
        assert!(upload.path.ends_with(".png"));
        assert_eq!(upload.content_type, "image/png");
        let written = tokio::fs::read(&upload.path).await.unwrap();
        assert_eq!(written, b"png-bytes");
        tokio::fs::remove_file(&upload.path).await.unwrap();

        let jpeg = spool(b"jpeg-bytes", "image/jpeg", &dir).await.unwrap();
        assert!(jpeg.path.ends_with(".jpg"));
        tokio::fs::remove_file(&jpeg.path).await.unwrap();
    }
}
