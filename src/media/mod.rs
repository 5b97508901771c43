//! External media storage.
//!
//! Handlers never talk to a backend directly: they go through [`MediaClient`],
//! which bounds every call with a timeout and maps failures onto
//! [`AppError::Storage`].

mod local;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{AppError, AppResult};

pub use self::local::LocalMediaStore;

pub const POST_FOLDER: &str = "posts";
pub const PROFILE_FOLDER: &str = "profile";

/// A file received in a multipart form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub bytes: Bytes,
    pub content_type: String,
}

impl Upload {
    pub fn new(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }

    /// Only non-empty images up to `max_bytes` are accepted.
    pub fn validate_image(&self, max_bytes: usize) -> AppResult<()> {
        if !self.content_type.starts_with("image/") {
            return Err(AppError::BadRequest("Only image uploads are allowed".into()));
        }
        if self.bytes.is_empty() {
            return Err(AppError::BadRequest("Uploaded file is empty".into()));
        }
        if self.bytes.len() > max_bytes {
            return Err(AppError::BadRequest(format!(
                "File size exceeds the limit of {} MB",
                max_bytes / (1024 * 1024)
            )));
        }
        Ok(())
    }
}

/// Where a stored object lives: a public URL plus the id used to destroy it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMedia {
    pub url: String,
    pub public_id: String,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, folder: &str, upload: &Upload) -> anyhow::Result<StoredMedia>;
    async fn destroy(&self, public_id: &str) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct MediaClient {
    store: Arc<dyn MediaStore>,
    timeout: Duration,
}

impl MediaClient {
    pub fn new(store: Arc<dyn MediaStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn upload(&self, folder: &str, upload: &Upload) -> AppResult<StoredMedia> {
        match tokio::time::timeout(self.timeout, self.store.upload(folder, upload)).await {
            Ok(Ok(stored)) => {
                tracing::debug!(public_id = %stored.public_id, "media uploaded");
                Ok(stored)
            }
            Ok(Err(e)) => Err(AppError::Storage(format!("upload failed: {e:#}"))),
            Err(_) => Err(AppError::Storage(format!(
                "upload timed out after {:?}",
                self.timeout
            ))),
        }
    }

    pub async fn destroy(&self, public_id: &str) -> AppResult<()> {
        match tokio::time::timeout(self.timeout, self.store.destroy(public_id)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(AppError::Storage(format!(
                "destroy of {public_id} failed: {e:#}"
            ))),
            Err(_) => Err(AppError::Storage(format!(
                "destroy of {public_id} timed out after {:?}",
                self.timeout
            ))),
        }
    }

    /// Best-effort cleanup once the database no longer references the object.
    pub async fn destroy_logged(&self, public_id: &str) {
        if let Err(e) = self.destroy(public_id).await {
            tracing::warn!("Orphaned media object left behind: {}", e);
        }
    }
}
