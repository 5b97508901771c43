use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{MediaStore, StoredMedia, Upload};

/// Stores uploads on local disk; files are served back under `public_url`.
pub struct LocalMediaStore {
    dir: PathBuf,
    public_url: String,
}

impl LocalMediaStore {
    pub fn new(dir: PathBuf, public_url: &str) -> Self {
        Self {
            dir,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    /// Rejects ids that would escape the storage directory.
    fn path_for(&self, public_id: &str) -> Result<PathBuf> {
        let relative = Path::new(public_id);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || public_id.is_empty() {
            anyhow::bail!("invalid media id {public_id:?}");
        }
        Ok(self.dir.join(relative))
    }
}

fn extension_for(content_type: &str) -> &'static str {
    mime_guess::get_mime_extensions_str(content_type)
        .and_then(|exts| exts.first().copied())
        .unwrap_or("bin")
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn upload(&self, folder: &str, upload: &Upload) -> Result<StoredMedia> {
        let public_id = format!(
            "{}/{}.{}",
            folder,
            uuid::Uuid::now_v7(),
            extension_for(&upload.content_type)
        );
        let path = self.path_for(&public_id)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("create media dir")?;
        }
        tokio::fs::write(&path, &upload.bytes)
            .await
            .with_context(|| format!("write media {path:?}"))?;

        Ok(StoredMedia {
            url: format!("{}/{}", self.public_url, public_id),
            public_id,
        })
    }

    async fn destroy(&self, public_id: &str) -> Result<()> {
        let path = self.path_for(public_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // Already gone counts as destroyed.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("delete media {path:?}")),
        }
    }
}
