use std::collections::HashMap;

use axum::extract::{FromRequest, Multipart, Request};

use crate::error::{AppError, AppResult};
use crate::media::Upload;

/// A multipart form read fully into memory: text fields and file parts.
#[derive(Debug, Default)]
pub struct FormData {
    texts: HashMap<String, String>,
    files: HashMap<String, Upload>,
}

/// A body that is not multipart is answered with a JSON 400.
impl<S> FromRequest<S> for FormData
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let multipart = Multipart::from_request(req, state).await?;
        FormData::read(multipart).await
    }
}

impl FormData {
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = FormData::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("Invalid form data: {e}")))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if field.file_name().is_some() {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Invalid file upload: {e}")))?;
                // Browsers send an empty part when no file was picked.
                if !bytes.is_empty() {
                    form.files.insert(name, Upload::new(bytes, content_type));
                }
            } else {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Invalid form field: {e}")))?;
                form.texts.insert(name, text);
            }
        }
        Ok(form)
    }

    /// Raw text value, untrimmed.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.texts.get(name).map(String::as_str)
    }

    /// Trimmed text value, `None` when missing or blank.
    pub fn non_blank(&self, name: &str) -> Option<&str> {
        self.text(name).map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn take_file(&mut self, name: &str) -> Option<Upload> {
        self.files.remove(name)
    }
}
