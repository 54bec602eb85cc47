//! Request body extraction for `/compile` and `/api/upload`

use axum::{
    async_trait,
    extract::{multipart::Field, FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    Form,
};
use serde::Deserialize;

use crate::error::ApiError;
use crate::uploads::UploadedFile;

/// A compile request: the editor text and an optional image
#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub content: String,
    pub image: Option<UploadedFile>,
}

#[derive(Deserialize)]
struct ContentForm {
    content: Option<String>,
}

fn is_multipart(req: &Request) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("multipart/form-data"))
        .unwrap_or(false)
}

/// Read a file part. Parts without a filename are what browsers send for an
/// empty file input, and count as no file.
pub async fn read_file_field(field: Field<'_>) -> Result<Option<UploadedFile>, ApiError> {
    let file_name = match field.file_name() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return Ok(None),
    };
    let content_type = field.content_type().map(str::to_string);
    let data = field
        .bytes()
        .await
        .map_err(|e| ApiError::InvalidRequest(e.body_text()))?;

    Ok(Some(UploadedFile {
        file_name,
        content_type,
        data: data.to_vec(),
    }))
}

#[async_trait]
impl<S> FromRequest<S> for CompileRequest
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !is_multipart(&req) {
            let Form(form) = Form::<ContentForm>::from_request(req, state)
                .await
                .map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
            let content = form.content.ok_or(ApiError::MissingField("content"))?;
            return Ok(Self {
                content,
                image: None,
            });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| ApiError::InvalidRequest(e.body_text()))?;

        let mut content = None;
        let mut image = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::InvalidRequest(e.body_text()))?
        {
            match field.name() {
                Some("content") if content.is_none() => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
                    content = Some(text);
                }
                Some("image") if image.is_none() => {
                    image = read_file_field(field).await?;
                }
                _ => {}
            }
        }

        Ok(Self {
            content: content.ok_or(ApiError::MissingField("content"))?,
            image,
        })
    }
}
