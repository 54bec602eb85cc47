//! API handlers for the preview server
//!
//! - `POST /compile` turns editor content (plus an optional image) into a PDF
//! - `POST /api/upload` stages an image and reports its metadata
//! - `GET /health` reports liveness

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::compiler::OUTPUT_FILE;
use crate::error::ApiError;
use crate::form::{read_file_field, CompileRequest};
use crate::state::AppState;
use crate::uploads::stage_image;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "typst-preview-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Handler: POST /compile
pub async fn handle_compile(
    State(state): State<Arc<AppState>>,
    req: CompileRequest,
) -> Result<Response, ApiError> {
    info!(
        "Compile request: {} bytes of source, image={:?}",
        req.content.len(),
        req.image.as_ref().map(|i| i.file_name.as_str())
    );

    let staged = match &req.image {
        Some(image) => stage_image(&state.upload_dir, image).await?,
        None => None,
    };

    let pdf = state.compiler.compile(&req.content, staged.as_ref()).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", OUTPUT_FILE),
            ),
        ],
        pdf,
    )
        .into_response())
}

/// Upload response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: String,
    pub name: String,
    pub size: usize,
    #[serde(rename = "type")]
    pub content_type: String,
    /// Whether the file passed the allow-list and was written to disk
    pub staged: bool,
}

/// Handler: POST /api/upload
pub async fn handle_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Response {
    let file = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => {
                match read_file_field(field).await {
                    Ok(file) => break file,
                    Err(e) => return upload_error(StatusCode::BAD_REQUEST, &e.to_string()),
                }
            }
            Ok(Some(_)) => continue,
            Ok(None) => break None,
            Err(e) => return upload_error(StatusCode::BAD_REQUEST, &e.body_text()),
        }
    };

    let Some(file) = file else {
        return upload_error(StatusCode::BAD_REQUEST, "No file uploaded");
    };

    let staged = match stage_image(&state.upload_dir, &file).await {
        Ok(staged) => staged.is_some(),
        Err(e) => {
            warn!("Error handling file upload: {}", e);
            return upload_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to upload file");
        }
    };

    let response = UploadResponse {
        id: Uuid::new_v4().to_string(),
        size: file.data.len(),
        content_type: file.content_type.unwrap_or_default(),
        name: file.file_name,
        staged,
    };

    info!(
        "Upload {}: {} ({} bytes, staged={})",
        response.id, response.name, response.size, response.staged
    );

    Json(response).into_response()
}

fn upload_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
