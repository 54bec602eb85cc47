//! Image staging for uploaded files
//!
//! Uploaded images are written to the upload directory under a sanitized
//! filename so the compiled document can reference them by a local file URL.
//! Files are never removed by the server.

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use tracing::{debug, info};

use crate::error::ApiError;

/// Image extensions accepted for staging (compared case-insensitively)
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp"];

lazy_static! {
    static ref UNSAFE_FILENAME_CHARS: Regex = Regex::new(r"[^A-Za-z0-9_.-]").unwrap();
}

/// A file received in a multipart body
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// An image written to the upload directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedImage {
    pub path: PathBuf,
    pub url: String,
}

/// True if the filename has an extension in [`ALLOWED_EXTENSIONS`].
///
/// Only the text after the last `.` counts, so `archive.png.exe` is rejected
/// and a bare `png` (no dot) is rejected.
pub fn allowed_file(file_name: &str) -> bool {
    match file_name.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// Reduce a client-supplied filename to a single safe path component.
///
/// The name is NFKD-normalized and what is left outside ASCII is dropped, so
/// accented letters keep their base letter. Path separators become word breaks,
/// words are joined with `_`, anything outside `[A-Za-z0-9_.-]` is removed and
/// leading/trailing `.`/`_` are stripped. The result may be empty.
pub fn secure_filename(file_name: &str) -> String {
    let ascii: String = file_name
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(&joined, "");

    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Write an uploaded image into `upload_dir` if it passes the allow-list.
///
/// Returns `Ok(None)` when the image is skipped: a disallowed extension or a
/// name that sanitizes to nothing. Skips are not errors.
pub async fn stage_image(
    upload_dir: &Path,
    file: &UploadedFile,
) -> Result<Option<StagedImage>, ApiError> {
    if !allowed_file(&file.file_name) {
        debug!("Skipping upload with disallowed extension: {:?}", file.file_name);
        return Ok(None);
    }

    let name = secure_filename(&file.file_name);
    if name.is_empty() {
        debug!("Skipping upload with unusable filename: {:?}", file.file_name);
        return Ok(None);
    }

    let path = upload_dir.join(&name);
    tokio::fs::write(&path, &file.data).await?;

    let absolute = tokio::fs::canonicalize(&path).await?;
    let url = format!("file://{}", absolute.display());

    info!("Staged image {} ({} bytes)", path.display(), file.data.len());

    Ok(Some(StagedImage { path, url }))
}
