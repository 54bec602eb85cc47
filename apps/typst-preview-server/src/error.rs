//! Error types for the preview server
//!
//! Every error renders as a `text/plain` body starting with `Error: `, which
//! is what the editor front end displays when a compile does not produce a PDF.

use std::process::ExitStatus;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("missing form field `{0}`")]
    MissingField(&'static str),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("command `{command}` returned non-zero exit status {}{}", exit_code(.status), stderr_suffix(.stderr))]
    CompileFailed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The compiler ran past its deadline. Reported as 504: the request
    /// arrived in time, the upstream compiler did not finish.
    #[error("compiler timeout after {0}ms")]
    Timeout(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_code(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => code.to_string(),
        None => "(terminated by signal)".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n{}", trimmed)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingField(_)
            | ApiError::InvalidRequest(_)
            | ApiError::CompileFailed { .. }
            | ApiError::Spawn { .. } => StatusCode::BAD_REQUEST,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Internal error: {}", self);
        }

        (status, format!("Error: {}", self)).into_response()
    }
}
