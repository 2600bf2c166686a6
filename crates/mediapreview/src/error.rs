use std::path::PathBuf;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use crate::cache::CacheError;
use crate::img::ImgError;
use crate::workspace::WorkspaceError;

/// Every way a preview or raw request can fail.
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("forbidden")]
    Forbidden,
    #[error("invalid preview size: {0}")]
    InvalidSize(String),
    #[error("not found")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("can't create preview for {0} type")]
    UnsupportedType(String),
    #[error("unsupported image format")]
    UnsupportedFormat,
    #[error("image processing failed: {0}")]
    Image(String),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("file does not exist: {}", .0.display())]
    SourceMissing(PathBuf),
    #[error("frame extraction failed: {0}")]
    Extraction(String),
    #[error("frame extraction timed out after {0:?}")]
    ExtractionTimeout(Duration),
    #[error("io error: {0}")]
    Io(std::io::Error),
}

pub type Result<T> = std::result::Result<T, PreviewError>;

impl PreviewError {
    pub fn status(&self) -> StatusCode {
        match self {
            PreviewError::Forbidden | PreviewError::PermissionDenied => StatusCode::FORBIDDEN,
            PreviewError::InvalidSize(_) | PreviewError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            PreviewError::NotFound => StatusCode::NOT_FOUND,
            PreviewError::UnsupportedType(_) => StatusCode::NOT_IMPLEMENTED,
            PreviewError::UnsupportedFormat
            | PreviewError::Image(_)
            | PreviewError::Cache(_)
            | PreviewError::SourceMissing(_)
            | PreviewError::Extraction(_)
            | PreviewError::ExtractionTimeout(_)
            | PreviewError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for PreviewError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => PreviewError::NotFound,
            std::io::ErrorKind::PermissionDenied => PreviewError::PermissionDenied,
            _ => PreviewError::Io(e),
        }
    }
}

impl From<WorkspaceError> for PreviewError {
    fn from(e: WorkspaceError) -> Self {
        match e {
            WorkspaceError::PathTraversal(path) => PreviewError::InvalidPath(path),
            WorkspaceError::Io(e) => e.into(),
        }
    }
}

impl From<ImgError> for PreviewError {
    fn from(e: ImgError) -> Self {
        match e {
            ImgError::UnsupportedFormat => PreviewError::UnsupportedFormat,
            other => PreviewError::Image(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for PreviewError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            // Detail stays in the server log.
            tracing::error!("preview failed: {self}");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
