use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};

use crate::api::{AppState, DispositionQuery};
use crate::error::PreviewError;
use crate::serve::{content_disposition, serve_file};

/// Download a file as stored, with the same permission gate as previews.
pub async fn raw_file(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Query(query): Query<DispositionQuery>,
    headers: HeaderMap,
) -> Response {
    if !state.permissions.download {
        return PreviewError::Forbidden.into_response();
    }

    let file = match state.workspace.describe(&format!("/{path}")).await {
        Ok(f) => f,
        Err(e) => return PreviewError::from(e).into_response(),
    };
    if file.media_type.as_str() == "directory" {
        return PreviewError::InvalidPath(format!("{} is a directory", file.path)).into_response();
    }

    let disposition = content_disposition(&file.name, query.inline());
    let mut response = match serve_file(&file, &headers).await {
        Ok(r) => r,
        Err(e) => e.into_response(),
    };
    response
        .headers_mut()
        .insert(header::CONTENT_DISPOSITION, disposition);
    response
}
