use std::future::Future;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};

use crate::api::{AppState, DispositionQuery};
use crate::cache::FileCache;
use crate::error::{PreviewError, Result};
use crate::img::{Format, ImgError};
use crate::preview::image::create_image_preview;
use crate::preview::{cache_key, PreviewSize};
use crate::serve::{content_disposition, serve_bytes, serve_file};
use crate::workspace::{FileDescriptor, MediaType};

pub async fn preview(
    State(state): State<Arc<AppState>>,
    Path((size, path)): Path<(String, String)>,
    Query(query): Query<DispositionQuery>,
    headers: HeaderMap,
) -> Response {
    match handle(&state, &size, &path, &query, &headers).await {
        Ok(r) => r,
        Err(r) => r,
    }
}

async fn handle(
    state: &AppState,
    size: &str,
    path: &str,
    query: &DispositionQuery,
    headers: &HeaderMap,
) -> std::result::Result<Response, Response> {
    if !state.permissions.download {
        return Err(PreviewError::Forbidden.into_response());
    }
    let size: PreviewSize = size.parse().map_err(PreviewError::into_response)?;
    let file = state
        .workspace
        .describe(&format!("/{path}"))
        .await
        .map_err(|e| PreviewError::from(e).into_response())?;

    // Applies to whatever comes back, success or not.
    let disposition = content_disposition(&file.name, query.inline());

    let mut response = match dispatch(state, &file, size, headers).await {
        Ok(r) => r,
        Err(e) => e.into_response(),
    };
    response
        .headers_mut()
        .insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}

async fn dispatch(
    state: &AppState,
    file: &FileDescriptor,
    size: PreviewSize,
    headers: &HeaderMap,
) -> Result<Response> {
    match &file.media_type {
        MediaType::Image => image_preview(state, file, size, headers).await,
        MediaType::Video => video_preview(state, file, size, headers).await,
        other => Err(PreviewError::UnsupportedType(other.as_str().to_string())),
    }
}

async fn image_preview(
    state: &AppState,
    file: &FileDescriptor,
    size: PreviewSize,
    headers: &HeaderMap,
) -> Result<Response> {
    let enabled = match size {
        PreviewSize::Big => state.resize_preview,
        PreviewSize::Thumb => state.enable_thumbnails,
    };
    if !enabled {
        tracing::debug!("{size} previews disabled, serving {} as is", file.path);
        return serve_file(file, headers).await.map(private);
    }

    // Unknown formats are never force-decoded and animations are never flattened.
    match state.img.format_from_extension(&file.extension) {
        Err(ImgError::UnsupportedFormat) | Ok(Format::Gif) => {
            return serve_file(file, headers).await.map(private)
        }
        Err(e) => return Err(e.into()),
        Ok(_) => {}
    }

    let key = cache_key(file, size);
    let bytes = load_or_generate(state.cache.as_ref(), &key, || {
        create_image_preview(state.img.as_ref(), state.cache.clone(), file, size)
    })
    .await?;

    Ok(private(serve_bytes(&file.name, file.modified, bytes, headers)))
}

async fn video_preview(
    state: &AppState,
    file: &FileDescriptor,
    size: PreviewSize,
    headers: &HeaderMap,
) -> Result<Response> {
    let key = cache_key(file, size);
    let bytes = load_or_generate(state.cache.as_ref(), &key, || {
        state.video.generate(file, size, state.cache.as_ref())
    })
    .await
    .inspect_err(|e| tracing::error!("video {size} preview for {} failed: {e}", file.path))?;

    Ok(private(serve_bytes(&file.name, file.modified, bytes, headers)))
}

/// Cache-aside read. A failed load is an error, not a miss.
async fn load_or_generate<F, Fut>(cache: &dyn FileCache, key: &str, generate: F) -> Result<Vec<u8>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<u8>>>,
{
    if let Some(bytes) = cache.load(key).await? {
        tracing::debug!("preview cache hit for {key}");
        return Ok(bytes);
    }
    tracing::debug!("preview cache miss for {key}");
    generate().await
}

/// Everything this route returns is for a permission-checked caller and must not land in shared caches.
fn private(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("private"));
    response
}
