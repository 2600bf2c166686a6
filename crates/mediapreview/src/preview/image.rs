use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::cache::FileCache;
use crate::error::Result;
use crate::img::ImgService;
use crate::preview::{cache_key, PreviewSize, TransformOptions};
use crate::workspace::FileDescriptor;

/// Resize an image for `size` and hand the result to the cache in the background.
///
/// The returned bytes do not wait on the cache write.
pub async fn create_image_preview(
    img: &dyn ImgService,
    cache: Arc<dyn FileCache>,
    file: &FileDescriptor,
    size: PreviewSize,
) -> Result<Vec<u8>> {
    let opts = TransformOptions::for_image(size);

    let mut source = tokio::fs::File::open(&file.real_path).await?;
    let mut resized = Vec::new();
    img.resize(&mut source, opts.width, opts.height, &mut resized, opts.resize)
        .await?;
    drop(source);

    spawn_store(cache, cache_key(file, size), resized.clone());
    Ok(resized)
}

/// Fire-and-forget cache write. Failures only reach the log.
pub fn spawn_store(cache: Arc<dyn FileCache>, key: String, bytes: Vec<u8>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = cache.store(&key, &bytes).await {
            tracing::warn!("failed to cache resized image: {e}");
        }
    })
}
