use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use mediapreview::api::{self, AppState};
use mediapreview::cache::{DiskCache, FileCache, MemoryCache, NoopCache};
use mediapreview::config::{CacheBackend, ServerConfig};
use mediapreview::img::ImageResizer;
use mediapreview::preview::video::{FfmpegExtractor, VideoThumbnailer};
use mediapreview::workspace::Workspace;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut config = ServerConfig::load()?;
    if let Some(root) = std::env::args().nth(1) {
        config.root = root.into();
    }

    let workspace = Workspace::new(&config.root)?;
    tracing::info!("serving workspace: {}", workspace.root().display());

    let cache: Arc<dyn FileCache> = match config.cache.backend {
        CacheBackend::Memory => Arc::new(MemoryCache::new()),
        CacheBackend::Disk => {
            let dir = config
                .cache
                .dir
                .clone()
                .ok_or_else(|| anyhow::anyhow!("cache backend \"disk\" needs cache.dir"))?;
            let disk = DiskCache::new(dir)?;
            tracing::info!("caching previews in {}", disk.dir().display());
            Arc::new(disk)
        }
        CacheBackend::None => {
            tracing::warn!("preview cache disabled");
            Arc::new(NoopCache)
        }
    };

    let media_root = match config.video.media_root.clone() {
        Some(dir) => dir,
        None => workspace.root().to_path_buf(),
    };
    tracing::info!("video media root: {}", media_root.display());

    let extractor = FfmpegExtractor::new(&config.video.ffmpeg_path, config.video.timeout());
    let mut video = VideoThumbnailer::new(Arc::new(extractor), media_root)
        .with_seek_offset(config.video.seek_offset.clone())
        .with_cleanup(config.video.cleanup());
    if let Some(dir) = &config.video.temp_dir {
        video = video.with_temp_dir(dir);
    }

    let state = Arc::new(AppState {
        workspace,
        permissions: config.permissions,
        enable_thumbnails: config.preview.enable_thumbnails,
        resize_preview: config.preview.resize_preview,
        img: Arc::new(ImageResizer::new(config.preview.image_processors)),
        cache,
        video,
    });

    let app = api::router(state);

    let addr = config.bind_addr;
    tracing::info!("listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
