pub mod files;
pub mod preview;

use std::sync::Arc;

use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::cache::FileCache;
use crate::config::Permissions;
use crate::img::ImgService;
use crate::preview::video::VideoThumbnailer;
use crate::workspace::Workspace;

pub struct AppState {
    pub workspace: Workspace,
    pub permissions: Permissions,
    /// Serve raw files instead of generating `thumb` previews when false.
    pub enable_thumbnails: bool,
    /// Serve raw files instead of generating `big` previews when false.
    pub resize_preview: bool,
    pub img: Arc<dyn ImgService>,
    pub cache: Arc<dyn FileCache>,
    pub video: VideoThumbnailer,
}

#[derive(Debug, Default, Deserialize)]
pub struct DispositionQuery {
    pub inline: Option<String>,
}

impl DispositionQuery {
    pub fn inline(&self) -> bool {
        self.inline.as_deref() == Some("true")
    }
}

pub fn router(state: Arc<AppState>) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/api/preview/{size}/{*path}", get(preview::preview))
        .route("/api/raw/{*path}", get(files::raw_file))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_state {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio::io::{AsyncRead, AsyncWrite};

    use super::AppState;
    use crate::cache::{CacheError, FileCache, MemoryCache};
    use crate::config::Permissions;
    use crate::error::Result;
    use crate::img::{Format, ImageResizer, ImgService, ResizeOptions};
    use crate::preview::video::{CleanupPolicy, ExtractOutput, FrameExtractor, VideoThumbnailer};
    use crate::workspace::Workspace;

    /// Real resizer that counts how often it is asked to resize.
    pub struct CountingImg {
        inner: ImageResizer,
        pub resizes: AtomicUsize,
    }

    #[async_trait]
    impl ImgService for CountingImg {
        fn format_from_extension(&self, ext: &str) -> crate::img::Result<Format> {
            self.inner.format_from_extension(ext)
        }

        async fn resize(
            &self,
            input: &mut (dyn AsyncRead + Unpin + Send),
            width: u32,
            height: u32,
            output: &mut (dyn AsyncWrite + Unpin + Send),
            options: ResizeOptions,
        ) -> crate::img::Result<()> {
            self.resizes.fetch_add(1, Ordering::SeqCst);
            self.inner.resize(input, width, height, output, options).await
        }
    }

    #[derive(Default)]
    pub struct FakeFfmpeg {
        pub offsets: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FrameExtractor for FakeFfmpeg {
        async fn extract(&self, _input: &Path, offset: &str, output: &Path) -> Result<ExtractOutput> {
            self.offsets.lock().unwrap().push(offset.to_string());
            tokio::fs::write(output, crate::preview::tests_support::png_bytes(64, 36)).await?;
            Ok(ExtractOutput::default())
        }
    }

    /// Cache whose reads always fail.
    pub struct BrokenCache;

    #[async_trait]
    impl FileCache for BrokenCache {
        async fn store(&self, _key: &str, _value: &[u8]) -> crate::cache::Result<()> {
            Ok(())
        }
        async fn load(&self, _key: &str) -> crate::cache::Result<Option<Vec<u8>>> {
            Err(CacheError::Task("cache offline".into()))
        }
        async fn delete(&self, _key: &str) -> crate::cache::Result<()> {
            Ok(())
        }
    }

    pub struct Harness {
        pub dir: tempfile::TempDir,
        pub img: Arc<CountingImg>,
        pub cache: Arc<MemoryCache>,
        pub ffmpeg: Arc<FakeFfmpeg>,
    }

    impl Harness {
        pub fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                img: Arc::new(CountingImg {
                    inner: ImageResizer::new(2),
                    resizes: AtomicUsize::new(0),
                }),
                cache: Arc::new(MemoryCache::new()),
                ffmpeg: Arc::new(FakeFfmpeg::default()),
            }
        }

        pub fn write(&self, name: &str, contents: &[u8]) {
            std::fs::write(self.dir.path().join(name), contents).unwrap();
        }

        pub fn resizes(&self) -> usize {
            self.img.resizes.load(Ordering::SeqCst)
        }

        pub fn state(&self) -> AppState {
            let workspace = Workspace::new(self.dir.path()).unwrap();
            let video = VideoThumbnailer::new(self.ffmpeg.clone(), workspace.root())
                .with_cleanup(CleanupPolicy {
                    attempts: 3,
                    backoff: std::time::Duration::ZERO,
                });
            AppState {
                workspace,
                permissions: Permissions { download: true },
                enable_thumbnails: true,
                resize_preview: true,
                img: self.img.clone(),
                cache: self.cache.clone(),
                video,
            }
        }
    }
}
