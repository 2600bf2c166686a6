//! Video thumbnails via an external frame extractor (ffmpeg by default).

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::cache::FileCache;
use crate::error::{PreviewError, Result};
use crate::preview::{cache_key, PreviewSize};
use crate::workspace::FileDescriptor;

/// Output of a successful extraction, kept for the log.
#[derive(Debug, Default)]
pub struct ExtractOutput {
    pub combined: String,
}

/// Pulls a single decoded frame out of a media file.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    async fn extract(&self, input: &Path, offset: &str, output: &Path) -> Result<ExtractOutput>;
}

pub struct FfmpegExtractor {
    program: PathBuf,
    timeout: Duration,
}

impl FfmpegExtractor {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl FrameExtractor for FfmpegExtractor {
    async fn extract(&self, input: &Path, offset: &str, output: &Path) -> Result<ExtractOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-ss", offset, "-vframes", "1"])
            .arg(output)
            .kill_on_drop(true);

        let out = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| {
                PreviewError::Extraction(format!("failed to run {}: {e}", self.program.display()))
            })?,
            Err(_) => return Err(PreviewError::ExtractionTimeout(self.timeout)),
        };

        let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&out.stderr));

        if !out.status.success() {
            tracing::error!("ffmpeg exited with {}, output: {combined}", out.status);
            return Err(PreviewError::Extraction(format!(
                "{} exited with {}",
                self.program.display(),
                out.status
            )));
        }
        Ok(ExtractOutput { combined })
    }
}

/// How hard to try clearing a stale file from the temporary output path.
#[derive(Debug, Clone, Copy)]
pub struct CleanupPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cleanup {
    Absent,
    Removed,
    /// Still there after every attempt.
    Stuck,
}

/// Remove whatever occupies `path`, retrying up to the policy bound. Never fails.
pub async fn clear_stale_output(path: &Path, policy: CleanupPolicy) -> Cleanup {
    clear_with(path, policy, |p| tokio::fs::remove_file(p.to_path_buf())).await
}

async fn clear_with<F, Fut>(path: &Path, policy: CleanupPolicy, mut remove: F) -> Cleanup
where
    F: FnMut(&Path) -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    for attempt in 1..=policy.attempts {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return if attempt == 1 {
                Cleanup::Absent
            } else {
                Cleanup::Removed
            };
        }
        match remove(path).await {
            Ok(()) => return Cleanup::Removed,
            Err(e) => {
                tracing::warn!(
                    "error deleting existing temporary file (attempt {attempt}/{}): {e}",
                    policy.attempts
                );
                tokio::time::sleep(policy.backoff).await;
            }
        }
    }
    Cleanup::Stuck
}

pub struct VideoThumbnailer {
    extractor: Arc<dyn FrameExtractor>,
    media_root: PathBuf,
    temp_dir: Option<PathBuf>,
    seek_offset: String,
    cleanup: CleanupPolicy,
}

impl VideoThumbnailer {
    /// `media_root` is where the extractor finds files on disk; request paths are joined onto it.
    pub fn new(extractor: Arc<dyn FrameExtractor>, media_root: impl Into<PathBuf>) -> Self {
        Self {
            extractor,
            media_root: media_root.into(),
            temp_dir: None,
            seek_offset: "00:00:01.000".to_string(),
            cleanup: CleanupPolicy::default(),
        }
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn with_seek_offset(mut self, offset: impl Into<String>) -> Self {
        self.seek_offset = offset.into();
        self
    }

    pub fn with_cleanup(mut self, cleanup: CleanupPolicy) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn absolute_path(&self, file: &FileDescriptor) -> PathBuf {
        self.media_root.join(file.path.trim_start_matches('/'))
    }

    /// Extract a frame, cache it, and return it. The cache write finishes before
    /// this returns; a failed write is logged and the frame is still returned.
    pub async fn generate(
        &self,
        file: &FileDescriptor,
        size: PreviewSize,
        cache: &dyn FileCache,
    ) -> Result<Vec<u8>> {
        let source = tokio::fs::File::open(&file.real_path).await.map_err(|e| {
            tracing::error!("error opening file {}: {e}", file.path);
            PreviewError::from(e)
        })?;

        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("video-thumbnail-").suffix(".jpg");
            b
        };
        let tmp = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| {
            tracing::error!("error creating temporary file: {e}");
            PreviewError::Io(e)
        })?
        .into_temp_path();

        tracing::info!("creating thumbnail for file: {}", file.path);
        let thumbnail = self.extract_into(file, &tmp).await?;
        drop(source);

        if let Err(e) = cache.store(&cache_key(file, size), &thumbnail).await {
            tracing::warn!("error storing thumbnail in cache: {e}");
        }

        Ok(thumbnail)
    }

    /// Run the extractor for `file` with `out` as the frame destination and read the frame back.
    async fn extract_into(&self, file: &FileDescriptor, out: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(file);
        tracing::debug!("file path: {}, absolute path: {}", file.path, abs_path.display());

        if !tokio::fs::try_exists(&abs_path).await.unwrap_or(false) {
            tracing::error!("file does not exist: {}", abs_path.display());
            return Err(PreviewError::SourceMissing(abs_path));
        }

        if clear_stale_output(out, self.cleanup).await == Cleanup::Stuck {
            tracing::warn!("stale temporary file {} could not be removed", out.display());
        }

        let output = self
            .extractor
            .extract(&abs_path, &self.seek_offset, out)
            .await?;
        tracing::debug!("ffmpeg output: {}", output.combined);

        tokio::fs::read(out).await.map_err(|e| {
            tracing::error!("error reading temporary file: {e}");
            PreviewError::Io(e)
        })
    }
}
