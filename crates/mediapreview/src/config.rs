use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::preview::video::CleanupPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Capabilities of the caller. Only `download` gates previews.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Permissions {
    #[serde(default = "default_true")]
    pub download: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "default_true")]
    pub enable_thumbnails: bool,
    #[serde(default = "default_true")]
    pub resize_preview: bool,
    #[serde(default = "default_image_processors")]
    pub image_processors: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    /// Where the extractor finds files on disk. Defaults to the served root.
    #[serde(default)]
    pub media_root: Option<PathBuf>,
    #[serde(default = "default_seek_offset")]
    pub seek_offset: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_cleanup_attempts")]
    pub cleanup_attempts: u32,
    #[serde(default = "default_cleanup_backoff_ms")]
    pub cleanup_backoff_ms: u64,
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Disk,
    None,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_image_processors() -> usize {
    4
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_seek_offset() -> String {
    "00:00:01.000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_cleanup_attempts() -> u32 {
    3
}

fn default_cleanup_backoff_ms() -> u64 {
    100
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for Permissions {
    fn default() -> Self {
        Self { download: true }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            enable_thumbnails: true,
            resize_preview: true,
            image_processors: default_image_processors(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            media_root: None,
            seek_offset: default_seek_offset(),
            timeout_secs: default_timeout_secs(),
            cleanup_attempts: default_cleanup_attempts(),
            cleanup_backoff_ms: default_cleanup_backoff_ms(),
            temp_dir: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            root: default_root(),
            permissions: Permissions::default(),
            preview: PreviewConfig::default(),
            video: VideoConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl VideoConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cleanup(&self) -> CleanupPolicy {
        CleanupPolicy {
            attempts: self.cleanup_attempts,
            backoff: Duration::from_millis(self.cleanup_backoff_ms),
        }
    }
}

impl ServerConfig {
    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let config: ServerConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read `MEDIAPREVIEW_CONFIG` if set, then apply environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var("MEDIAPREVIEW_CONFIG") {
            Ok(path) => {
                let contents = std::fs::read_to_string(&path)?;
                ServerConfig::from_toml(&contents)?
            }
            Err(_) => ServerConfig::default(),
        };

        if let Ok(root) = std::env::var("MEDIAPREVIEW_ROOT") {
            config.root = PathBuf::from(root);
        }
        if let Ok(addr) = std::env::var("MEDIAPREVIEW_BIND_ADDR") {
            config.bind_addr = addr.parse()?;
        }
        if let Ok(media_root) = std::env::var("MEDIAPREVIEW_MEDIA_ROOT") {
            config.video.media_root = Some(PathBuf::from(media_root));
        }
        if let Ok(ffmpeg) = std::env::var("MEDIAPREVIEW_FFMPEG") {
            config.video.ffmpeg_path = PathBuf::from(ffmpeg);
        }
        if let Ok(dir) = std::env::var("MEDIAPREVIEW_CACHE_DIR") {
            config.cache.backend = CacheBackend::Disk;
            config.cache.dir = Some(PathBuf::from(dir));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cache.backend == CacheBackend::Disk && self.cache.dir.is_none() {
            anyhow::bail!("cache backend \"disk\" needs cache.dir");
        }
        if self.video.cleanup_attempts == 0 {
            anyhow::bail!("video.cleanup_attempts must be at least 1");
        }
        if self.video.timeout_secs == 0 {
            anyhow::bail!("video.timeout_secs must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config.bind_addr, default_bind_addr());
        assert!(config.permissions.download);
        assert!(config.preview.enable_thumbnails);
        assert!(config.preview.resize_preview);
        assert_eq!(config.video.seek_offset, "00:00:01.000");
        assert_eq!(config.video.cleanup().attempts, 3);
        assert_eq!(config.video.cleanup().backoff, Duration::from_millis(100));
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.video.media_root, None);
    }

    #[test]
    fn sections_override_defaults() {
        let config = ServerConfig::from_toml(
            r#"
            root = "/data"

            [permissions]
            download = false

            [preview]
            enable_thumbnails = false

            [video]
            media_root = "/srv"
            timeout_secs = 5

            [cache]
            backend = "disk"
            dir = "/var/cache/previews"
            "#,
        )
        .unwrap();
        assert!(!config.permissions.download);
        assert!(!config.preview.enable_thumbnails);
        assert!(config.preview.resize_preview);
        assert_eq!(config.video.media_root, Some(PathBuf::from("/srv")));
        assert_eq!(config.root, PathBuf::from("/data"));
        assert_eq!(config.video.timeout(), Duration::from_secs(5));
        assert_eq!(config.cache.backend, CacheBackend::Disk);
    }

    #[test]
    fn disk_cache_requires_dir() {
        let err = ServerConfig::from_toml("[cache]\nbackend = \"disk\"\n").unwrap_err();
        assert!(err.to_string().contains("cache.dir"));
    }

    #[test]
    fn zero_cleanup_attempts_rejected() {
        assert!(ServerConfig::from_toml("[video]\ncleanup_attempts = 0\n").is_err());
    }
}
