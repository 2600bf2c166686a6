//! Key/value storage for generated previews.

mod disk;
mod memory;

use async_trait::async_trait;

pub use disk::DiskCache;
pub use memory::{MemoryCache, NoopCache};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Preview byte store shared by every request.
///
/// Implementations must be safe to call concurrently; two writers racing on
/// the same key may leave either value in place.
#[async_trait]
pub trait FileCache: Send + Sync {
    async fn store(&self, key: &str, value: &[u8]) -> Result<()>;

    /// `Ok(None)` is a miss. Errors are reserved for a cache that could not be read.
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn delete(&self, key: &str) -> Result<()>;
}
