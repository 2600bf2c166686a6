use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{CacheError, FileCache, Result};

/// One file per key under `dir/<2 hex>/<64 hex>`.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        let name: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        self.dir.join(&name[..2]).join(name)
    }
}

#[async_trait]
impl FileCache for DiskCache {
    async fn store(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.entry_path(key);
        let value = value.to_vec();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let shard = path
                .parent()
                .ok_or_else(|| CacheError::Task("cache entry has no parent".into()))?;
            std::fs::create_dir_all(shard)?;
            // Write beside the target and rename so readers never see a partial entry.
            let mut tmp = tempfile::NamedTempFile::new_in(shard)?;
            tmp.write_all(&value)?;
            tmp.persist(&path).map_err(|e| CacheError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::Task(e.to_string()))?
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.entry_path(key)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
