use async_trait::async_trait;
use dashmap::DashMap;

use super::{FileCache, Result};

/// In-process cache. Entries live until deleted or the process exits.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl FileCache for MemoryCache {
    async fn store(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Cache that never holds anything, for when caching is switched off.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl FileCache for NoopCache {
    async fn store(&self, _key: &str, _value: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn load(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}
