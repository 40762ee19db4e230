//! Cache backend contract and the in-memory backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::entry::CacheEntry;
use crate::error::CacheResult;

/// Storage contract for the render cache.
///
/// The backend may be in-process or a remote store; the contract is the
/// same either way. Implementations must be safe for concurrent `get`,
/// `put`, and `invalidate_tag`.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get the entry stored under a key.
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>>;

    /// Store an entry under a key.
    async fn put(&self, key: &str, entry: CacheEntry) -> CacheResult<()>;

    /// Delete the entry under a key.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Evict every entry whose tag set contains `tag`.
    ///
    /// Returns the number of entries evicted.
    async fn invalidate_tag(&self, tag: &str) -> CacheResult<u64>;
}

/// In-process backend for tests and single-node deployments.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, redirects included.
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> CacheResult<()> {
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn invalidate_tag(&self, tag: &str) -> CacheResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| match entry.tags() {
            Some(tags) => !tags.contains(tag),
            // Redirects carry no tags; a stale redirect just leads to a miss.
            None => true,
        });
        Ok((before - entries.len()) as u64)
    }
}
