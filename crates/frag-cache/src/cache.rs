//! Cache front: degrade-on-error reads, context redirects, and a
//! single-flight guard for concurrent misses.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use frag_core::RenderContext;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::entry::{CacheEntry, CachedOutput};
use crate::error::{CacheError, CacheResult};
use crate::key::{CacheKey, CacheKeyBuilder};
use crate::store::CacheBackend;

/// Status of a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Fresh cache hit.
    Hit,
    /// Cache miss; the value was computed.
    Miss,
    /// Caching was not applicable.
    Bypass,
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hit => write!(f, "HIT"),
            Self::Miss => write!(f, "MISS"),
            Self::Bypass => write!(f, "BYPASS"),
        }
    }
}

type PendingResult = Option<Result<CachedOutput, CacheError>>;

/// Removes the pending-map entry for a key when the computation task
/// finishes, whether it returned or panicked.
struct PendingGuard {
    pending: Arc<Mutex<HashMap<String, watch::Receiver<PendingResult>>>>,
    key: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let pending = Arc::clone(&self.pending);
        let key = std::mem::take(&mut self.key);
        tokio::spawn(async move {
            pending.lock().await.remove(&key);
        });
    }
}

/// Front over a [`CacheBackend`].
///
/// Backend failures are logged and degrade to a forced miss on reads and
/// a no-op on writes; they never abort a render. Entries whose
/// cacheability forbids storage are never written, so lookups of such
/// keys always miss.
#[derive(Clone)]
pub struct RenderCache {
    backend: Arc<dyn CacheBackend>,
    pending: Arc<Mutex<HashMap<String, watch::Receiver<PendingResult>>>>,
}

impl RenderCache {
    /// Create a cache front over a backend.
    pub fn new(backend: impl CacheBackend + 'static) -> Self {
        Self::from_shared(Arc::new(backend))
    }

    /// Create a cache front over a shared backend handle.
    pub fn from_shared(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Read an entry, treating backend errors as a miss.
    async fn read(&self, key: &str) -> Option<CacheEntry> {
        match self.backend.get(key).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(key, %err, "cache backend read failed, treating as miss");
                None
            }
        }
    }

    /// Write an entry, swallowing backend errors.
    async fn write(&self, key: &str, entry: CacheEntry) {
        if let Err(err) = self.backend.put(key, entry).await {
            warn!(key, %err, "cache backend write failed, skipping store");
        }
    }

    /// Look up a stored output by its declared keys, resolving contexts
    /// through at most one redirect hop.
    ///
    /// Returns the output together with the full key it was found under.
    pub async fn lookup(
        &self,
        keys: &[String],
        ctx: &RenderContext,
    ) -> Option<(CachedOutput, CacheKey)> {
        let base = CacheKeyBuilder::new().keys(keys.iter().cloned()).build();

        match self.read(base.as_str()).await? {
            CacheEntry::Output(out) if !out.is_expired() => Some((out, base)),
            CacheEntry::Output(_) => None,
            CacheEntry::Redirect { contexts } => {
                let resolved = ctx.resolve_all(&contexts);
                let full = CacheKeyBuilder::new()
                    .keys(keys.iter().cloned())
                    .contexts(resolved)
                    .build();
                match self.read(full.as_str()).await? {
                    CacheEntry::Output(out) if !out.is_expired() => Some((out, full)),
                    _ => None,
                }
            }
        }
    }

    /// Store an output under its declared keys plus its resolved contexts.
    ///
    /// When the output varies by contexts, a redirect recording the kinds
    /// is written at the base key so later readers know what to resolve.
    /// Uncacheable outputs are never stored. Returns the full key the
    /// entry was (or would have been) stored under.
    pub async fn store(
        &self,
        keys: &[String],
        ctx: &RenderContext,
        output: CachedOutput,
    ) -> CacheKey {
        let base = CacheKeyBuilder::new().keys(keys.iter().cloned()).build();

        if !output.cacheability.allows_caching() {
            debug!(key = base.as_str(), "output is uncacheable, not storing");
            return base;
        }

        if output.cacheability.contexts.is_empty() {
            self.write(base.as_str(), CacheEntry::Output(output)).await;
            return base;
        }

        let contexts = output.cacheability.contexts.clone();
        let resolved = ctx.resolve_all(&contexts);
        let full = CacheKeyBuilder::new()
            .keys(keys.iter().cloned())
            .contexts(resolved)
            .build();

        self.write(base.as_str(), CacheEntry::Redirect { contexts })
            .await;
        self.write(full.as_str(), CacheEntry::Output(output)).await;
        full
    }

    /// Get the output under a fully-resolved key, or compute it.
    ///
    /// Concurrent misses on the same key collapse into exactly one
    /// computation whose result every caller receives. The computation is
    /// spawned on the runtime, so a caller that is cancelled while
    /// waiting does not cancel it and its result still lands in the
    /// cache for the other waiters.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &CacheKey,
        compute: F,
    ) -> CacheResult<(CachedOutput, CacheStatus)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<CachedOutput>> + Send + 'static,
    {
        if let Some(CacheEntry::Output(out)) = self.read(key.as_str()).await {
            if !out.is_expired() {
                debug!(key = key.as_str(), "cache hit");
                return Ok((out, CacheStatus::Hit));
            }
        }

        let mut rx = {
            let mut pending = self.pending.lock().await;
            match pending.get(key.as_str()) {
                Some(rx) => {
                    debug!(key = key.as_str(), "joining in-flight computation");
                    rx.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    pending.insert(key.as_str().to_string(), rx.clone());

                    let backend = Arc::clone(&self.backend);
                    let guard = PendingGuard {
                        pending: Arc::clone(&self.pending),
                        key: key.as_str().to_string(),
                    };
                    let key_str = key.as_str().to_string();
                    let fut = compute();

                    tokio::spawn(async move {
                        let _guard = guard;
                        let result = fut.await;

                        if let Ok(out) = &result {
                            if out.cacheability.allows_caching() {
                                if let Err(err) =
                                    backend.put(&key_str, CacheEntry::Output(out.clone())).await
                                {
                                    warn!(key = key_str.as_str(), %err, "cache backend write failed");
                                }
                            }
                        }

                        let _ = tx.send(Some(result));
                    });

                    rx
                }
            }
        };

        loop {
            if let Some(result) = rx.borrow_and_update().clone() {
                return result.map(|out| (out, CacheStatus::Miss));
            }
            if rx.changed().await.is_err() {
                return Err(CacheError::ComputeFailed(
                    "computation task dropped without a result".to_string(),
                ));
            }
        }
    }

    /// Evict every stored entry carrying a tag.
    pub async fn invalidate_tag(&self, tag: &str) -> CacheResult<u64> {
        let count = self.backend.invalidate_tag(tag).await?;
        debug!(tag, count, "invalidated tag");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;
    use frag_core::{Cacheability, MapContextProvider};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ctx(user: &str) -> RenderContext {
        RenderContext::new(Arc::new(MapContextProvider::new().with("user", user)))
    }

    fn key(name: &str) -> CacheKey {
        CacheKeyBuilder::new().key(name).build()
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = RenderCache::new(MemoryBackend::new());
        let calls = Arc::new(AtomicUsize::new(0));

        for expected in [CacheStatus::Miss, CacheStatus::Hit] {
            let calls = Arc::clone(&calls);
            let (out, status) = cache
                .get_or_compute(&key("k"), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(CachedOutput::new("Hi", Cacheability::permanent()))
                })
                .await
                .unwrap();
            assert_eq!(out.output, "Hi");
            assert_eq!(status, expected);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_compute_once() {
        let cache = RenderCache::new(MemoryBackend::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                let (out, _) = cache
                    .get_or_compute(&key("shared"), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(CachedOutput::new("once", Cacheability::permanent()))
                    })
                    .await
                    .unwrap();
                out.output
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "once");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_cancel_computation() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = RenderCache::from_shared(backend.clone());

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(&key("slow"), || async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(CachedOutput::new("done", Cacheability::permanent()))
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        waiter.abort();

        // The spawned computation keeps running and populates the cache.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let entry = backend.get(key("slow").as_str()).await.unwrap();
        assert!(matches!(entry, Some(CacheEntry::Output(out)) if out.output == "done"));
    }

    #[tokio::test]
    async fn test_compute_error_reaches_every_waiter() {
        let cache = RenderCache::new(MemoryBackend::new());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(&key("failing"), || async {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Err(CacheError::ComputeFailed("boom".to_string()))
                    })
                    .await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_err());
        }
    }

    #[tokio::test]
    async fn test_uncacheable_result_is_not_stored() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = RenderCache::from_shared(backend.clone());

        let (_, status) = cache
            .get_or_compute(&key("private"), || async {
                Ok(CachedOutput::new("secret", Cacheability::uncacheable()))
            })
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Miss);
        assert_eq!(backend.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_store_and_lookup_without_contexts() {
        let cache = RenderCache::new(MemoryBackend::new());
        let keys = vec!["letter-a".to_string()];

        let stored = cache
            .store(
                &keys,
                &ctx("Alice"),
                CachedOutput::new("Alfa", Cacheability::permanent()),
            )
            .await;
        assert_eq!(stored.as_str(), "v1|letter-a");

        // The entry is context-free, so any user hits it.
        let (out, found) = cache.lookup(&keys, &ctx("Bob")).await.unwrap();
        assert_eq!(out.output, "Alfa");
        assert_eq!(found, stored);
    }

    #[tokio::test]
    async fn test_store_writes_redirect_for_contexts() {
        let cache = RenderCache::new(MemoryBackend::new());
        let keys = vec!["front".to_string()];

        cache
            .store(
                &keys,
                &ctx("Alice"),
                CachedOutput::new(
                    "Hello Alice",
                    Cacheability::permanent().with_context("user"),
                ),
            )
            .await;

        let (out, found) = cache.lookup(&keys, &ctx("Alice")).await.unwrap();
        assert_eq!(out.output, "Hello Alice");
        assert_eq!(found.as_str(), "v1|front|[user]=Alice");

        // A different user follows the redirect to a different key and misses.
        assert!(cache.lookup(&keys, &ctx("Bob")).await.is_none());
    }

    #[tokio::test]
    async fn test_uncacheable_page_is_never_stored() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = RenderCache::from_shared(backend.clone());
        let keys = vec!["front".to_string()];

        cache
            .store(
                &keys,
                &ctx("Alice"),
                CachedOutput::new("secret", Cacheability::uncacheable()),
            )
            .await;
        assert_eq!(backend.entry_count().await, 0);
        assert!(cache.lookup(&keys, &ctx("Alice")).await.is_none());
    }

    #[tokio::test]
    async fn test_backend_read_error_degrades_to_miss() {
        struct FailingReads;

        #[async_trait::async_trait]
        impl CacheBackend for FailingReads {
            async fn get(&self, _key: &str) -> CacheResult<Option<CacheEntry>> {
                Err(CacheError::Storage("unreachable".to_string()))
            }
            async fn put(&self, _key: &str, _entry: CacheEntry) -> CacheResult<()> {
                Err(CacheError::Storage("unreachable".to_string()))
            }
            async fn delete(&self, _key: &str) -> CacheResult<()> {
                Ok(())
            }
            async fn invalidate_tag(&self, _tag: &str) -> CacheResult<u64> {
                Ok(0)
            }
        }

        let cache = RenderCache::new(FailingReads);
        let (out, status) = cache
            .get_or_compute(&key("k"), || async {
                Ok(CachedOutput::new("fresh", Cacheability::permanent()))
            })
            .await
            .unwrap();

        // Render proceeds without caching.
        assert_eq!(out.output, "fresh");
        assert_eq!(status, CacheStatus::Miss);
    }

    #[tokio::test]
    async fn test_tag_invalidation_makes_next_get_miss() {
        let cache = RenderCache::new(MemoryBackend::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let compute = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(CachedOutput::new(
                    "Hi",
                    Cacheability::permanent().with_tag("user:5"),
                ))
            }
        };

        let (_, status) = cache
            .get_or_compute(&key("k"), compute(Arc::clone(&calls)))
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Miss);

        let evicted = cache.invalidate_tag("user:5").await.unwrap();
        assert_eq!(evicted, 1);

        let (_, status) = cache
            .get_or_compute(&key("k"), compute(Arc::clone(&calls)))
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Miss);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
