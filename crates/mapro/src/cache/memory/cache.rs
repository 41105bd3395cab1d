//! In-memory cache implementation with LRU eviction.
//!
//! Values and namespace generations live behind one lock, so a
//! generation-checked populate can never interleave with an invalidation.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::RwLock;

use mapro_core::cache::{
    namespace_of, pattern_matches, pattern_touches_namespace, Cache, Generation, PopulateOutcome,
    Result,
};

/// A single cache entry with optional expiration.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.map(|d| Instant::now() + d);
        Self { value, expires_at }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() > exp)
    }
}

#[derive(Debug)]
struct Inner {
    store: LruCache<String, CacheEntry>,
    /// Namespace -> invalidation counter. A namespace is registered the first
    /// time anyone asks for its generation.
    generations: HashMap<String, u64>,
}

impl Inner {
    fn current(&mut self, namespace: &str) -> Generation {
        Generation(
            *self
                .generations
                .entry(namespace.to_string())
                .or_insert(0),
        )
    }

    fn bump(&mut self, namespace: &str) {
        *self
            .generations
            .entry(namespace.to_string())
            .or_insert(0) += 1;
    }
}

/// In-memory cache implementation with LRU eviction.
///
/// Thread-safe cache using `Arc<RwLock<..>>` for concurrent access.
/// Supports TTL with lazy expiration (expired entries are dropped when read).
/// Uses LRU eviction to limit memory usage when max_entries is reached.
/// Eviction does not bump generations; it only makes a key absent.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryCache {
    /// Creates a new in-memory cache with LRU eviction.
    ///
    /// # Arguments
    ///
    /// * `max_entries` - Maximum number of entries before LRU eviction kicks in.
    ///
    /// # Panics
    ///
    /// Panics if `max_entries` is 0.
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).expect("max_entries must be > 0");
        Self {
            inner: Arc::new(RwLock::new(Inner {
                store: LruCache::new(capacity),
                generations: HashMap::new(),
            })),
        }
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.inner.read().await.store.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.write().await;

        let expired = match inner.store.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.store.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .store
            .put(key.to_string(), CacheEntry::new(value.to_vec(), ttl));
        Ok(())
    }

    async fn generation(&self, key: &str) -> Result<Generation> {
        let mut inner = self.inner.write().await;
        Ok(inner.current(namespace_of(key)))
    }

    async fn set_if_generation(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
        generation: Generation,
    ) -> Result<PopulateOutcome> {
        let mut inner = self.inner.write().await;

        if inner.current(namespace_of(key)) != generation {
            return Ok(PopulateOutcome::StaleDiscarded);
        }

        inner
            .store
            .put(key.to_string(), CacheEntry::new(value.to_vec(), ttl));
        Ok(PopulateOutcome::Stored)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.store.pop(key);
        inner.bump(namespace_of(key));
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        let mut inner = self.inner.write().await;

        let keys_to_delete: Vec<String> = inner
            .store
            .iter()
            .filter(|(key, _)| pattern_matches(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys_to_delete {
            inner.store.pop(key);
        }

        let touched: Vec<String> = inner
            .generations
            .keys()
            .filter(|ns| pattern_touches_namespace(pattern, ns))
            .cloned()
            .collect();
        for namespace in &touched {
            inner.bump(namespace);
        }

        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.store.clear();
        for counter in inner.generations.values_mut() {
            *counter += 1;
        }
        Ok(())
    }
}
