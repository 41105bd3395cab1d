//! Read-through cache for derived aggregates.
//!
//! [`AggregateCache::get_or_compute`] returns a cached value or computes it
//! from the store. Concurrent misses on one key share a single computation,
//! and a computation only populates the cache if no invalidation touched
//! the key's namespace while it ran.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;

use mapro_core::cache::{
    self, deserialize, namespace_pattern, serialize, Cache, Generation, PopulateOutcome,
};
use mapro_core::storage::{RepositoryError, Result};

/// What the leader of a flight hands to its followers.
type FlightResult = std::result::Result<Arc<Vec<u8>>, RepositoryError>;

/// An in-progress computation for one key.
struct Flight {
    id: u64,
    generation: Generation,
    tx: broadcast::Sender<FlightResult>,
}

#[derive(Default)]
struct Flights {
    next_id: u64,
    by_key: HashMap<String, Flight>,
}

enum Joined {
    Leader(FlightGuard),
    Follower(broadcast::Receiver<FlightResult>),
}

enum Step {
    Lead(FlightGuard),
    Uncached,
}

/// Leadership of a flight. Dropping it without [`FlightGuard::finish`]
/// releases the key so followers retry.
struct FlightGuard {
    flights: Arc<Mutex<Flights>>,
    key: String,
    id: u64,
    generation: Generation,
    tx: broadcast::Sender<FlightResult>,
}

impl FlightGuard {
    fn finish(self, result: FlightResult) {
        self.release();
        // No receivers is fine: nobody joined.
        let _ = self.tx.send(result);
    }

    fn release(&self) {
        let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
        if flights
            .by_key
            .get(&self.key)
            .is_some_and(|flight| flight.id == self.id)
        {
            flights.by_key.remove(&self.key);
        }
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Generation-checked, single-flight read-through cache.
///
/// Cheap to clone; clones share the backend, the in-flight table and the
/// failed-invalidation counter.
#[derive(Clone)]
pub struct AggregateCache {
    backend: Arc<dyn Cache>,
    ttl: Duration,
    compute_timeout: Option<Duration>,
    flights: Arc<Mutex<Flights>>,
    failed_invalidations: Arc<AtomicU64>,
}

impl AggregateCache {
    /// Creates a cache over `backend` with a default entry TTL.
    pub fn new(backend: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            compute_timeout: None,
            flights: Arc::new(Mutex::new(Flights::default())),
            failed_invalidations: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Bounds every computation. A computation that runs out of time fails
    /// with `StoreUnavailable` and populates nothing.
    pub fn with_compute_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.compute_timeout = timeout;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn backend(&self) -> &Arc<dyn Cache> {
        &self.backend
    }

    /// Number of committed writes whose invalidation could not be applied,
    /// not even by clearing the whole cache.
    ///
    /// While non-zero, reads may serve entries older than a committed write
    /// until their TTL runs out.
    pub fn failed_invalidations(&self) -> u64 {
        self.failed_invalidations.load(Ordering::Relaxed)
    }

    pub(crate) fn record_failed_invalidation(&self) {
        self.failed_invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the cached value for `key`, computing it on a miss.
    pub async fn get_or_compute<V, F, Fut>(&self, key: &str, compute: F) -> Result<V>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        self.get_or_compute_with_ttl(key, self.ttl, compute).await
    }

    /// Like [`get_or_compute`](Self::get_or_compute) with an explicit TTL.
    ///
    /// Errors from `compute` reach every caller waiting on the same key and
    /// leave the cache untouched. If the backend itself is failing, the value
    /// is computed directly and not cached.
    pub async fn get_or_compute_with_ttl<V, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<V>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let step = loop {
            if let Some(value) = self.lookup(key).await {
                return Ok(value);
            }

            let generation = match self.backend.generation(key).await {
                Ok(generation) => generation,
                Err(err) => {
                    tracing::warn!(key, error = %err, "Cache unavailable, computing uncached");
                    break Step::Uncached;
                }
            };

            match self.join(key, generation) {
                Joined::Leader(guard) => break Step::Lead(guard),
                Joined::Follower(mut rx) => match rx.recv().await {
                    Ok(Ok(bytes)) => {
                        return deserialize(&bytes)
                            .map_err(|e| RepositoryError::Serialization(e.to_string()));
                    }
                    Ok(Err(err)) => return Err(err),
                    Err(_) => {
                        tracing::trace!(key, "Computation abandoned, retrying");
                    }
                },
            }
        };

        let result = self.run(key, compute()).await;

        let guard = match step {
            Step::Uncached => return result,
            Step::Lead(guard) => guard,
        };

        match result {
            Ok(value) => {
                match serialize(&value) {
                    Ok(bytes) => {
                        self.populate(key, &bytes, ttl, guard.generation).await;
                        guard.finish(Ok(Arc::new(bytes)));
                    }
                    Err(err) => {
                        tracing::warn!(key, error = %err, "Failed to encode computed value");
                        guard.finish(Err(RepositoryError::Serialization(err.to_string())));
                    }
                }
                Ok(value)
            }
            Err(err) => {
                tracing::debug!(key, error = %err, "Computation failed, nothing cached");
                guard.finish(Err(err.clone()));
                Err(err)
            }
        }
    }

    /// Removes one key. Absent keys are fine.
    pub async fn invalidate(&self, key: &str) -> cache::Result<()> {
        self.backend.delete(key).await?;
        tracing::debug!(key, "Invalidated cache key");
        Ok(())
    }

    /// Removes every per-subject key of `namespace` (`namespace:*`).
    pub async fn invalidate_namespace(&self, namespace: &str) -> cache::Result<()> {
        let pattern = namespace_pattern(namespace);
        self.backend.delete_pattern(&pattern).await?;
        tracing::debug!(%pattern, "Invalidated cache namespace");
        Ok(())
    }

    /// Empties the cache.
    pub async fn clear_all(&self) -> cache::Result<()> {
        self.backend.clear().await?;
        tracing::debug!("Cleared all cache keys");
        Ok(())
    }

    /// Reads and decodes a cached value. Failures count as misses.
    async fn lookup<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        match self.backend.get(key).await {
            Ok(Some(bytes)) => match deserialize(&bytes) {
                Ok(value) => {
                    tracing::trace!(key, "Cache hit");
                    Some(value)
                }
                Err(err) => {
                    tracing::warn!(key, error = %err, "Cached value could not be decoded");
                    None
                }
            },
            Ok(None) => {
                tracing::trace!(key, "Cache miss");
                None
            }
            Err(err) => {
                tracing::warn!(key, error = %err, "Cache read failed");
                None
            }
        }
    }

    /// Joins the flight for `key` if it started at `generation`, otherwise
    /// starts a new one.
    fn join(&self, key: &str, generation: Generation) -> Joined {
        let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(flight) = flights.by_key.get(key) {
            if flight.generation == generation {
                return Joined::Follower(flight.tx.subscribe());
            }
        }

        flights.next_id += 1;
        let id = flights.next_id;
        let (tx, _) = broadcast::channel(1);
        flights.by_key.insert(
            key.to_string(),
            Flight {
                id,
                generation,
                tx: tx.clone(),
            },
        );

        Joined::Leader(FlightGuard {
            flights: Arc::clone(&self.flights),
            key: key.to_string(),
            id,
            generation,
            tx,
        })
    }

    async fn run<V, Fut>(&self, key: &str, fut: Fut) -> Result<V>
    where
        Fut: Future<Output = Result<V>>,
    {
        let Some(limit) = self.compute_timeout else {
            return fut.await;
        };

        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(key, timeout = ?limit, "Computation timed out");
                Err(RepositoryError::StoreUnavailable(format!(
                    "computing {} took longer than {:?}",
                    key, limit
                )))
            }
        }
    }

    async fn populate(&self, key: &str, bytes: &[u8], ttl: Duration, generation: Generation) {
        match self
            .backend
            .set_if_generation(key, bytes, Some(ttl), generation)
            .await
        {
            Ok(PopulateOutcome::Stored) => tracing::trace!(key, "Cached computed value"),
            Ok(PopulateOutcome::StaleDiscarded) => {
                tracing::debug!(key, "Invalidated during computation, discarding value")
            }
            Err(err) => tracing::warn!(key, error = %err, "Failed to cache computed value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use async_trait::async_trait;
    use mapro_core::cache::{CacheError, COUNT_CITIZENS, COUNT_HOUSEHOLDS, USER_ROLES};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    const TTL: Duration = Duration::from_secs(60);

    fn memory_cache() -> (Arc<MemoryCache>, AggregateCache) {
        let backend = Arc::new(MemoryCache::new(100));
        let cache = AggregateCache::new(backend.clone(), TTL);
        (backend, cache)
    }

    /// Backend whose every operation fails.
    struct BrokenCache;

    #[async_trait]
    impl Cache for BrokenCache {
        async fn get(&self, _key: &str) -> cache::Result<Option<Vec<u8>>> {
            Err(CacheError::ConnectionFailed("down".to_string()))
        }
        async fn set(&self, _key: &str, _value: &[u8], _ttl: Option<Duration>) -> cache::Result<()> {
            Err(CacheError::ConnectionFailed("down".to_string()))
        }
        async fn generation(&self, _key: &str) -> cache::Result<Generation> {
            Err(CacheError::ConnectionFailed("down".to_string()))
        }
        async fn set_if_generation(
            &self,
            _key: &str,
            _value: &[u8],
            _ttl: Option<Duration>,
            _generation: Generation,
        ) -> cache::Result<PopulateOutcome> {
            Err(CacheError::ConnectionFailed("down".to_string()))
        }
        async fn delete(&self, _key: &str) -> cache::Result<()> {
            Err(CacheError::ConnectionFailed("down".to_string()))
        }
        async fn delete_pattern(&self, _pattern: &str) -> cache::Result<()> {
            Err(CacheError::ConnectionFailed("down".to_string()))
        }
        async fn clear(&self) -> cache::Result<()> {
            Err(CacheError::ConnectionFailed("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_miss_computes_and_populates() {
        let (backend, cache) = memory_cache();

        let value: u64 = cache
            .get_or_compute(COUNT_CITIZENS, || async { Ok(12) })
            .await
            .unwrap();

        assert_eq!(value, 12);
        assert_eq!(
            backend.get(COUNT_CITIZENS).await.unwrap(),
            Some(b"12".to_vec())
        );
    }

    #[tokio::test]
    async fn test_hit_skips_compute() {
        let (_, cache) = memory_cache();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: u64 = cache
                .get_or_compute(COUNT_CITIZENS, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(5)
                })
                .await
                .unwrap();
            assert_eq!(value, 5);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_recompute() {
        let (_, cache) = memory_cache();

        let first: u64 = cache
            .get_or_compute(COUNT_CITIZENS, || async { Ok(1) })
            .await
            .unwrap();
        cache.invalidate(COUNT_CITIZENS).await.unwrap();
        let second: u64 = cache
            .get_or_compute(COUNT_CITIZENS, || async { Ok(2) })
            .await
            .unwrap();

        assert_eq!((first, second), (1, 2));
    }

    #[tokio::test]
    async fn test_error_propagates_and_caches_nothing() {
        let (backend, cache) = memory_cache();

        let result: Result<u64> = cache
            .get_or_compute(COUNT_CITIZENS, || async {
                Err(RepositoryError::QueryFailed("disk on fire".to_string()))
            })
            .await;

        assert_eq!(
            result,
            Err(RepositoryError::QueryFailed("disk on fire".to_string()))
        );
        assert!(backend.get(COUNT_CITIZENS).await.unwrap().is_none());

        let retry: u64 = cache
            .get_or_compute(COUNT_CITIZENS, || async { Ok(3) })
            .await
            .unwrap();
        assert_eq!(retry, 3);
    }

    #[tokio::test]
    async fn test_invalidation_during_compute_discards_value() {
        let (backend, cache) = memory_cache();
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let reader = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(COUNT_CITIZENS, move || async move {
                        let _ = started_tx.send(());
                        let _ = release_rx.await;
                        Ok::<u64, RepositoryError>(10)
                    })
                    .await
            })
        };

        started_rx.await.unwrap();
        cache.invalidate(COUNT_CITIZENS).await.unwrap();
        release_tx.send(()).unwrap();

        // The caller still gets its value, but the slot stays empty.
        assert_eq!(reader.await.unwrap().unwrap(), 10);
        assert!(backend.get(COUNT_CITIZENS).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidating_other_namespace_keeps_value() {
        let (backend, cache) = memory_cache();
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let reader = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(COUNT_CITIZENS, move || async move {
                        let _ = started_tx.send(());
                        let _ = release_rx.await;
                        Ok::<u64, RepositoryError>(10)
                    })
                    .await
            })
        };

        started_rx.await.unwrap();
        cache.invalidate(COUNT_HOUSEHOLDS).await.unwrap();
        release_tx.send(()).unwrap();

        assert_eq!(reader.await.unwrap().unwrap(), 10);
        assert!(backend.get(COUNT_CITIZENS).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_share_one_computation() {
        let (_, cache) = memory_cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(COUNT_CITIZENS, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<u64, RepositoryError>(99)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 99);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_followers_receive_leader_error() {
        let (backend, cache) = memory_cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(COUNT_CITIZENS, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Err::<u64, _>(RepositoryError::StoreUnavailable("offline".to_string()))
                    })
                    .await
            }));
        }

        for handle in handles {
            assert!(matches!(
                handle.await.unwrap(),
                Err(RepositoryError::StoreUnavailable(_))
            ));
        }
        assert!(calls.load(Ordering::SeqCst) >= 1);
        assert!(backend.get(COUNT_CITIZENS).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_abandoned_leader_lets_follower_compute() {
        let (_, cache) = memory_cache();
        let (started_tx, started_rx) = oneshot::channel::<()>();

        let leader = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(COUNT_CITIZENS, move || async move {
                        let _ = started_tx.send(());
                        std::future::pending::<Result<u64>>().await
                    })
                    .await
            })
        };
        started_rx.await.unwrap();

        let follower = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(COUNT_CITIZENS, || async { Ok::<u64, RepositoryError>(4) })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        leader.abort();

        assert_eq!(follower.await.unwrap().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_timeout_fails_and_leaves_slot_absent() {
        let (backend, cache) = memory_cache();
        let cache = cache.with_compute_timeout(Some(Duration::from_millis(20)));

        let result: Result<u64> = cache
            .get_or_compute(COUNT_CITIZENS, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(1)
            })
            .await;

        assert!(matches!(result, Err(RepositoryError::StoreUnavailable(_))));
        assert!(backend.get(COUNT_CITIZENS).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_recomputed() {
        let (backend, cache) = memory_cache();
        backend
            .set(COUNT_CITIZENS, b"not json", None)
            .await
            .unwrap();

        let value: u64 = cache
            .get_or_compute(COUNT_CITIZENS, || async { Ok(8) })
            .await
            .unwrap();

        assert_eq!(value, 8);
        assert_eq!(
            backend.get(COUNT_CITIZENS).await.unwrap(),
            Some(b"8".to_vec())
        );
    }

    #[tokio::test]
    async fn test_broken_backend_computes_uncached() {
        let cache = AggregateCache::new(Arc::new(BrokenCache), TTL);
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: u64 = cache
                .get_or_compute(COUNT_CITIZENS, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(6)
                })
                .await
                .unwrap();
            assert_eq!(value, 6);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.invalidate(COUNT_CITIZENS).await.is_err());
    }

    #[tokio::test]
    async fn test_invalidate_namespace_drops_only_that_namespace() {
        let (backend, cache) = memory_cache();
        backend.set("user_roles:a", b"1", None).await.unwrap();
        backend.set("user_roles:b", b"1", None).await.unwrap();
        backend.set("user_roles_archive", b"1", None).await.unwrap();
        backend.set(COUNT_CITIZENS, b"1", None).await.unwrap();

        cache.invalidate_namespace(USER_ROLES).await.unwrap();

        assert!(backend.get("user_roles:a").await.unwrap().is_none());
        assert!(backend.get("user_roles:b").await.unwrap().is_none());
        assert!(backend.get("user_roles_archive").await.unwrap().is_some());
        assert!(backend.get(COUNT_CITIZENS).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_all() {
        let (backend, cache) = memory_cache();
        backend.set(COUNT_CITIZENS, b"1", None).await.unwrap();
        backend.set("user_roles:a", b"1", None).await.unwrap();

        cache.clear_all().await.unwrap();

        assert!(backend.is_empty().await);
    }
}
