//! Invalidation after committed writes.

use uuid::Uuid;

use mapro_core::cache::{affected_keys, target_keys, CacheError, Result, WriteKind, WriteTarget};

use super::AggregateCache;

/// Resolves the keys a write makes stale and removes them.
///
/// Keys come from the invalidation table only. If removing any key fails,
/// the whole cache is cleared so no stale aggregate survives. When that
/// fallback fails too, the error is returned and counted in
/// [`AggregateCache::failed_invalidations`].
#[derive(Clone)]
pub struct InvalidationCoordinator {
    cache: AggregateCache,
}

impl InvalidationCoordinator {
    pub fn new(cache: AggregateCache) -> Self {
        Self { cache }
    }

    /// Invalidates everything `write` affects. `account_ids` expands the
    /// per-account keys.
    pub async fn on_write(&self, write: WriteKind, account_ids: &[Uuid]) -> Result<()> {
        let keys = affected_keys(write, account_ids);
        tracing::debug!(?write, keys = ?keys, "Invalidating after write");
        self.invalidate_keys(&keys).await
    }

    /// Invalidates one row of the table, as an explicit clear would.
    pub async fn invalidate_target(&self, target: WriteTarget, account_ids: &[Uuid]) -> Result<()> {
        let keys = target_keys(target, account_ids);
        self.invalidate_keys(&keys).await
    }

    async fn invalidate_keys(&self, keys: &[String]) -> Result<()> {
        let mut failure: Option<CacheError> = None;
        for key in keys {
            if let Err(err) = self.cache.invalidate(key).await {
                tracing::warn!(key = %key, error = %err, "Failed to invalidate cache key");
                failure.get_or_insert(err);
            }
        }

        let Some(err) = failure else {
            return Ok(());
        };

        tracing::warn!(error = %err, "Falling back to clearing the whole cache");
        if let Err(err) = self.cache.clear_all().await {
            self.cache.record_failed_invalidation();
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::cache::MemoryCache;
    use mapro_core::cache::{
        system_permissions_key, user_roles_key, Cache, EntityWrite, ALL_CITIZENS, ALL_SITIOS,
        COUNT_CITIZENS, COUNT_HOUSEHOLDS,
    };
    use mapro_core::registry::EntityKind;

    async fn seeded() -> (Arc<MemoryCache>, InvalidationCoordinator) {
        let backend = Arc::new(MemoryCache::new(100));
        for key in [ALL_CITIZENS, COUNT_CITIZENS, COUNT_HOUSEHOLDS, ALL_SITIOS] {
            backend.set(key, b"1", None).await.unwrap();
        }
        let cache = AggregateCache::new(backend.clone(), Duration::from_secs(60));
        (backend, InvalidationCoordinator::new(cache))
    }

    #[tokio::test]
    async fn test_citizen_write_invalidates_citizen_keys_only() {
        let (backend, coordinator) = seeded().await;

        coordinator
            .on_write(
                WriteKind::entity(EntityKind::Citizen, EntityWrite::Create),
                &[],
            )
            .await
            .unwrap();

        assert!(backend.get(ALL_CITIZENS).await.unwrap().is_none());
        assert!(backend.get(COUNT_CITIZENS).await.unwrap().is_none());
        assert!(backend.get(COUNT_HOUSEHOLDS).await.unwrap().is_some());
        assert!(backend.get(ALL_SITIOS).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_access_write_invalidates_only_that_account() {
        let (backend, coordinator) = seeded().await;
        let changed = uuid::Uuid::new_v4();
        let untouched = uuid::Uuid::new_v4();
        for id in [changed, untouched] {
            backend.set(&user_roles_key(id), b"1", None).await.unwrap();
            backend
                .set(&system_permissions_key(id), b"1", None)
                .await
                .unwrap();
        }

        coordinator
            .on_write(WriteKind::AccountChange, &[changed])
            .await
            .unwrap();

        assert!(backend.get(&user_roles_key(changed)).await.unwrap().is_none());
        assert!(backend
            .get(&system_permissions_key(changed))
            .await
            .unwrap()
            .is_none());
        assert!(backend
            .get(&user_roles_key(untouched))
            .await
            .unwrap()
            .is_some());
        assert!(backend.get(COUNT_CITIZENS).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidating_uncached_keys_is_ok() {
        let backend = Arc::new(MemoryCache::new(10));
        let coordinator =
            InvalidationCoordinator::new(AggregateCache::new(backend, Duration::from_secs(1)));

        coordinator
            .invalidate_target(WriteTarget::Entity(EntityKind::Sitio), &[])
            .await
            .unwrap();
    }
}
