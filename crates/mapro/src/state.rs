//! Application state wiring the stores, the cache and the registry facade.
//!
//! Every component receives its `AggregateCache` explicitly; there is no
//! process-wide cache. Writes go through the cache-invalidating decorators
//! in `store` and `accounts`, reads through `registry`.

use std::sync::Arc;

use mapro_core::storage::{AccountRepository, EntityStore};

use crate::cache::{AggregateCache, InvalidationCoordinator, MemoryCache};
use crate::config::Config;
use crate::services::RegistryCache;
use crate::storage::{CachedAccountRepository, CachedEntityStore, InMemoryStore};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Entity store (cached, wraps underlying storage).
    pub store: Arc<dyn EntityStore>,
    /// Account repository (cached, wraps underlying storage).
    pub accounts: Arc<dyn AccountRepository>,
    /// Cached registry reads.
    pub registry: RegistryCache,
    /// The aggregate cache shared by everything above.
    pub cache: AggregateCache,
}

impl AppState {
    /// Wraps a backend that stores both records and accounts.
    pub fn build<S>(backend: Arc<S>, cache: AggregateCache) -> Self
    where
        S: EntityStore + AccountRepository + 'static,
    {
        let coordinator = InvalidationCoordinator::new(cache.clone());
        let store: Arc<dyn EntityStore> =
            Arc::new(CachedEntityStore::new(backend.clone(), coordinator.clone()));
        let accounts: Arc<dyn AccountRepository> =
            Arc::new(CachedAccountRepository::new(backend, coordinator));
        let registry = RegistryCache::new(store.clone(), accounts.clone(), cache.clone());

        Self {
            store,
            accounts,
            registry,
            cache,
        }
    }

    /// Creates AppState with in-memory storage.
    /// Useful for testing without any external dependencies.
    pub fn in_memory(config: &Config) -> Self {
        Self::build(Arc::new(InMemoryStore::new()), memory_cache(config))
    }
}

/// Builds the LRU-backed aggregate cache described by `config`.
pub fn memory_cache(config: &Config) -> AggregateCache {
    let backend = Arc::new(MemoryCache::new(config.cache_max_entries));
    AggregateCache::new(backend, config.cache_ttl()).with_compute_timeout(config.compute_timeout())
}

// ============================================================================
// Factory functions for different backends
// ============================================================================

#[cfg(feature = "sqlite")]
mod sqlite_memory {
    use super::*;
    use crate::storage::SqliteStore;

    impl AppState {
        /// Creates AppState with SQLite storage and in-memory cache.
        pub async fn new(config: &Config) -> Result<Self, anyhow::Error> {
            let sqlite_store = Arc::new(SqliteStore::new(&config.sqlite_path).await?);
            tracing::info!(path = %config.sqlite_path, "Using SQLite store");
            Ok(Self::build(sqlite_store, memory_cache(config)))
        }
    }
}

#[cfg(not(feature = "sqlite"))]
mod inmemory_memory {
    use super::*;

    impl AppState {
        /// Creates AppState with in-memory storage and cache.
        pub async fn new(config: &Config) -> Result<Self, anyhow::Error> {
            tracing::info!("Using in-memory store");
            Ok(Self::in_memory(config))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapro_core::registry::Citizen;

    fn test_config() -> Config {
        Config {
            cache_ttl_seconds: 3600,
            cache_max_entries: 100,
            cache_compute_timeout_ms: 1_000,
            sqlite_path: "unused.db".to_string(),
        }
    }

    #[tokio::test]
    async fn test_writes_through_state_reach_registry() {
        let state = AppState::in_memory(&test_config());
        assert_eq!(state.registry.get_count_citizen().await.unwrap(), 0);

        state
            .store
            .create(Citizen::new("Lito", "Lapid").into())
            .await
            .unwrap();

        assert_eq!(state.registry.get_count_citizen().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_cache_uses_config_ttl() {
        let cache = memory_cache(&test_config());
        assert_eq!(cache.ttl(), std::time::Duration::from_secs(3600));
    }
}
