//! Cached registry reads for the dashboard and access checks.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use mapro_core::cache::{
    self, all_key, count_key, system_permissions_key, templates_for, user_roles_key, KeyTemplate,
    WriteTarget,
};
use mapro_core::registry::{
    latest_citizens, sorted_permissions, Business, Citizen, DashboardStats, Entity, EntityKind,
    Household, Infrastructure, PermissionGrant, PermissionName, Record, Role, Sitio,
    DEFAULT_LATEST_LIMIT,
};
use mapro_core::storage::{
    AccountRepository, EntityStore, ListFilter, Relation, RepositoryError, Result,
};

use crate::cache::{AggregateCache, InvalidationCoordinator};

/// Read facade over the registry.
///
/// Counts, live listings and per-account access data are served through the
/// aggregate cache. Recent-activity and archive views always hit the store.
#[derive(Clone)]
pub struct RegistryCache {
    store: Arc<dyn EntityStore>,
    accounts: Arc<dyn AccountRepository>,
    cache: AggregateCache,
    coordinator: InvalidationCoordinator,
}

impl RegistryCache {
    pub fn new(
        store: Arc<dyn EntityStore>,
        accounts: Arc<dyn AccountRepository>,
        cache: AggregateCache,
    ) -> Self {
        let coordinator = InvalidationCoordinator::new(cache.clone());
        Self {
            store,
            accounts,
            cache,
            coordinator,
        }
    }

    pub fn cache(&self) -> &AggregateCache {
        &self.cache
    }

    // ------------------------------------------------------------------------
    // Counts
    // ------------------------------------------------------------------------

    pub async fn get_count_citizen(&self) -> Result<u64> {
        self.cached_count(EntityKind::Citizen).await
    }

    pub async fn get_count_household(&self) -> Result<u64> {
        self.cached_count(EntityKind::Household).await
    }

    pub async fn get_count_business(&self) -> Result<u64> {
        self.cached_count(EntityKind::Business).await
    }

    pub async fn get_count_infrastructures(&self) -> Result<u64> {
        self.cached_count(EntityKind::Infrastructure).await
    }

    // ------------------------------------------------------------------------
    // Live listings
    // ------------------------------------------------------------------------

    pub async fn get_all_citizens(&self) -> Result<Vec<Citizen>> {
        self.cached_list().await
    }

    pub async fn get_all_households(&self) -> Result<Vec<Household>> {
        self.cached_list().await
    }

    pub async fn get_all_businesses(&self) -> Result<Vec<Business>> {
        self.cached_list().await
    }

    pub async fn get_all_infrastructures(&self) -> Result<Vec<Infrastructure>> {
        self.cached_list().await
    }

    pub async fn get_all_sitios(&self) -> Result<Vec<Sitio>> {
        self.cached_list().await
    }

    // ------------------------------------------------------------------------
    // Uncached views
    // ------------------------------------------------------------------------

    /// Returns the most recently encoded live citizens, newest first.
    pub async fn get_latest_citizens(&self, limit: usize) -> Result<Vec<Citizen>> {
        let citizens = self.live::<Citizen>().await?;
        Ok(latest_citizens(citizens, limit))
    }

    /// Returns the soft-deleted records of a kind.
    pub async fn get_archived(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        self.store.list(kind, &ListFilter::archived()).await
    }

    // ------------------------------------------------------------------------
    // Per-account access data
    // ------------------------------------------------------------------------

    /// Returns the role of `account_id`.
    ///
    /// Fails with `NotFound` for an unknown account; the miss is not cached.
    pub async fn get_roles(&self, account_id: Uuid) -> Result<Role> {
        let key = user_roles_key(account_id);
        self.cache
            .get_or_compute(&key, || async {
                self.accounts
                    .get_account(account_id)
                    .await?
                    .map(|account| account.role)
                    .ok_or_else(|| RepositoryError::not_found("Account", account_id))
            })
            .await
    }

    /// Returns the sorted, distinct permissions held through live grants.
    pub async fn get_system_permissions(&self, account_id: Uuid) -> Result<Vec<PermissionName>> {
        let key = system_permissions_key(account_id);
        self.cache
            .get_or_compute(&key, || async {
                if self.accounts.get_account(account_id).await?.is_none() {
                    return Err(RepositoryError::not_found("Account", account_id));
                }
                let grants: Vec<PermissionGrant> = self
                    .store
                    .find_related(EntityKind::PermissionGrant, account_id, Relation::Grants)
                    .await?
                    .into_iter()
                    .filter_map(Entity::downcast)
                    .collect();
                Ok(sorted_permissions(&grants))
            })
            .await
    }

    // ------------------------------------------------------------------------
    // Dashboard
    // ------------------------------------------------------------------------

    pub async fn get_dashboard(&self) -> Result<DashboardStats> {
        let (citizens, households, businesses, infrastructures, latest) = tokio::try_join!(
            self.get_count_citizen(),
            self.get_count_household(),
            self.get_count_business(),
            self.get_count_infrastructures(),
            self.get_latest_citizens(DEFAULT_LATEST_LIMIT),
        )?;

        Ok(DashboardStats {
            citizens,
            households,
            businesses,
            infrastructures,
            latest_citizens: latest,
        })
    }

    /// Pre-populates every cached count and listing.
    pub async fn warm(&self) -> Result<()> {
        tokio::try_join!(
            self.get_count_citizen(),
            self.get_count_household(),
            self.get_count_business(),
            self.get_count_infrastructures(),
            self.get_all_citizens(),
            self.get_all_households(),
            self.get_all_businesses(),
            self.get_all_infrastructures(),
            self.get_all_sitios(),
        )?;
        tracing::info!("Registry cache warmed");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Explicit invalidation
    // ------------------------------------------------------------------------

    pub async fn clear_citizen_cache(&self) -> cache::Result<()> {
        self.clear_kind(EntityKind::Citizen).await
    }

    pub async fn clear_household_cache(&self) -> cache::Result<()> {
        self.clear_kind(EntityKind::Household).await
    }

    pub async fn clear_business_cache(&self) -> cache::Result<()> {
        self.clear_kind(EntityKind::Business).await
    }

    pub async fn clear_infrastructure_cache(&self) -> cache::Result<()> {
        self.clear_kind(EntityKind::Infrastructure).await
    }

    pub async fn clear_sitio_cache(&self) -> cache::Result<()> {
        self.clear_kind(EntityKind::Sitio).await
    }

    /// Drops the cached access data of one account.
    pub async fn clear_account_cache(&self, account_id: Uuid) -> cache::Result<()> {
        self.coordinator
            .invalidate_target(WriteTarget::Access, &[account_id])
            .await
    }

    /// Drops the cached access data of every account.
    pub async fn clear_all_user_roles_cache(&self) -> cache::Result<()> {
        for template in templates_for(WriteTarget::Access) {
            if let KeyTemplate::PerAccount(namespace) = template {
                self.cache.invalidate_namespace(namespace).await?;
            }
        }
        Ok(())
    }

    pub async fn clear_all_cache(&self) -> cache::Result<()> {
        self.cache.clear_all().await
    }

    /// Drops a single key.
    pub async fn invalidate(&self, key: &str) -> cache::Result<()> {
        self.cache.invalidate(key).await
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    async fn clear_kind(&self, kind: EntityKind) -> cache::Result<()> {
        self.coordinator
            .invalidate_target(WriteTarget::Entity(kind), &[])
            .await
    }

    async fn cached_count(&self, kind: EntityKind) -> Result<u64> {
        let key = count_key(kind)
            .ok_or_else(|| RepositoryError::invalid(kind.type_name(), "count is not cached"))?;
        self.cache
            .get_or_compute(key, || async {
                self.store.count(kind, &ListFilter::live()).await
            })
            .await
    }

    async fn cached_list<T>(&self) -> Result<Vec<T>>
    where
        T: Record + Serialize + DeserializeOwned,
    {
        let key = all_key(T::KIND)
            .ok_or_else(|| RepositoryError::invalid(T::KIND.type_name(), "listing is not cached"))?;
        self.cache
            .get_or_compute(key, || self.live::<T>())
            .await
    }

    async fn live<T: Record>(&self) -> Result<Vec<T>> {
        let entities = self.store.list(T::KIND, &ListFilter::live()).await?;
        Ok(entities.into_iter().filter_map(Entity::downcast).collect())
    }
}
