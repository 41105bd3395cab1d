//! Cached entity store decorator.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use mapro_core::cache::{EntityWrite, WriteKind};
use mapro_core::registry::{Entity, EntityKind};
use mapro_core::storage::{EntityStore, ListFilter, Relation, Result};

use crate::cache::InvalidationCoordinator;

/// Entity store decorator that invalidates derived aggregates.
///
/// # Type Parameters
///
/// * `S` - The underlying store implementation
pub struct CachedEntityStore<S>
where
    S: EntityStore,
{
    store: Arc<S>,
    coordinator: InvalidationCoordinator,
}

impl<S> CachedEntityStore<S>
where
    S: EntityStore,
{
    pub fn new(store: Arc<S>, coordinator: InvalidationCoordinator) -> Self {
        Self { store, coordinator }
    }

    /// Runs the invalidations for a committed write.
    ///
    /// The write already happened, so a cache failure is logged instead of
    /// being reported as a failed write. Unrecovered failures are counted in
    /// [`AggregateCache::failed_invalidations`](crate::cache::AggregateCache::failed_invalidations).
    async fn committed(&self, op: EntityWrite, entity: &Entity) {
        let write = WriteKind::entity(entity.kind(), op);
        if let Err(err) = self
            .coordinator
            .on_write(write, &entity.affected_accounts())
            .await
        {
            tracing::error!(
                kind = %entity.kind(),
                entity_id = %entity.id(),
                error = %err,
                "Cache invalidation failed after committed write"
            );
        }
        tracing::debug!(kind = %entity.kind(), entity_id = %entity.id(), ?op, "Record written");
    }
}

#[async_trait]
impl<S> EntityStore for CachedEntityStore<S>
where
    S: EntityStore + 'static,
{
    async fn find(&self, kind: EntityKind, id: Uuid) -> Result<Entity> {
        self.store.find(kind, id).await
    }

    async fn list(&self, kind: EntityKind, filter: &ListFilter) -> Result<Vec<Entity>> {
        self.store.list(kind, filter).await
    }

    async fn count(&self, kind: EntityKind, filter: &ListFilter) -> Result<u64> {
        self.store.count(kind, filter).await
    }

    async fn create(&self, entity: Entity) -> Result<Entity> {
        let created = self.store.create(entity).await?;
        self.committed(EntityWrite::Create, &created).await;
        Ok(created)
    }

    async fn soft_delete(&self, kind: EntityKind, id: Uuid, reason: &str) -> Result<Entity> {
        let deleted = self.store.soft_delete(kind, id, reason).await?;
        self.committed(EntityWrite::SoftDelete, &deleted).await;
        Ok(deleted)
    }

    async fn restore(&self, kind: EntityKind, id: Uuid) -> Result<Entity> {
        let restored = self.store.restore(kind, id).await?;
        self.committed(EntityWrite::Restore, &restored).await;
        Ok(restored)
    }

    async fn find_related(
        &self,
        kind: EntityKind,
        id: Uuid,
        relation: Relation,
    ) -> Result<Vec<Entity>> {
        self.store.find_related(kind, id, relation).await
    }
}
