use async_trait::async_trait;
use uuid::Uuid;

use crate::registry::{Account, Entity, EntityKind, Role};

use super::{ListFilter, Relation, Result};

/// Durable storage for soft-deletable registry records.
///
/// Mutating methods are the only way persisted state changes. Wrap an
/// implementation in the cached decorator so every committed write also
/// invalidates the aggregates derived from it.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Gets a record by ID regardless of its deletion state.
    async fn find(&self, kind: EntityKind, id: Uuid) -> Result<Entity>;

    /// Lists records of a kind, ordered by `created_at` then ID.
    async fn list(&self, kind: EntityKind, filter: &ListFilter) -> Result<Vec<Entity>>;

    /// Counts records of a kind.
    async fn count(&self, kind: EntityKind, filter: &ListFilter) -> Result<u64>;

    /// Stores a new live record and returns it as persisted.
    async fn create(&self, entity: Entity) -> Result<Entity>;

    /// Archives a live record.
    async fn soft_delete(&self, kind: EntityKind, id: Uuid, reason: &str) -> Result<Entity>;

    /// Brings an archived record back.
    async fn restore(&self, kind: EntityKind, id: Uuid) -> Result<Entity>;

    /// Loads records related to `id` through `relation`.
    async fn find_related(
        &self,
        kind: EntityKind,
        id: Uuid,
        relation: Relation,
    ) -> Result<Vec<Entity>>;
}

/// Repository for staff accounts and their roles.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Gets an account by ID.
    async fn get_account(&self, id: Uuid) -> Result<Option<Account>>;

    /// Creates a new account. Duplicate IDs or usernames are rejected.
    async fn create_account(&self, account: &Account) -> Result<()>;

    /// Changes an account's role.
    async fn set_role(&self, id: Uuid, role: Role) -> Result<Account>;
}
