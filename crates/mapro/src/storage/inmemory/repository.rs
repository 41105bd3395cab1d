//! In-memory store implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use mapro_core::registry::{validate_account, validate_entity, Account, Entity, EntityKind, Role};
use mapro_core::storage::{
    AccountRepository, EntityStore, ListFilter, Relation, RepositoryError, Result,
};

type Records = HashMap<EntityKind, HashMap<Uuid, Entity>>;

/// In-memory storage backend for tests and the default binary.
///
/// All records share one lock so referential checks and the insert they
/// guard happen atomically. Data is lost when the store is dropped.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    records: Arc<RwLock<Records>>,
    accounts: Arc<RwLock<HashMap<Uuid, Account>>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            accounts: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

fn not_found(kind: EntityKind, id: Uuid) -> RepositoryError {
    RepositoryError::not_found(kind.type_name(), id)
}

fn invalid(kind: EntityKind, reason: impl Into<String>) -> RepositoryError {
    RepositoryError::invalid(kind.type_name(), reason)
}

fn is_live(records: &Records, kind: EntityKind, id: Uuid) -> bool {
    records
        .get(&kind)
        .and_then(|by_id| by_id.get(&id))
        .is_some_and(|e| !e.is_deleted())
}

fn sorted(mut entities: Vec<Entity>) -> Vec<Entity> {
    entities.sort_by(|a, b| {
        a.meta()
            .created_at
            .cmp(&b.meta().created_at)
            .then_with(|| a.id().cmp(&b.id()))
    });
    entities
}

fn matching(records: &Records, kind: EntityKind, filter: &ListFilter) -> Vec<Entity> {
    records
        .get(&kind)
        .map(|by_id| {
            by_id
                .values()
                .filter(|e| filter.matches(e))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

/// Referential and uniqueness checks for a record about to become live.
///
/// Used by both `create` and `restore`; the record's own id never counts
/// as a conflicting grant.
fn check_references(records: &Records, accounts: &HashMap<Uuid, Account>, entity: &Entity) -> Result<()> {
    let kind = entity.kind();

    match entity {
        Entity::Citizen(c) => {
            if let Some(household_id) = c.household_id {
                if !is_live(records, EntityKind::Household, household_id) {
                    return Err(invalid(kind, format!("unknown household {}", household_id)));
                }
            }
        }
        Entity::Household(h) => {
            if !is_live(records, EntityKind::Sitio, h.sitio_id) {
                return Err(invalid(kind, format!("unknown sitio {}", h.sitio_id)));
            }
        }
        Entity::Business(b) => {
            if !accounts.contains_key(&b.encoded_by) {
                return Err(invalid(kind, format!("unknown account {}", b.encoded_by)));
            }
        }
        Entity::PermissionGrant(g) => {
            if !accounts.contains_key(&g.account_id) {
                return Err(invalid(kind, format!("unknown account {}", g.account_id)));
            }
            let duplicate = matching(records, kind, &ListFilter::live().with_account(g.account_id))
                .iter()
                .filter_map(|e| match e {
                    Entity::PermissionGrant(existing) => Some(existing),
                    _ => None,
                })
                .any(|existing| {
                    existing.meta.id != g.meta.id && existing.permission == g.permission
                });
            if duplicate {
                return Err(invalid(
                    kind,
                    format!("{} already granted to {}", g.permission, g.account_id),
                ));
            }
        }
        Entity::Infrastructure(_) | Entity::Sitio(_) => {}
    }

    Ok(())
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn find(&self, kind: EntityKind, id: Uuid) -> Result<Entity> {
        let records = self.records.read().await;
        records
            .get(&kind)
            .and_then(|by_id| by_id.get(&id))
            .cloned()
            .ok_or_else(|| not_found(kind, id))
    }

    async fn list(&self, kind: EntityKind, filter: &ListFilter) -> Result<Vec<Entity>> {
        let records = self.records.read().await;
        Ok(sorted(matching(&records, kind, filter)))
    }

    async fn count(&self, kind: EntityKind, filter: &ListFilter) -> Result<u64> {
        let records = self.records.read().await;
        let count = records
            .get(&kind)
            .map(|by_id| by_id.values().filter(|e| filter.matches(e)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn create(&self, mut entity: Entity) -> Result<Entity> {
        let kind = entity.kind();
        validate_entity(&entity).map_err(|e| RepositoryError::validation(kind.type_name(), e))?;

        let mut records = self.records.write().await;
        let accounts = self.accounts.read().await;

        if records
            .get(&kind)
            .is_some_and(|by_id| by_id.contains_key(&entity.id()))
        {
            return Err(invalid(kind, format!("duplicate id {}", entity.id())));
        }
        check_references(&records, &accounts, &entity)?;

        let now = Utc::now();
        let meta = entity.meta_mut();
        meta.created_at = now;
        meta.updated_at = now;
        meta.is_deleted = false;
        meta.delete_reason = None;

        records
            .entry(kind)
            .or_default()
            .insert(entity.id(), entity.clone());
        Ok(entity)
    }

    async fn soft_delete(&self, kind: EntityKind, id: Uuid, reason: &str) -> Result<Entity> {
        if reason.trim().is_empty() {
            return Err(invalid(kind, "delete reason cannot be empty"));
        }

        let mut records = self.records.write().await;
        let entity = records
            .get_mut(&kind)
            .and_then(|by_id| by_id.get_mut(&id))
            .filter(|e| !e.is_deleted())
            .ok_or_else(|| not_found(kind, id))?;

        entity.meta_mut().mark_deleted(reason, Utc::now());
        Ok(entity.clone())
    }

    async fn restore(&self, kind: EntityKind, id: Uuid) -> Result<Entity> {
        let mut records = self.records.write().await;
        let accounts = self.accounts.read().await;
        let mut entity = records
            .get(&kind)
            .and_then(|by_id| by_id.get(&id))
            .cloned()
            .ok_or_else(|| not_found(kind, id))?;

        if !entity.is_deleted() {
            return Err(RepositoryError::InvalidState {
                entity_type: kind.type_name(),
                id: id.to_string(),
                reason: "record is not deleted".to_string(),
            });
        }
        check_references(&records, &accounts, &entity)?;

        entity.meta_mut().mark_restored(Utc::now());
        records
            .entry(kind)
            .or_default()
            .insert(id, entity.clone());
        Ok(entity)
    }

    async fn find_related(
        &self,
        kind: EntityKind,
        id: Uuid,
        relation: Relation,
    ) -> Result<Vec<Entity>> {
        let records = self.records.read().await;
        let get = |kind: EntityKind, id: Uuid| {
            records
                .get(&kind)
                .and_then(|by_id| by_id.get(&id))
                .cloned()
                .ok_or_else(|| not_found(kind, id))
        };

        match (relation, kind) {
            (Relation::Household, EntityKind::Citizen) => {
                let Entity::Citizen(citizen) = get(kind, id)? else {
                    return Err(not_found(kind, id));
                };
                Ok(citizen
                    .household_id
                    .and_then(|household_id| get(EntityKind::Household, household_id).ok())
                    .into_iter()
                    .collect())
            }
            (Relation::Sitio, EntityKind::Household) => {
                let Entity::Household(household) = get(kind, id)? else {
                    return Err(not_found(kind, id));
                };
                Ok(get(EntityKind::Sitio, household.sitio_id)
                    .ok()
                    .into_iter()
                    .collect())
            }
            (Relation::Members, EntityKind::Household) => {
                get(kind, id)?;
                let filter = ListFilter::live().with_household(id);
                Ok(sorted(matching(&records, EntityKind::Citizen, &filter)))
            }
            (Relation::Grants, _) => {
                let filter = ListFilter::live().with_account(id);
                Ok(sorted(matching(
                    &records,
                    EntityKind::PermissionGrant,
                    &filter,
                )))
            }
            (relation, kind) => Err(invalid(
                kind,
                format!("{:?} is not a relation of {}", relation, kind),
            )),
        }
    }
}

#[async_trait]
impl AccountRepository for InMemoryStore {
    async fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(&id).cloned())
    }

    async fn create_account(&self, account: &Account) -> Result<()> {
        validate_account(account).map_err(|e| RepositoryError::validation("Account", e))?;

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.id) {
            return Err(RepositoryError::invalid(
                "Account",
                format!("duplicate id {}", account.id),
            ));
        }
        if accounts.values().any(|a| a.username == account.username) {
            return Err(RepositoryError::invalid(
                "Account",
                format!("username already taken: {}", account.username),
            ));
        }
        accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Account> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::not_found("Account", id))?;

        account.role = role;
        account.updated_at = account.updated_at.max(Utc::now());
        Ok(account.clone())
    }
}
