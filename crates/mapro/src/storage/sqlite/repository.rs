//! SQLite store implementation.
//!
//! Implements the store traits from `mapro_core::storage` using SQLite.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tokio_rusqlite::Connection;
use uuid::Uuid;

use mapro_core::registry::{validate_account, validate_entity, Account, Entity, EntityKind, Role};
use mapro_core::storage::{
    AccountRepository, EntityStore, ListFilter, Relation, RepositoryError, Result,
};

use super::conversions::{
    entity_to_columns, entity_to_json, format_datetime, row_to_account, row_to_entity,
    scope_to_param,
};
use super::error::{map_tokio_rusqlite_error, reject};
use super::schema;

/// Helper to wrap rusqlite errors for tokio_rusqlite closures.
fn wrap_err(e: rusqlite::Error) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Rusqlite(e)
}

/// SQLite-based store implementation.
///
/// Provides async access to SQLite storage for every record kind and for
/// accounts. Each write runs in its own transaction.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Creates a new store with a file-based database.
    ///
    /// The database file will be created if it doesn't exist.
    /// Schema tables are created automatically.
    pub async fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| RepositoryError::StoreUnavailable(e.to_string()))?;

        Self::init_schema(&conn).await?;

        Ok(Self { conn })
    }

    /// Creates a new store with an in-memory database.
    ///
    /// Useful for testing - data is lost when the connection is dropped.
    pub async fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| RepositoryError::StoreUnavailable(e.to_string()))?;

        Self::init_schema(&conn).await?;

        Ok(Self { conn })
    }

    /// Initialize the database schema.
    async fn init_schema(conn: &Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(schema::CREATE_TABLES)
                .map_err(wrap_err)?;
            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::QueryFailed(e.to_string()))
    }
}

// ============================================================================
// Synchronous helpers, run inside `Connection::call`
// ============================================================================

fn load(conn: &rusqlite::Connection, kind: EntityKind, id: Uuid) -> rusqlite::Result<Option<Entity>> {
    conn.query_row(
        schema::SELECT_RECORD,
        params![kind.as_str(), id.to_string()],
        row_to_entity,
    )
    .optional()
}

fn is_live(conn: &rusqlite::Connection, kind: EntityKind, id: Uuid) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        schema::COUNT_LIVE_RECORD,
        params![kind.as_str(), id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn load_account(conn: &rusqlite::Connection, id: Uuid) -> rusqlite::Result<Option<Account>> {
    conn.query_row(
        schema::SELECT_ACCOUNT_BY_ID,
        [id.to_string()],
        row_to_account,
    )
    .optional()
}

fn query_records(
    conn: &rusqlite::Connection,
    kind: EntityKind,
    filter: &ListFilter,
) -> rusqlite::Result<Vec<Entity>> {
    let mut stmt = conn.prepare(schema::SELECT_RECORDS)?;
    let rows = stmt.query_map(
        params![
            kind.as_str(),
            scope_to_param(filter.scope),
            filter.household_id.map(|id| id.to_string()),
            filter.sitio_id.map(|id| id.to_string()),
            filter.account_id.map(|id| id.to_string()),
        ],
        row_to_entity,
    )?;

    let mut entities = Vec::new();
    for row_result in rows {
        entities.push(row_result?);
    }
    Ok(entities)
}

fn insert_record(conn: &rusqlite::Connection, entity: &Entity) -> rusqlite::Result<()> {
    let c = entity_to_columns(entity)?;
    conn.execute(
        schema::INSERT_RECORD,
        params![
            c.kind,
            c.id,
            c.is_deleted,
            c.delete_reason,
            c.created_at,
            c.updated_at,
            c.household_id,
            c.sitio_id,
            c.account_id,
            c.body,
        ],
    )?;
    Ok(())
}

fn update_state(conn: &rusqlite::Connection, entity: &Entity) -> rusqlite::Result<()> {
    let meta = entity.meta();
    conn.execute(
        schema::UPDATE_RECORD_STATE,
        params![
            entity.kind().as_str(),
            meta.id.to_string(),
            meta.is_deleted,
            meta.delete_reason,
            format_datetime(&meta.updated_at),
            entity_to_json(entity)?,
        ],
    )?;
    Ok(())
}

/// Referential and uniqueness checks for a record about to become live.
///
/// Shared by `create` and `restore`; a grant never conflicts with itself.
fn check_references(conn: &rusqlite::Connection, entity: &Entity) -> tokio_rusqlite::Result<()> {
    let kind = entity.kind();
    let invalid = |reason: String| reject(RepositoryError::invalid(kind.type_name(), reason));

    match entity {
        Entity::Citizen(c) => {
            if let Some(household_id) = c.household_id {
                if !is_live(conn, EntityKind::Household, household_id).map_err(wrap_err)? {
                    return Err(invalid(format!("unknown household {}", household_id)));
                }
            }
        }
        Entity::Household(h) => {
            if !is_live(conn, EntityKind::Sitio, h.sitio_id).map_err(wrap_err)? {
                return Err(invalid(format!("unknown sitio {}", h.sitio_id)));
            }
        }
        Entity::Business(b) => {
            if load_account(conn, b.encoded_by).map_err(wrap_err)?.is_none() {
                return Err(invalid(format!("unknown account {}", b.encoded_by)));
            }
        }
        Entity::PermissionGrant(g) => {
            if load_account(conn, g.account_id).map_err(wrap_err)?.is_none() {
                return Err(invalid(format!("unknown account {}", g.account_id)));
            }
            let filter = ListFilter::live().with_account(g.account_id);
            let duplicate = query_records(conn, kind, &filter)
                .map_err(wrap_err)?
                .into_iter()
                .any(|e| {
                    matches!(e, Entity::PermissionGrant(existing)
                        if existing.meta.id != g.meta.id && existing.permission == g.permission)
                });
            if duplicate {
                return Err(invalid(format!(
                    "{} already granted to {}",
                    g.permission, g.account_id
                )));
            }
        }
        Entity::Infrastructure(_) | Entity::Sitio(_) => {}
    }

    Ok(())
}

// ============================================================================
// EntityStore implementation
// ============================================================================

#[async_trait]
impl EntityStore for SqliteStore {
    async fn find(&self, kind: EntityKind, id: Uuid) -> Result<Entity> {
        self.conn
            .call(move |conn| {
                load(conn, kind, id)
                    .map_err(wrap_err)?
                    .ok_or_else(|| reject(RepositoryError::not_found(kind.type_name(), id)))
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error(e, kind.type_name(), id.to_string()))
    }

    async fn list(&self, kind: EntityKind, filter: &ListFilter) -> Result<Vec<Entity>> {
        let filter = filter.clone();
        self.conn
            .call(move |conn| query_records(conn, kind, &filter).map_err(wrap_err))
            .await
            .map_err(|e| map_tokio_rusqlite_error(e, kind.type_name(), ""))
    }

    async fn count(&self, kind: EntityKind, filter: &ListFilter) -> Result<u64> {
        let filter = filter.clone();
        self.conn
            .call(move |conn| {
                let count: i64 = conn
                    .query_row(
                        schema::COUNT_RECORDS,
                        params![
                            kind.as_str(),
                            scope_to_param(filter.scope),
                            filter.household_id.map(|id| id.to_string()),
                            filter.sitio_id.map(|id| id.to_string()),
                            filter.account_id.map(|id| id.to_string()),
                        ],
                        |row| row.get(0),
                    )
                    .map_err(wrap_err)?;
                Ok(count.max(0) as u64)
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error(e, kind.type_name(), ""))
    }

    async fn create(&self, mut entity: Entity) -> Result<Entity> {
        let kind = entity.kind();
        let id = entity.id();
        validate_entity(&entity).map_err(|e| RepositoryError::validation(kind.type_name(), e))?;

        let now = Utc::now();
        let meta = entity.meta_mut();
        meta.created_at = now;
        meta.updated_at = now;
        meta.is_deleted = false;
        meta.delete_reason = None;

        self.conn
            .call(move |conn| {
                let tx = conn.transaction().map_err(wrap_err)?;

                if load(&tx, kind, id).map_err(wrap_err)?.is_some() {
                    return Err(reject(RepositoryError::invalid(
                        kind.type_name(),
                        format!("duplicate id {}", id),
                    )));
                }
                check_references(&tx, &entity)?;
                insert_record(&tx, &entity).map_err(wrap_err)?;

                tx.commit().map_err(wrap_err)?;
                Ok(entity)
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error(e, kind.type_name(), id.to_string()))
    }

    async fn soft_delete(&self, kind: EntityKind, id: Uuid, reason: &str) -> Result<Entity> {
        if reason.trim().is_empty() {
            return Err(RepositoryError::invalid(
                kind.type_name(),
                "delete reason cannot be empty",
            ));
        }
        let reason = reason.to_string();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction().map_err(wrap_err)?;

                let mut entity = load(&tx, kind, id)
                    .map_err(wrap_err)?
                    .filter(|e| !e.is_deleted())
                    .ok_or_else(|| reject(RepositoryError::not_found(kind.type_name(), id)))?;
                entity.meta_mut().mark_deleted(reason, Utc::now());
                update_state(&tx, &entity).map_err(wrap_err)?;

                tx.commit().map_err(wrap_err)?;
                Ok(entity)
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error(e, kind.type_name(), id.to_string()))
    }

    async fn restore(&self, kind: EntityKind, id: Uuid) -> Result<Entity> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction().map_err(wrap_err)?;

                let mut entity = load(&tx, kind, id)
                    .map_err(wrap_err)?
                    .ok_or_else(|| reject(RepositoryError::not_found(kind.type_name(), id)))?;
                if !entity.is_deleted() {
                    return Err(reject(RepositoryError::InvalidState {
                        entity_type: kind.type_name(),
                        id: id.to_string(),
                        reason: "record is not deleted".to_string(),
                    }));
                }
                check_references(&tx, &entity)?;
                entity.meta_mut().mark_restored(Utc::now());
                update_state(&tx, &entity).map_err(wrap_err)?;

                tx.commit().map_err(wrap_err)?;
                Ok(entity)
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error(e, kind.type_name(), id.to_string()))
    }

    async fn find_related(
        &self,
        kind: EntityKind,
        id: Uuid,
        relation: Relation,
    ) -> Result<Vec<Entity>> {
        self.conn
            .call(move |conn| {
                let get = |kind: EntityKind, id: Uuid| -> tokio_rusqlite::Result<Entity> {
                    load(conn, kind, id)
                        .map_err(wrap_err)?
                        .ok_or_else(|| reject(RepositoryError::not_found(kind.type_name(), id)))
                };

                match (relation, kind) {
                    (Relation::Household, EntityKind::Citizen) => {
                        let household_id = match get(kind, id)? {
                            Entity::Citizen(c) => c.household_id,
                            _ => None,
                        };
                        let household = match household_id {
                            Some(household_id) => load(conn, EntityKind::Household, household_id)
                                .map_err(wrap_err)?,
                            None => None,
                        };
                        Ok(household.into_iter().collect())
                    }
                    (Relation::Sitio, EntityKind::Household) => {
                        let sitio = match get(kind, id)? {
                            Entity::Household(h) => {
                                load(conn, EntityKind::Sitio, h.sitio_id).map_err(wrap_err)?
                            }
                            _ => None,
                        };
                        Ok(sitio.into_iter().collect())
                    }
                    (Relation::Members, EntityKind::Household) => {
                        get(kind, id)?;
                        let filter = ListFilter::live().with_household(id);
                        query_records(conn, EntityKind::Citizen, &filter).map_err(wrap_err)
                    }
                    (Relation::Grants, _) => {
                        let filter = ListFilter::live().with_account(id);
                        query_records(conn, EntityKind::PermissionGrant, &filter).map_err(wrap_err)
                    }
                    (relation, kind) => Err(reject(RepositoryError::invalid(
                        kind.type_name(),
                        format!("{:?} is not a relation of {}", relation, kind),
                    ))),
                }
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error(e, kind.type_name(), id.to_string()))
    }
}

// ============================================================================
// AccountRepository implementation
// ============================================================================

#[async_trait]
impl AccountRepository for SqliteStore {
    async fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
        self.conn
            .call(move |conn| load_account(conn, id).map_err(wrap_err))
            .await
            .map_err(|e| map_tokio_rusqlite_error(e, "Account", id.to_string()))
    }

    async fn create_account(&self, account: &Account) -> Result<()> {
        validate_account(account).map_err(|e| RepositoryError::validation("Account", e))?;

        let id = account.id.to_string();
        let username = account.username.clone();
        let role = account.role.as_str();
        let created_at = format_datetime(&account.created_at);
        let updated_at = format_datetime(&account.updated_at);
        let label = format!("account {} ({})", account.id, account.username);

        self.conn
            .call(move |conn| {
                conn.execute(
                    schema::INSERT_ACCOUNT,
                    params![id, username, role, created_at, updated_at],
                )
                .map_err(wrap_err)?;
                Ok(())
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error(e, "Account", label))
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Account> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction().map_err(wrap_err)?;

                let Some(mut account) = load_account(&tx, id).map_err(wrap_err)? else {
                    return Err(reject(RepositoryError::not_found("Account", id)));
                };
                account.role = role;
                account.updated_at = account.updated_at.max(Utc::now());
                tx.execute(
                    schema::UPDATE_ACCOUNT_ROLE,
                    params![
                        id.to_string(),
                        role.as_str(),
                        format_datetime(&account.updated_at)
                    ],
                )
                .map_err(wrap_err)?;

                tx.commit().map_err(wrap_err)?;
                Ok(account)
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error(e, "Account", id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapro_core::registry::{
        Business, Citizen, Household, PermissionGrant, PermissionName, Sitio,
    };

    #[tokio::test]
    async fn test_create_and_find() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let citizen = Citizen::new("Maria", "Santos");
        let id = citizen.meta.id;

        let created = store.create(citizen.into()).await.unwrap();
        let found = store.find(EntityKind::Citizen, id).await.unwrap();

        assert_eq!(created, found);
    }

    #[tokio::test]
    async fn test_find_missing_is_not_found() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let id = Uuid::new_v4();

        let result = store.find(EntityKind::Household, id).await;

        assert_eq!(
            result,
            Err(RepositoryError::not_found("Household", id))
        );
    }

    #[tokio::test]
    async fn test_duplicate_id_is_validation_error() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let sitio = Sitio::new("Centro");

        store.create(sitio.clone().into()).await.unwrap();
        let result = store.create(sitio.into()).await;

        assert!(matches!(result, Err(RepositoryError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_household_requires_live_sitio() {
        let store = SqliteStore::new_in_memory().await.unwrap();

        let result = store
            .create(Household::new("H-1", Uuid::new_v4()).into())
            .await;

        assert!(matches!(result, Err(RepositoryError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_soft_delete_restore_and_filters() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let sitio = Sitio::new("Ilaya");
        store.create(sitio.clone().into()).await.unwrap();
        let household = Household::new("H-9", sitio.meta.id);
        store.create(household.clone().into()).await.unwrap();
        let a = Citizen::new("Ana", "Cruz").with_household(household.meta.id);
        let b = Citizen::new("Ben", "Cruz").with_household(household.meta.id);
        store.create(a.clone().into()).await.unwrap();
        store.create(b.clone().into()).await.unwrap();

        let deleted = store
            .soft_delete(EntityKind::Citizen, b.meta.id, "relocated")
            .await
            .unwrap();
        assert_eq!(deleted.meta().delete_reason.as_deref(), Some("relocated"));

        assert_eq!(
            store.count(EntityKind::Citizen, &ListFilter::live()).await.unwrap(),
            1
        );
        assert_eq!(
            store
                .count(EntityKind::Citizen, &ListFilter::archived())
                .await
                .unwrap(),
            1
        );
        let members = store
            .find_related(EntityKind::Household, household.meta.id, Relation::Members)
            .await
            .unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id(), a.meta.id);

        assert!(matches!(
            store.soft_delete(EntityKind::Citizen, b.meta.id, "again").await,
            Err(RepositoryError::NotFound { .. })
        ));

        let restored = store.restore(EntityKind::Citizen, b.meta.id).await.unwrap();
        assert!(!restored.is_deleted());
        assert!(matches!(
            store.restore(EntityKind::Citizen, b.meta.id).await,
            Err(RepositoryError::InvalidState { .. })
        ));
        assert_eq!(
            store.count(EntityKind::Citizen, &ListFilter::live()).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_creation() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let mut ids = Vec::new();
        for name in ["Uno", "Dos", "Tres"] {
            let sitio = Sitio::new(name);
            ids.push(sitio.meta.id);
            store.create(sitio.into()).await.unwrap();
        }

        let listed: Vec<Uuid> = store
            .list(EntityKind::Sitio, &ListFilter::live())
            .await
            .unwrap()
            .iter()
            .map(Entity::id)
            .collect();

        assert_eq!(listed, ids);
    }

    #[tokio::test]
    async fn test_accounts_and_grants() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let account = Account::new("encoder1", Role::Encoder);
        store.create_account(&account).await.unwrap();

        assert!(matches!(
            store
                .create_account(&Account::new("encoder1", Role::Viewer))
                .await,
            Err(RepositoryError::Validation { .. })
        ));

        let view = PermissionName::parse("citizens.view").unwrap();
        store
            .create(PermissionGrant::new(account.id, view.clone()).into())
            .await
            .unwrap();
        assert!(store
            .create(PermissionGrant::new(account.id, view).into())
            .await
            .is_err());

        store
            .create(Business::new("Bakery", "Lorna", account.id).into())
            .await
            .unwrap();

        let updated = store.set_role(account.id, Role::Admin).await.unwrap();
        assert_eq!(updated.role, Role::Admin);
        assert_eq!(
            store.get_account(account.id).await.unwrap().unwrap().role,
            Role::Admin
        );
        assert!(matches!(
            store.set_role(Uuid::new_v4(), Role::Viewer).await,
            Err(RepositoryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_restore_rejects_grant_already_replaced() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let account = Account::new("encoder2", Role::Encoder);
        store.create_account(&account).await.unwrap();
        let edit = PermissionName::parse("citizens.edit").unwrap();

        let first = PermissionGrant::new(account.id, edit.clone());
        store.create(first.clone().into()).await.unwrap();
        store
            .soft_delete(EntityKind::PermissionGrant, first.meta.id, "revoked")
            .await
            .unwrap();
        store
            .create(PermissionGrant::new(account.id, edit).into())
            .await
            .unwrap();

        assert!(matches!(
            store
                .restore(EntityKind::PermissionGrant, first.meta.id)
                .await,
            Err(RepositoryError::Validation { .. })
        ));
        let live = store
            .count(
                EntityKind::PermissionGrant,
                &ListFilter::live().with_account(account.id),
            )
            .await
            .unwrap();
        assert_eq!(live, 1);
        assert!(store
            .find(EntityKind::PermissionGrant, first.meta.id)
            .await
            .unwrap()
            .is_deleted());
    }

    #[tokio::test]
    async fn test_restore_requires_live_parent() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let sitio = Sitio::new("Centro");
        store.create(sitio.clone().into()).await.unwrap();
        let household = Household::new("H-2", sitio.meta.id);
        store.create(household.clone().into()).await.unwrap();
        let citizen = Citizen::new("Rosa", "Cruz").with_household(household.meta.id);
        store.create(citizen.clone().into()).await.unwrap();

        store
            .soft_delete(EntityKind::Citizen, citizen.meta.id, "moved")
            .await
            .unwrap();
        store
            .soft_delete(EntityKind::Household, household.meta.id, "merged")
            .await
            .unwrap();

        assert!(matches!(
            store.restore(EntityKind::Citizen, citizen.meta.id).await,
            Err(RepositoryError::Validation { .. })
        ));
        assert!(store
            .find(EntityKind::Citizen, citizen.meta.id)
            .await
            .unwrap()
            .is_deleted());

        store
            .restore(EntityKind::Household, household.meta.id)
            .await
            .unwrap();
        let restored = store
            .restore(EntityKind::Citizen, citizen.meta.id)
            .await
            .unwrap();
        assert!(!restored.is_deleted());
    }
}
