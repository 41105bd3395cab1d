//! SQLite row conversion functions.
//!
//! Pure functions for converting between SQLite rows and domain types.
//! These are testable in isolation without database access.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Row;
use uuid::Uuid;

use mapro_core::registry::{Account, Entity, Role};
use mapro_core::storage::Scope;

/// Column values for one row of `records`, in `INSERT_RECORD` order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordColumns {
    pub kind: String,
    pub id: String,
    pub is_deleted: bool,
    pub delete_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub household_id: Option<String>,
    pub sitio_id: Option<String>,
    pub account_id: Option<String>,
    pub body: String,
}

/// Flattens an entity into its row.
pub fn entity_to_columns(entity: &Entity) -> rusqlite::Result<RecordColumns> {
    let meta = entity.meta();
    let (household_id, sitio_id, account_id) = match entity {
        Entity::Citizen(c) => (c.household_id, None, None),
        Entity::Household(h) => (None, Some(h.sitio_id), None),
        Entity::PermissionGrant(g) => (None, None, Some(g.account_id)),
        Entity::Business(_) | Entity::Infrastructure(_) | Entity::Sitio(_) => (None, None, None),
    };

    Ok(RecordColumns {
        kind: entity.kind().as_str().to_string(),
        id: meta.id.to_string(),
        is_deleted: meta.is_deleted,
        delete_reason: meta.delete_reason.clone(),
        created_at: format_datetime(&meta.created_at),
        updated_at: format_datetime(&meta.updated_at),
        household_id: household_id.map(|id| id.to_string()),
        sitio_id: sitio_id.map(|id| id.to_string()),
        account_id: account_id.map(|id| id.to_string()),
        body: entity_to_json(entity)?,
    })
}

/// Convert a SQLite row to an Entity.
///
/// Expected columns: body
pub fn row_to_entity(row: &Row) -> rusqlite::Result<Entity> {
    let body: String = row.get(0)?;
    serde_json::from_str(&body)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

pub fn entity_to_json(entity: &Entity) -> rusqlite::Result<String> {
    serde_json::to_string(entity).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

/// Convert a SQLite row to an Account.
///
/// Expected columns: id, username, role, created_at, updated_at
pub fn row_to_account(row: &Row) -> rusqlite::Result<Account> {
    let id: String = row.get(0)?;
    let username: String = row.get(1)?;
    let role: String = row.get(2)?;
    let created_at: String = row.get(3)?;
    let updated_at: String = row.get(4)?;

    Ok(Account {
        id: parse_uuid(&id)?,
        username,
        role: parse_role(&role)?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

/// The `is_deleted` parameter for a scope; `None` admits both states.
pub fn scope_to_param(scope: Scope) -> Option<i64> {
    match scope {
        Scope::Live => Some(0),
        Scope::Archived => Some(1),
        Scope::All => None,
    }
}

fn parse_uuid(s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

/// Parse a datetime from RFC 3339 string.
fn parse_datetime(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

fn parse_role(s: &str) -> rusqlite::Result<Role> {
    s.parse::<Role>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))
}

/// Format a DateTime for SQLite storage.
///
/// Fixed nanosecond precision keeps text order equal to time order.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}
