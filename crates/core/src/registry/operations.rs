use std::collections::BTreeSet;

use super::error::RegistryError;
use super::types::{Account, Citizen, Entity, PermissionGrant, PermissionName};

/// Number of citizens shown in the dashboard's "latest" panel.
pub const DEFAULT_LATEST_LIMIT: usize = 5;

const MAX_NAME_LEN: usize = 120;

/// Validates the fields of a record before it is created.
///
/// Referential checks (does the household exist?) belong to the store; this
/// only looks at the record itself.
pub fn validate_entity(entity: &Entity) -> Result<(), RegistryError> {
    match entity {
        Entity::Citizen(c) => {
            require_name("first_name", &c.first_name)?;
            require_name("last_name", &c.last_name)
        }
        Entity::Household(h) => require_name("household_number", &h.household_number),
        Entity::Business(b) => {
            require_name("name", &b.name)?;
            require_name("owner_name", &b.owner_name)
        }
        Entity::Infrastructure(i) => {
            require_name("name", &i.name)?;
            require_name("category", &i.category)
        }
        Entity::Sitio(s) => require_name("name", &s.name),
        // PermissionName is validated at construction.
        Entity::PermissionGrant(_) => Ok(()),
    }
}

/// Validates an account before creation.
pub fn validate_account(account: &Account) -> Result<(), RegistryError> {
    require_name("username", &account.username)
}

fn require_name(field: &'static str, value: &str) -> Result<(), RegistryError> {
    if value.trim().is_empty() {
        return Err(RegistryError::EmptyField(field));
    }
    if value.chars().count() > MAX_NAME_LEN {
        return Err(RegistryError::FieldTooLong {
            field,
            max: MAX_NAME_LEN,
        });
    }
    Ok(())
}

/// Orders live citizens newest-encoded first and keeps at most `limit`.
///
/// Ties on `date_encoded` fall back to `created_at` (newest first) and then
/// to the ID so the order is deterministic. Archived citizens are dropped.
pub fn latest_citizens(citizens: Vec<Citizen>, limit: usize) -> Vec<Citizen> {
    let mut live: Vec<Citizen> = citizens.into_iter().filter(|c| !c.meta.is_deleted).collect();
    live.sort_by(|a, b| {
        b.date_encoded
            .cmp(&a.date_encoded)
            .then_with(|| b.meta.created_at.cmp(&a.meta.created_at))
            .then_with(|| a.meta.id.cmp(&b.meta.id))
    });
    live.truncate(limit);
    live
}

/// Collects the distinct permission names of live grants, sorted.
pub fn sorted_permissions<'a>(
    grants: impl IntoIterator<Item = &'a PermissionGrant>,
) -> Vec<PermissionName> {
    grants
        .into_iter()
        .filter(|g| !g.meta.is_deleted)
        .map(|g| g.permission.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
