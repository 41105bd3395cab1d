use uuid::Uuid;

use crate::registry::EntityKind;

pub const ALL_CITIZENS: &str = "all_citizens";
pub const COUNT_CITIZENS: &str = "count_citizens";
pub const ALL_HOUSEHOLDS: &str = "all_households";
pub const COUNT_HOUSEHOLDS: &str = "count_households";
pub const ALL_BUSINESSES: &str = "all_businesses";
pub const COUNT_BUSINESSES: &str = "count_businesses";
pub const ALL_INFRASTRUCTURES: &str = "all_infrastructures";
pub const COUNT_INFRASTRUCTURES: &str = "count_infrastructures";
pub const ALL_SITIOS: &str = "all_sitios";

/// Namespace for an account's cached role.
pub const USER_ROLES: &str = "user_roles";
/// Namespace for an account's cached permission names.
pub const SYSTEM_PERMISSIONS: &str = "system_permissions";

/// Returns the key of the cached live listing for a kind, if one exists.
pub fn all_key(kind: EntityKind) -> Option<&'static str> {
    match kind {
        EntityKind::Citizen => Some(ALL_CITIZENS),
        EntityKind::Household => Some(ALL_HOUSEHOLDS),
        EntityKind::Business => Some(ALL_BUSINESSES),
        EntityKind::Infrastructure => Some(ALL_INFRASTRUCTURES),
        EntityKind::Sitio => Some(ALL_SITIOS),
        EntityKind::PermissionGrant => None,
    }
}

/// Returns the key of the cached live count for a kind, if one exists.
///
/// Sitios are listed but never counted on the dashboard.
pub fn count_key(kind: EntityKind) -> Option<&'static str> {
    match kind {
        EntityKind::Citizen => Some(COUNT_CITIZENS),
        EntityKind::Household => Some(COUNT_HOUSEHOLDS),
        EntityKind::Business => Some(COUNT_BUSINESSES),
        EntityKind::Infrastructure => Some(COUNT_INFRASTRUCTURES),
        EntityKind::Sitio | EntityKind::PermissionGrant => None,
    }
}

/// Returns the key for per-account data in `namespace`.
pub fn per_account_key(namespace: &str, account_id: Uuid) -> String {
    format!("{}:{}", namespace, account_id)
}

/// Returns the cache key for an account's role.
pub fn user_roles_key(account_id: Uuid) -> String {
    per_account_key(USER_ROLES, account_id)
}

/// Returns the cache key for an account's system permissions.
pub fn system_permissions_key(account_id: Uuid) -> String {
    per_account_key(SYSTEM_PERMISSIONS, account_id)
}

/// Returns the pattern matching every per-subject key in a namespace.
pub fn namespace_pattern(namespace: &str) -> String {
    format!("{}:*", namespace)
}

/// Returns the namespace of a key: everything before the first `:`.
///
/// # Examples
///
/// ```
/// use mapro_core::cache::namespace_of;
///
/// assert_eq!(namespace_of("count_citizens"), "count_citizens");
/// assert_eq!(namespace_of("user_roles:00000000-0000-0000-0000-000000000000"), "user_roles");
/// ```
pub fn namespace_of(key: &str) -> &str {
    key.split_once(':').map_or(key, |(namespace, _)| namespace)
}
