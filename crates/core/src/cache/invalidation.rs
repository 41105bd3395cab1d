//! The declarative map from writes to the cache keys they make stale.
//!
//! Every write site consults [`affected_keys`]; no call site lists keys by
//! hand.

use uuid::Uuid;

use crate::registry::EntityKind;

use super::keys::{
    per_account_key, ALL_BUSINESSES, ALL_CITIZENS, ALL_HOUSEHOLDS, ALL_INFRASTRUCTURES,
    ALL_SITIOS, COUNT_BUSINESSES, COUNT_CITIZENS, COUNT_HOUSEHOLDS, COUNT_INFRASTRUCTURES,
    SYSTEM_PERMISSIONS, USER_ROLES,
};

/// A cache key, or a family of per-account keys, named by the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTemplate {
    /// A single fixed key.
    Static(&'static str),
    /// `<namespace>:<account_id>` for every affected account.
    PerAccount(&'static str),
}

impl KeyTemplate {
    /// Expands the template into concrete keys.
    pub fn render(&self, account_ids: &[Uuid]) -> Vec<String> {
        match self {
            KeyTemplate::Static(key) => vec![(*key).to_string()],
            KeyTemplate::PerAccount(namespace) => account_ids
                .iter()
                .map(|id| per_account_key(namespace, *id))
                .collect(),
        }
    }
}

/// What a write touched, for invalidation purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteTarget {
    /// A registry kind whose aggregates are cached globally.
    Entity(EntityKind),
    /// An account's role or permission set.
    Access,
}

/// The kind of entity write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityWrite {
    Create,
    SoftDelete,
    Restore,
}

/// A committed write, as seen by the invalidation coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Entity { kind: EntityKind, op: EntityWrite },
    /// Account creation or role change.
    AccountChange,
}

impl WriteKind {
    pub fn entity(kind: EntityKind, op: EntityWrite) -> Self {
        WriteKind::Entity { kind, op }
    }

    /// Returns the table row this write belongs to.
    ///
    /// Permission grants are access data, so their writes land on the
    /// per-account row rather than an entity row.
    pub fn target(&self) -> WriteTarget {
        match self {
            WriteKind::Entity {
                kind: EntityKind::PermissionGrant,
                ..
            }
            | WriteKind::AccountChange => WriteTarget::Access,
            WriteKind::Entity { kind, .. } => WriteTarget::Entity(*kind),
        }
    }
}

/// Write target -> keys to invalidate.
pub const INVALIDATION_TABLE: &[(WriteTarget, &[KeyTemplate])] = &[
    (
        WriteTarget::Entity(EntityKind::Citizen),
        &[
            KeyTemplate::Static(ALL_CITIZENS),
            KeyTemplate::Static(COUNT_CITIZENS),
        ],
    ),
    (
        WriteTarget::Entity(EntityKind::Household),
        &[
            KeyTemplate::Static(ALL_HOUSEHOLDS),
            KeyTemplate::Static(COUNT_HOUSEHOLDS),
        ],
    ),
    (
        WriteTarget::Entity(EntityKind::Business),
        &[
            KeyTemplate::Static(ALL_BUSINESSES),
            KeyTemplate::Static(COUNT_BUSINESSES),
        ],
    ),
    (
        WriteTarget::Entity(EntityKind::Infrastructure),
        &[
            KeyTemplate::Static(ALL_INFRASTRUCTURES),
            KeyTemplate::Static(COUNT_INFRASTRUCTURES),
        ],
    ),
    (
        WriteTarget::Entity(EntityKind::Sitio),
        &[KeyTemplate::Static(ALL_SITIOS)],
    ),
    (
        WriteTarget::Access,
        &[
            KeyTemplate::PerAccount(USER_ROLES),
            KeyTemplate::PerAccount(SYSTEM_PERMISSIONS),
        ],
    ),
];

/// Returns the templates for a target; empty if the table has no row.
pub fn templates_for(target: WriteTarget) -> &'static [KeyTemplate] {
    INVALIDATION_TABLE
        .iter()
        .find(|(row, _)| *row == target)
        .map(|(_, templates)| *templates)
        .unwrap_or(&[])
}

/// Resolves the concrete keys a write invalidates.
///
/// `account_ids` feeds per-account templates and is ignored by static ones.
/// The result has no duplicates and keeps table order.
///
/// # Examples
///
/// ```
/// use mapro_core::cache::{affected_keys, EntityWrite, WriteKind};
/// use mapro_core::registry::EntityKind;
///
/// let keys = affected_keys(WriteKind::entity(EntityKind::Citizen, EntityWrite::Create), &[]);
/// assert_eq!(keys, vec!["all_citizens", "count_citizens"]);
/// ```
pub fn affected_keys(write: WriteKind, account_ids: &[Uuid]) -> Vec<String> {
    target_keys(write.target(), account_ids)
}

/// Resolves the concrete keys of a table row.
pub fn target_keys(target: WriteTarget, account_ids: &[Uuid]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for template in templates_for(target) {
        for key in template.render(account_ids) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys::{all_key, count_key, system_permissions_key, user_roles_key};

    #[test]
    fn test_every_kind_has_a_row() {
        for kind in EntityKind::ALL {
            for op in [EntityWrite::Create, EntityWrite::SoftDelete, EntityWrite::Restore] {
                let target = WriteKind::entity(kind, op).target();
                assert!(
                    !templates_for(target).is_empty(),
                    "no invalidation row for {kind}"
                );
            }
        }
        assert!(!templates_for(WriteTarget::Access).is_empty());
    }

    #[test]
    fn test_every_served_key_is_invalidated_by_its_kind() {
        for kind in EntityKind::ALL {
            let keys = affected_keys(WriteKind::entity(kind, EntityWrite::Create), &[]);
            for served in [all_key(kind), count_key(kind)].into_iter().flatten() {
                assert!(
                    keys.iter().any(|k| k == served),
                    "{served} is not invalidated by {kind} writes"
                );
            }
        }
    }

    #[test]
    fn test_table_has_no_duplicate_rows() {
        for (i, (a, _)) in INVALIDATION_TABLE.iter().enumerate() {
            for (b, _) in &INVALIDATION_TABLE[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_entity_rows() {
        let cases = [
            (EntityKind::Citizen, vec![ALL_CITIZENS, COUNT_CITIZENS]),
            (EntityKind::Household, vec![ALL_HOUSEHOLDS, COUNT_HOUSEHOLDS]),
            (EntityKind::Business, vec![ALL_BUSINESSES, COUNT_BUSINESSES]),
            (
                EntityKind::Infrastructure,
                vec![ALL_INFRASTRUCTURES, COUNT_INFRASTRUCTURES],
            ),
            (EntityKind::Sitio, vec![ALL_SITIOS]),
        ];

        for (kind, expected) in cases {
            let keys = affected_keys(WriteKind::entity(kind, EntityWrite::SoftDelete), &[]);
            assert_eq!(keys, expected, "wrong keys for {kind}");
        }
    }

    #[test]
    fn test_op_does_not_change_keys() {
        let create = affected_keys(WriteKind::entity(EntityKind::Business, EntityWrite::Create), &[]);
        let restore =
            affected_keys(WriteKind::entity(EntityKind::Business, EntityWrite::Restore), &[]);
        assert_eq!(create, restore);
    }

    #[test]
    fn test_account_change_expands_per_account() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let keys = affected_keys(WriteKind::AccountChange, &[a, b]);

        assert_eq!(
            keys,
            vec![
                user_roles_key(a),
                user_roles_key(b),
                system_permissions_key(a),
                system_permissions_key(b),
            ]
        );
    }

    #[test]
    fn test_permission_grant_write_is_access_change() {
        let account = Uuid::new_v4();
        let write = WriteKind::entity(EntityKind::PermissionGrant, EntityWrite::Create);

        assert_eq!(write.target(), WriteTarget::Access);
        assert_eq!(
            affected_keys(write, &[account]),
            vec![user_roles_key(account), system_permissions_key(account)]
        );
    }

    #[test]
    fn test_account_change_without_ids_is_empty() {
        assert!(affected_keys(WriteKind::AccountChange, &[]).is_empty());
    }

    #[test]
    fn test_duplicate_account_ids_collapse() {
        let a = Uuid::new_v4();
        let keys = affected_keys(WriteKind::AccountChange, &[a, a]);
        assert_eq!(keys.len(), 2);
    }
}
