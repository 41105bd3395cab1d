use uuid::Uuid;

use crate::registry::Entity;

/// Which side of the archive a query looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Only records with `is_deleted = false`.
    #[default]
    Live,
    /// Only soft-deleted records.
    Archived,
    /// Both.
    All,
}

impl Scope {
    pub fn admits(&self, is_deleted: bool) -> bool {
        match self {
            Scope::Live => !is_deleted,
            Scope::Archived => is_deleted,
            Scope::All => true,
        }
    }
}

/// Filter for `list` and `count`.
///
/// The default filter admits every live record of the requested kind.
/// Relation filters only apply to kinds that carry the relation; a citizen
/// has no `sitio_id`, so filtering citizens by sitio matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub scope: Scope,
    pub household_id: Option<Uuid>,
    pub sitio_id: Option<Uuid>,
    pub account_id: Option<Uuid>,
}

impl ListFilter {
    pub fn live() -> Self {
        Self::default()
    }

    pub fn archived() -> Self {
        Self {
            scope: Scope::Archived,
            ..Self::default()
        }
    }

    pub fn all() -> Self {
        Self {
            scope: Scope::All,
            ..Self::default()
        }
    }

    pub fn with_household(mut self, household_id: Uuid) -> Self {
        self.household_id = Some(household_id);
        self
    }

    pub fn with_sitio(mut self, sitio_id: Uuid) -> Self {
        self.sitio_id = Some(sitio_id);
        self
    }

    pub fn with_account(mut self, account_id: Uuid) -> Self {
        self.account_id = Some(account_id);
        self
    }

    /// Returns true if the record passes the scope and every relation filter.
    pub fn matches(&self, entity: &Entity) -> bool {
        if !self.scope.admits(entity.is_deleted()) {
            return false;
        }

        let household = match entity {
            Entity::Citizen(c) => c.household_id,
            _ => None,
        };
        let sitio = match entity {
            Entity::Household(h) => Some(h.sitio_id),
            _ => None,
        };
        let account = match entity {
            Entity::PermissionGrant(g) => Some(g.account_id),
            _ => None,
        };

        self.household_id.is_none_or(|id| household == Some(id))
            && self.sitio_id.is_none_or(|id| sitio == Some(id))
            && self.account_id.is_none_or(|id| account == Some(id))
    }
}

/// Related records to materialize through `EntityStore::find_related`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// A citizen's household (empty if none is assigned).
    Household,
    /// A household's sitio.
    Sitio,
    /// The live citizens of a household.
    Members,
    /// The live permission grants of an account; the ID is the account ID.
    Grants,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Citizen, Household, PermissionGrant, PermissionName, Sitio};
    use chrono::Utc;

    #[test]
    fn test_default_filter_is_live() {
        assert_eq!(ListFilter::default().scope, Scope::Live);
        assert_eq!(ListFilter::live(), ListFilter::default());
    }

    #[test]
    fn test_scope_admits() {
        assert!(Scope::Live.admits(false));
        assert!(!Scope::Live.admits(true));
        assert!(Scope::Archived.admits(true));
        assert!(!Scope::Archived.admits(false));
        assert!(Scope::All.admits(true) && Scope::All.admits(false));
    }

    #[test]
    fn test_live_filter_excludes_deleted() {
        let mut citizen = Citizen::new("Ana", "Reyes");
        let live = Entity::from(citizen.clone());
        citizen.meta.mark_deleted("duplicate", Utc::now());
        let archived = Entity::from(citizen);

        assert!(ListFilter::live().matches(&live));
        assert!(!ListFilter::live().matches(&archived));
        assert!(ListFilter::archived().matches(&archived));
        assert!(ListFilter::all().matches(&archived));
    }

    #[test]
    fn test_household_filter() {
        let household = Uuid::new_v4();
        let member = Entity::from(Citizen::new("Ana", "Reyes").with_household(household));
        let other = Entity::from(Citizen::new("Ben", "Cruz"));

        let filter = ListFilter::live().with_household(household);
        assert!(filter.matches(&member));
        assert!(!filter.matches(&other));
    }

    #[test]
    fn test_sitio_filter_only_matches_households() {
        let sitio = Sitio::new("Centro");
        let household = Entity::from(Household::new("H-001", sitio.meta.id));
        let filter = ListFilter::live().with_sitio(sitio.meta.id);

        assert!(filter.matches(&household));
        assert!(!filter.matches(&Entity::from(sitio)));
    }

    #[test]
    fn test_account_filter() {
        let account = Uuid::new_v4();
        let grant = Entity::from(PermissionGrant::new(
            account,
            PermissionName::parse("reports.view").unwrap(),
        ));

        assert!(ListFilter::live().with_account(account).matches(&grant));
        assert!(!ListFilter::live()
            .with_account(Uuid::new_v4())
            .matches(&grant));
    }
}
