mod error;
mod operations;
mod types;

pub use error::RegistryError;
pub use operations::{
    latest_citizens, sorted_permissions, validate_account, validate_entity, DEFAULT_LATEST_LIMIT,
};
pub use types::{
    Account, Business, Citizen, DashboardStats, Entity, EntityKind, Household, Infrastructure,
    PermissionGrant, PermissionName, Record, RecordMeta, Role, Sitio,
};
