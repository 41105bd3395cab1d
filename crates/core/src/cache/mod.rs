mod error;
mod invalidation;
mod keys;
mod patterns;
mod serialization;
mod traits;

pub use error::{CacheError, Result};
pub use invalidation::{
    affected_keys, target_keys, templates_for, EntityWrite, KeyTemplate, WriteKind, WriteTarget,
    INVALIDATION_TABLE,
};
pub use keys::{
    all_key, count_key, namespace_of, namespace_pattern, per_account_key,
    system_permissions_key, user_roles_key, ALL_BUSINESSES, ALL_CITIZENS, ALL_HOUSEHOLDS,
    ALL_INFRASTRUCTURES, ALL_SITIOS, COUNT_BUSINESSES, COUNT_CITIZENS, COUNT_HOUSEHOLDS,
    COUNT_INFRASTRUCTURES, SYSTEM_PERMISSIONS, USER_ROLES,
};
pub use patterns::{pattern_matches, pattern_touches_namespace};
pub use serialization::{deserialize, serialize, SerializationError};
pub use traits::{Cache, Generation, PopulateOutcome};
