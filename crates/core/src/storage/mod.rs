mod error;
mod traits;
mod types;

pub use error::{RepositoryError, Result};
pub use traits::{AccountRepository, EntityStore};
pub use types::{ListFilter, Relation, Scope};
