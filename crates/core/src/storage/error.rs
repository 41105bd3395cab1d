use thiserror::Error;

use crate::registry::RegistryError;

/// Errors that can occur during entity store operations.
///
/// `Clone` so a single computation's failure can be handed to every caller
/// waiting on it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },
    #[error("Invalid {entity_type}: {reason}")]
    Validation {
        entity_type: &'static str,
        reason: String,
    },
    #[error("{entity_type} {id} is in an invalid state: {reason}")]
    InvalidState {
        entity_type: &'static str,
        id: String,
        reason: String,
    },
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Query failed: {0}")]
    QueryFailed(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RepositoryError {
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        RepositoryError::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    pub fn invalid(entity_type: &'static str, reason: impl Into<String>) -> Self {
        RepositoryError::Validation {
            entity_type,
            reason: reason.into(),
        }
    }

    /// Wraps a field-level validation failure for the given entity type.
    pub fn validation(entity_type: &'static str, err: RegistryError) -> Self {
        RepositoryError::Validation {
            entity_type,
            reason: err.to_string(),
        }
    }
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let error = RepositoryError::NotFound {
            entity_type: "Citizen",
            id: "abc-123".to_string(),
        };
        assert_eq!(error.to_string(), "Citizen not found: abc-123");
    }

    #[test]
    fn test_validation_display() {
        let error = RepositoryError::Validation {
            entity_type: "Account",
            reason: "username already taken: clerk".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid Account: username already taken: clerk"
        );
    }

    #[test]
    fn test_validation_from_registry_error() {
        let error =
            RepositoryError::validation("Sitio", RegistryError::EmptyField("name"));
        assert_eq!(error.to_string(), "Invalid Sitio: name cannot be empty");
    }

    #[test]
    fn test_invalid_state_display() {
        let error = RepositoryError::InvalidState {
            entity_type: "Household",
            id: "h-1".to_string(),
            reason: "not archived".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Household h-1 is in an invalid state: not archived"
        );
    }

    #[test]
    fn test_store_unavailable_display() {
        let error = RepositoryError::StoreUnavailable("timeout after 5s".to_string());
        assert_eq!(error.to_string(), "Store unavailable: timeout after 5s");
    }
}
