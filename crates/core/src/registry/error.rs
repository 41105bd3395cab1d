use thiserror::Error;

/// Errors raised while validating registry records before they are stored.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),
    #[error("{field} too long (max {max} characters)")]
    FieldTooLong { field: &'static str, max: usize },
    #[error("Invalid permission name: {0:?}")]
    InvalidPermission(String),
    #[error("Unknown entity kind: {0}")]
    UnknownKind(String),
    #[error("Unknown role: {0}")]
    UnknownRole(String),
}
