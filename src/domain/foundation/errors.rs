//! Error types shared across stores and adapters.

use thiserror::Error;

/// Errors that occur during value object construction.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Field '{field}' cannot be empty")]
    EmptyField { field: String },

    #[error("Field '{field}' has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    /// Creates an empty field validation error.
    pub fn empty_field(field: impl Into<String>) -> Self {
        ValidationError::EmptyField { field: field.into() }
    }

    /// Creates an invalid format validation error.
    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by store operations.
///
/// Not-found conditions are never errors — read and delete operations on a
/// missing id return `None`/`false`. A `Backend` error means the backing
/// store could not be reached or answered abnormally; it is raised to the
/// caller untouched so that an outage is never mistaken for absence. This
/// layer does not retry.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend connectivity or protocol error.
    #[error("Backend error: {0}")]
    Backend(String),

    /// A record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Creates a backend error from any displayable source.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        StoreError::Backend(err.to_string())
    }

    /// Creates a serialization error from any displayable source.
    pub fn serialization(err: impl std::fmt::Display) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
