//! Error types for the core data model.

use thiserror::Error;

/// Errors that can occur while constructing or validating core records.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A grant record violates one of the model invariants.
    #[error("invalid grant: {0}")]
    InvalidGrant(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
