//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
///
/// Most of these never escape the store: read paths degrade to empty state
/// and write paths log and swallow. They surface only from [`crate::PermissionStore::open`]
/// and the vault primitives.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sealing (encryption) failed.
    #[error("seal error: {0}")]
    Seal(String),

    /// Opening (decryption/authentication) failed.
    #[error("open error: {0}")]
    Open(String),

    /// Envelope or plaintext (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
