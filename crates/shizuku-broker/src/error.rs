//! Error types surfaced to broker callers.

use thiserror::Error;

/// Errors a caller of the public or management surface can observe.
///
/// Identity and authorization errors fail fast at the entry of each
/// handler. Store I/O never surfaces here: it degrades to empty reads and
/// logged, swallowed writes.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Caller identity does not own the target package in the target user,
    /// or a session token was not issued to the caller.
    #[error("not owner: {0}")]
    NotOwner(String),

    /// Caller lacks the required platform capability.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Pending consent-request cap exceeded for a (package, user).
    #[error("too many pending permission requests for {package} in user {user}")]
    RateLimit { package: String, user: i32 },

    /// Global or per-owner process cap exceeded.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Elevated operation attempted without an active grant.
    #[error("no active grant for {package} in user {user}")]
    NotGranted { package: String, user: i32 },

    /// `exit_value` queried on a live child.
    #[error("process has not exited")]
    NotExited,

    /// Client side only: the broker service is not registered with the
    /// transport. Never constructed by the broker itself.
    #[error("broker service not registered: {0}")]
    TransportUnavailable(String),
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
