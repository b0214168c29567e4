//! # Shizuku Broker Core
//!
//! Pure data model for the system_shizuku permission broker: grant records,
//! audit events, peer identities, and session tokens.
//!
//! This crate contains no I/O, no locking, no collaborators. It is plain
//! data plus the invariant checks that every other crate relies on.
//!
//! ## Key Types
//!
//! - [`Grant`] - The persistent permission record for a (package, user)
//! - [`AuditEvent`] - One entry in the bounded, newest-first audit log
//! - [`PeerIdentity`] - The transport-authenticated caller (uid)
//! - [`SessionToken`] - Opaque handle for one live permission session

pub mod audit;
pub mod error;
pub mod grant;
pub mod identity;
pub mod time;
pub mod types;

pub use audit::{AuditEvent, EventType};
pub use error::{CoreError, Result};
pub use grant::{
    Grant, GRANT_PERSISTENT, GRANT_SESSION_ONLY, REVOKED_BY_POLICY, REVOKED_BY_USER,
};
pub use identity::{PeerIdentity, PER_USER_RANGE};
pub use time::now_millis;
pub use types::{SessionToken, USER_ALL};
