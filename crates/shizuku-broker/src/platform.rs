//! Platform collaborator seams.
//!
//! The broker consumes the surrounding platform through narrow traits:
//! package-identity resolution, capability checks, peer liveness, and the
//! consent dialog. Production wires these to the real IPC transport and
//! package database; tests wire fakes from the testkit.

use std::sync::Arc;

use shizuku_broker_core::PeerIdentity;

use crate::callback::ConsentDecision;

/// Resolves package identities against the platform package database.
pub trait PackageDatabase: Send + Sync {
    /// The identity that owns `package` in `user`, or `None` if the package
    /// is not installed there.
    fn package_uid(&self, package: &str, user: i32) -> Option<PeerIdentity>;

    /// The package installed under `peer`'s identity, or `None` if the uid
    /// maps to no package.
    fn package_for_uid(&self, peer: PeerIdentity) -> Option<String>;
}

/// Platform capabilities checked on the management surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// The management capability gating list/revoke/audit operations.
    ManageShizuku,
    /// Required in addition to [`Capability::ManageShizuku`] for
    /// `USER_ALL` operations.
    InteractAcrossUsersFull,
}

/// Answers capability checks for a peer.
pub trait PlatformAuthority: Send + Sync {
    /// Whether `peer` holds `capability`.
    fn check(&self, peer: PeerIdentity, capability: Capability) -> bool;
}

/// A liveness subscription on a remote handle.
///
/// The transport hands the broker one of these per remote object the
/// broker wants to watch (a client callback, a session peer, a process
/// owner).
pub trait LivenessHandle: Send + Sync {
    /// Register a recipient invoked exactly once when the peer dies.
    ///
    /// Returns `false` if the peer is already dead; the recipient is NOT
    /// invoked in that case and the caller must run its cleanup inline.
    fn link_to_death(&self, recipient: Box<dyn FnOnce() + Send>) -> bool;
}

/// Parameters handed to the consent dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentRequest {
    /// The package requesting elevated access.
    pub package_name: String,
    /// App-id component of the requesting peer.
    pub app_id: i32,
    /// The platform user the request is for.
    pub user_id: i32,
}

/// The consent dialog collaborator.
///
/// Implementations queue a user-visible dialog and return immediately; the
/// user's decision arrives later through exactly one of
/// [`ConsentDecision::allow`] / [`ConsentDecision::deny`]. Back, home, and
/// recents all count as deny.
pub trait ConsentUi: Send + Sync {
    /// Queue the dialog. Must not block on the user's decision.
    fn request_consent(&self, request: ConsentRequest, decision: Arc<ConsentDecision>);
}
