//! The public app-facing surface.
//!
//! Every call carries the transport-authenticated peer identity. Handlers
//! fail fast on identity mismatch, then consult the store; consent
//! dispatch queues the dialog and returns without waiting on the user.

use std::sync::Arc;

use tracing::{debug, info, warn};

use shizuku_broker_core::{now_millis, AuditEvent, EventType, Grant, PeerIdentity, SessionToken};
use shizuku_broker_store::PermissionStore;

use crate::callback::{ConsentDecision, PermissionCallback};
use crate::error::{BrokerError, Result};
use crate::events::EventSink;
use crate::pending::PendingRequests;
use crate::platform::{ConsentRequest, ConsentUi, LivenessHandle, PackageDatabase};
use crate::session::SessionManager;

/// Protocol version returned by `ping`. Incremented on incompatible
/// interface changes.
pub const PROTOCOL_VERSION: i32 = 1;

/// The public permission engine (`ISystemShizukuService` equivalent).
pub struct ShizukuService {
    store: Arc<PermissionStore>,
    sessions: Arc<SessionManager>,
    packages: Arc<dyn PackageDatabase>,
    consent: Arc<dyn ConsentUi>,
    events: Arc<dyn EventSink>,
    pending: Arc<PendingRequests>,
}

impl ShizukuService {
    /// Assemble the engine from the shared store and collaborators.
    pub fn new(
        store: Arc<PermissionStore>,
        sessions: Arc<SessionManager>,
        packages: Arc<dyn PackageDatabase>,
        consent: Arc<dyn ConsentUi>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            sessions,
            packages,
            consent,
            events,
            pending: Arc::new(PendingRequests::new()),
        }
    }

    /// Unrestricted liveness probe; returns the protocol version.
    pub fn ping(&self) -> i32 {
        PROTOCOL_VERSION
    }

    /// Request elevated access for `package` in `user`.
    ///
    /// Resolution is delivered exclusively through `callback`; this call
    /// returns as soon as the dialog (if any) is queued. The transport's
    /// liveness handle for the callback lets the broker observe the client
    /// dying mid-decision.
    pub fn request_permission(
        &self,
        peer: PeerIdentity,
        package: &str,
        user: i32,
        callback: Arc<dyn PermissionCallback>,
        callback_liveness: Arc<dyn LivenessHandle>,
    ) -> Result<()> {
        self.enforce_caller_owns_package(peer, package, user)?;

        // Existing valid grant: short-circuit with a fresh session.
        let existing = self.store.grant(package, user);
        if let Some(grant) = existing.as_ref().filter(|g| g.granted) {
            if grant.is_expired(now_millis()) {
                debug!(package, user, "grant expired; revoking before dialog");
                self.store.revoke(package, user);
                self.store.append_audit(AuditEvent::new(
                    EventType::Expire,
                    package,
                    grant.app_id,
                    user,
                    now_millis(),
                ));
                self.sessions.invalidate_matching(package, user);
                // Fall through to the dialog path.
            } else {
                debug!(package, user, "existing valid grant");
                let token = self
                    .sessions
                    .issue(package, grant.app_id, user, grant.flags);
                callback.on_granted(grant, token);
                return Ok(());
            }
        } else if let Some(grant) = existing.as_ref() {
            // Permanent deny: a user-revoked record blocks the dialog.
            if grant.is_revoked_by_user() {
                debug!(package, user, "permanently denied; dialog suppressed");
                callback.on_denied(package, user);
                return Ok(());
            }
        }

        self.pending.try_acquire(package, user)?;

        let decision = Arc::new(ConsentDecision::new(
            package.to_string(),
            peer.app_id(),
            user,
            callback,
            Arc::clone(&self.store),
            Arc::clone(&self.sessions),
            Arc::clone(&self.events),
            Arc::clone(&self.pending),
        ));

        // Watch the requesting client so a death mid-decision drops the
        // callback; the pending slot is still released when the dialog
        // terminates.
        let watched = Arc::clone(&decision);
        let linked = callback_liveness.link_to_death(Box::new(move || watched.client_died()));
        if !linked {
            decision.client_died();
        }

        info!(package, user, "queueing consent dialog");
        self.consent.request_consent(
            ConsentRequest {
                package_name: package.to_string(),
                app_id: peer.app_id(),
                user_id: user,
            },
            decision,
        );
        Ok(())
    }

    /// The caller's current grant record, unfiltered.
    pub fn get_my_permission(
        &self,
        peer: PeerIdentity,
        package: &str,
        user: i32,
    ) -> Result<Option<Grant>> {
        self.enforce_caller_owns_package(peer, package, user)?;
        Ok(self.store.grant(package, user))
    }

    /// Bind a previously issued session token to the calling peer's
    /// liveness.
    ///
    /// Fails `NotOwner` if the token is unknown or the caller does not own
    /// the token's package in its user.
    pub fn attach_session(
        &self,
        peer: PeerIdentity,
        token: SessionToken,
        peer_liveness: Arc<dyn LivenessHandle>,
    ) -> Result<()> {
        let entry = self
            .sessions
            .entry(token)
            .ok_or_else(|| BrokerError::NotOwner(format!("token {token} not issued to {peer}")))?;

        let owner = self
            .packages
            .package_uid(&entry.package_name, entry.user_id);
        if owner != Some(peer) {
            warn!(%token, %peer, "attach refused: caller does not own the session's package");
            return Err(BrokerError::NotOwner(format!(
                "token {token} not issued to {peer}"
            )));
        }

        Arc::clone(&self.sessions).attach(token, peer, peer_liveness)
    }

    /// The pending-dialog count for a (package, user); exposed for
    /// introspection and tests.
    pub fn pending_count(&self, package: &str, user: i32) -> u32 {
        self.pending.count(package, user)
    }

    /// Verify the calling peer owns `package` in `user` per the platform
    /// package database.
    fn enforce_caller_owns_package(
        &self,
        peer: PeerIdentity,
        package: &str,
        user: i32,
    ) -> Result<()> {
        match self.packages.package_uid(package, user) {
            Some(expected) if expected == peer => Ok(()),
            Some(expected) => Err(BrokerError::NotOwner(format!(
                "{peer} does not own {package} in user {user} (expected {expected})"
            ))),
            None => Err(BrokerError::NotOwner(format!(
                "package {package} not found for user {user}"
            ))),
        }
    }
}
