//! The privileged management surface.
//!
//! Consumed by the system Settings UI. Every operation first asserts the
//! platform management capability; cross-user (`USER_ALL`) operations
//! additionally require the cross-user capability. This surface can list,
//! inspect, and revoke grants but can never create one.

use std::sync::Arc;

use tracing::info;

use shizuku_broker_core::{now_millis, AuditEvent, EventType, Grant, PeerIdentity, USER_ALL};
use shizuku_broker_store::PermissionStore;

use crate::error::{BrokerError, Result};
use crate::events::{permission_changed, EventSink};
use crate::platform::{Capability, PlatformAuthority};
use crate::session::SessionManager;

/// Maximum audit entries returned per management query.
pub const MAX_AUDIT_RESULTS: usize = 100;

/// The management engine (`ISystemShizukuManager` equivalent).
pub struct ShizukuManager {
    store: Arc<PermissionStore>,
    sessions: Arc<SessionManager>,
    events: Arc<dyn EventSink>,
    authority: Arc<dyn PlatformAuthority>,
}

impl ShizukuManager {
    /// Assemble the engine from the shared store and collaborators.
    pub fn new(
        store: Arc<PermissionStore>,
        sessions: Arc<SessionManager>,
        events: Arc<dyn EventSink>,
        authority: Arc<dyn PlatformAuthority>,
    ) -> Self {
        Self {
            store,
            sessions,
            events,
            authority,
        }
    }

    /// All grant records for `user`.
    ///
    /// `USER_ALL` is accepted but returns empty: aggregation across users
    /// is deferred to callers passing explicit user ids.
    pub fn list_grants(&self, peer: PeerIdentity, user: i32) -> Result<Vec<Grant>> {
        self.enforce_manage(peer)?;
        if user == USER_ALL {
            self.enforce_cross_user(peer)?;
            return Ok(Vec::new());
        }
        Ok(self.store.grants(user))
    }

    /// The grant record for `package` in `user`, if any.
    pub fn get_permission(
        &self,
        peer: PeerIdentity,
        package: &str,
        user: i32,
    ) -> Result<Option<Grant>> {
        self.enforce_manage(peer)?;
        Ok(self.store.grant(package, user))
    }

    /// Revoke the grant for `package` in `user`.
    ///
    /// If a record existed: every matching session token is invalidated,
    /// one `REVOKE` audit entry is appended with the caller's uid, and one
    /// notification is delivered. Succeeds silently when no record exists.
    pub fn revoke_permission(&self, peer: PeerIdentity, package: &str, user: i32) -> Result<()> {
        self.enforce_manage(peer)?;
        info!(package, user, caller = peer.uid(), "management revoke");

        let Some(revoked) = self.store.revoke(package, user) else {
            return Ok(());
        };

        self.sessions.invalidate_matching(package, user);
        self.store.append_audit(
            AuditEvent::new(EventType::Revoke, package, revoked.app_id, user, now_millis())
                .with_detail(format!("callerUid={}", peer.uid())),
        );
        self.events
            .notify_permission_changed(permission_changed(package, user, false));
        Ok(())
    }

    /// Revoke every grant for `user` with a single store write, then emit
    /// one audit entry and one notification per record.
    pub fn revoke_all_permissions(&self, peer: PeerIdentity, user: i32) -> Result<()> {
        self.enforce_manage(peer)?;
        if user == USER_ALL {
            self.enforce_cross_user(peer)?;
            return Ok(());
        }
        info!(user, caller = peer.uid(), "management revoke-all");

        let revoked = self.store.revoke_all(user);
        for grant in &revoked {
            self.sessions
                .invalidate_matching(&grant.package_name, user);
            self.store.append_audit(
                AuditEvent::new(
                    EventType::Revoke,
                    &grant.package_name,
                    grant.app_id,
                    user,
                    now_millis(),
                )
                .with_detail(format!("bulk; callerUid={}", peer.uid())),
            );
            self.events.notify_permission_changed(permission_changed(
                &grant.package_name,
                user,
                false,
            ));
        }
        Ok(())
    }

    /// Audit events for `user`, newest first, optionally filtered to one
    /// package, capped at [`MAX_AUDIT_RESULTS`].
    pub fn get_audit_log(
        &self,
        peer: PeerIdentity,
        package: Option<&str>,
        user: i32,
    ) -> Result<Vec<AuditEvent>> {
        self.enforce_manage(peer)?;
        if user == USER_ALL {
            self.enforce_cross_user(peer)?;
            return Ok(Vec::new());
        }
        let mut events = self.store.audit(package, user);
        events.truncate(MAX_AUDIT_RESULTS);
        Ok(events)
    }

    fn enforce_manage(&self, peer: PeerIdentity) -> Result<()> {
        if self.authority.check(peer, Capability::ManageShizuku) {
            Ok(())
        } else {
            Err(BrokerError::NotAuthorized(format!(
                "{peer} does not hold the management capability"
            )))
        }
    }

    fn enforce_cross_user(&self, peer: PeerIdentity) -> Result<()> {
        if self.authority.check(peer, Capability::InteractAcrossUsersFull) {
            Ok(())
        } else {
            Err(BrokerError::NotAuthorized(format!(
                "USER_ALL requires the cross-user capability ({peer})"
            )))
        }
    }
}
