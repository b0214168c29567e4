//! Session lifecycle.
//!
//! The session manager owns the in-memory token registry: it mints opaque
//! tokens on grant, tracks which (package, user) each token confers, and
//! drives session-only revocation when an issuing peer dies. Multiple live
//! tokens for the same (package, user) are independent sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rand::Rng;
use tracing::{debug, info};

use shizuku_broker_core::{
    now_millis, AuditEvent, EventType, PeerIdentity, SessionToken, GRANT_SESSION_ONLY,
};
use shizuku_broker_store::PermissionStore;

use crate::error::{BrokerError, Result};
use crate::events::{permission_changed, EventSink};
use crate::platform::LivenessHandle;

/// One live session in the token registry.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    /// The package this session confers elevated access for.
    pub package_name: String,
    /// App-id snapshot taken at issue time.
    pub app_id: i32,
    /// The platform user of the session.
    pub user_id: i32,
    /// Flags snapshot taken at issue time; decides session-only revocation
    /// on peer death.
    pub flags: u32,
    /// The peer that attached the token, once one has.
    pub attached_by: Option<PeerIdentity>,
}

/// Issues and tracks session tokens.
pub struct SessionManager {
    store: Arc<PermissionStore>,
    events: Arc<dyn EventSink>,

    sessions: Mutex<HashMap<SessionToken, SessionEntry>>,

    // Tokens are a random epoch plus a counter: unique within the process
    // and not guessable across broker restarts.
    next_token: AtomicU64,
}

impl SessionManager {
    /// Create a manager backed by the shared store and event sink.
    pub fn new(store: Arc<PermissionStore>, events: Arc<dyn EventSink>) -> Self {
        Self {
            store,
            events,
            sessions: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(rand::thread_rng().gen::<u64>() | 1),
        }
    }

    /// Mint a token and register its session entry.
    pub fn issue(&self, package: &str, app_id: i32, user: i32, flags: u32) -> SessionToken {
        let token = SessionToken::from_raw(self.next_token.fetch_add(1, Ordering::Relaxed));
        let entry = SessionEntry {
            package_name: package.to_string(),
            app_id,
            user_id: user,
            flags,
            attached_by: None,
        };
        self.sessions.lock().unwrap().insert(token, entry);
        debug!(%token, package, user, "session token issued");
        token
    }

    /// Look up the entry for a token.
    pub fn entry(&self, token: SessionToken) -> Option<SessionEntry> {
        self.sessions.lock().unwrap().get(&token).cloned()
    }

    /// Bind a token to its peer's liveness.
    ///
    /// Idempotent for the same peer; a different peer gets `NotOwner`. If
    /// the peer is already dead the session is torn down inline.
    pub fn attach(
        self: Arc<Self>,
        token: SessionToken,
        peer: PeerIdentity,
        liveness: Arc<dyn LivenessHandle>,
    ) -> Result<()> {
        {
            let mut sessions = self.sessions.lock().unwrap();
            let entry = sessions
                .get_mut(&token)
                .ok_or_else(|| BrokerError::NotOwner(format!("unknown session token {token}")))?;
            match entry.attached_by {
                Some(attached) if attached == peer => return Ok(()),
                Some(attached) => {
                    return Err(BrokerError::NotOwner(format!(
                        "token {token} already attached by {attached}"
                    )))
                }
                None => entry.attached_by = Some(peer),
            }
        }

        let manager = Arc::clone(&self);
        let linked = liveness.link_to_death(Box::new(move || manager.session_died(token)));
        if !linked {
            // Peer died before we could subscribe.
            self.session_died(token);
        }
        Ok(())
    }

    /// Tear down a session whose peer died.
    ///
    /// Session-only grants that are still recorded as granted transition
    /// to revoked, with one `REVOKE` audit entry and one notification.
    /// Persistent grants keep their record but lose the live session.
    pub fn session_died(&self, token: SessionToken) {
        let Some(entry) = self.sessions.lock().unwrap().remove(&token) else {
            return;
        };
        debug!(%token, package = %entry.package_name, "session died");

        if entry.flags & GRANT_SESSION_ONLY == 0 {
            return;
        }
        let Some(grant) = self.store.grant(&entry.package_name, entry.user_id) else {
            return;
        };
        if !grant.granted {
            return;
        }

        info!(
            package = %entry.package_name,
            user = entry.user_id,
            "session died; revoking session-only grant"
        );
        self.store.revoke(&entry.package_name, entry.user_id);
        self.store.append_audit(
            AuditEvent::new(
                EventType::Revoke,
                &entry.package_name,
                grant.app_id,
                entry.user_id,
                now_millis(),
            )
            .with_detail("session died"),
        );
        self.events.notify_permission_changed(permission_changed(
            &entry.package_name,
            entry.user_id,
            false,
        ));
    }

    /// Drop every token for a (package, user). Used by management revokes;
    /// the store transition has already happened, so this only clears the
    /// registry.
    pub fn invalidate_matching(&self, package: &str, user: i32) -> usize {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|_, e| !(e.package_name == package && e.user_id == user));
        let dropped = before - sessions.len();
        if dropped > 0 {
            debug!(package, user, dropped, "sessions invalidated");
        }
        dropped
    }

    /// Number of live sessions.
    pub fn live_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}
