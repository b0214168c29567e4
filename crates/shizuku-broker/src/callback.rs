//! Client callbacks and the wrapped consent decision.
//!
//! The client's callback is one-shot: exactly one of `on_granted` /
//! `on_denied` fires per consent, and the engine drops its reference
//! afterwards. The consent dialog never sees the client callback directly;
//! it gets a [`ConsentDecision`] that decrements the pending counter,
//! performs the grant-side effects, and only then forwards.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use shizuku_broker_core::{now_millis, AuditEvent, EventType, Grant, SessionToken};
use shizuku_broker_store::PermissionStore;

use crate::events::{permission_changed, EventSink};
use crate::pending::PendingRequests;
use crate::session::SessionManager;

/// One-shot result callback for a permission request.
///
/// Exactly one method is invoked per consent. Delivery failures to a dead
/// peer are the implementation's problem to log and swallow; the broker
/// does not retry.
pub trait PermissionCallback: Send + Sync {
    /// The request resolved to an active grant.
    fn on_granted(&self, grant: &Grant, token: SessionToken);

    /// The request was denied (dialog deny, or permanent deny shortcut).
    fn on_denied(&self, package: &str, user: i32);
}

struct DecisionState {
    /// The client callback; taken on resolution, or earlier if the client
    /// dies mid-decision.
    callback: Option<Arc<dyn PermissionCallback>>,
    resolved: bool,
}

/// The wrapped callback handed to the consent dialog.
///
/// Whichever of [`allow`](Self::allow) / [`deny`](Self::deny) arrives
/// first wins; later calls are ignored. The pending slot is released on
/// resolution regardless of whether the requesting client is still
/// reachable.
pub struct ConsentDecision {
    package_name: String,
    app_id: i32,
    user_id: i32,

    state: Mutex<DecisionState>,

    store: Arc<PermissionStore>,
    sessions: Arc<SessionManager>,
    events: Arc<dyn EventSink>,
    pending: Arc<PendingRequests>,
}

impl ConsentDecision {
    pub(crate) fn new(
        package_name: String,
        app_id: i32,
        user_id: i32,
        callback: Arc<dyn PermissionCallback>,
        store: Arc<PermissionStore>,
        sessions: Arc<SessionManager>,
        events: Arc<dyn EventSink>,
        pending: Arc<PendingRequests>,
    ) -> Self {
        Self {
            package_name,
            app_id,
            user_id,
            state: Mutex::new(DecisionState {
                callback: Some(callback),
                resolved: false,
            }),
            store,
            sessions,
            events,
            pending,
        }
    }

    /// The package the dialog is deciding for.
    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    /// The platform user the dialog is deciding for.
    pub fn user_id(&self) -> i32 {
        self.user_id
    }

    /// The user allowed the request.
    ///
    /// Writes the grant (persistent, never expiring), appends a `GRANT`
    /// audit event, notifies the event bus, issues a fresh session token,
    /// and delivers `on_granted`. A store write failure does not block
    /// callback delivery; the grant is reissued on the next consent.
    pub fn allow(&self) {
        let Some(callback) = self.resolve() else {
            return;
        };
        self.pending.release(&self.package_name, self.user_id);

        let now = now_millis();
        let grant = Grant::new_granted(&self.package_name, self.app_id, self.user_id, now);
        self.store.put_grant(grant.clone());
        self.store.append_audit(AuditEvent::new(
            EventType::Grant,
            &self.package_name,
            self.app_id,
            self.user_id,
            now,
        ));
        self.events.notify_permission_changed(permission_changed(
            &self.package_name,
            self.user_id,
            true,
        ));

        let token = self
            .sessions
            .issue(&self.package_name, self.app_id, self.user_id, grant.flags);
        info!(package = %self.package_name, user = self.user_id, "consent allowed");

        match callback {
            Some(cb) => cb.on_granted(&grant, token),
            None => debug!(
                package = %self.package_name,
                "client died before consent resolved; grant recorded, delivery skipped"
            ),
        }
    }

    /// The user denied the request (including back/home/recents).
    ///
    /// Appends a `DENY` audit event and delivers `on_denied`. Stored grant
    /// state is not altered.
    pub fn deny(&self) {
        let Some(callback) = self.resolve() else {
            return;
        };
        self.pending.release(&self.package_name, self.user_id);

        self.store.append_audit(AuditEvent::new(
            EventType::Deny,
            &self.package_name,
            self.app_id,
            self.user_id,
            now_millis(),
        ));
        info!(package = %self.package_name, user = self.user_id, "consent denied");

        match callback {
            Some(cb) => cb.on_denied(&self.package_name, self.user_id),
            None => debug!(
                package = %self.package_name,
                "client died before consent resolved; deny delivery skipped"
            ),
        }
    }

    /// The requesting client died while the dialog was up.
    ///
    /// Drops the client callback so no delivery is attempted, but leaves
    /// the decision unresolved: the pending slot is still released when
    /// the dialog eventually terminates.
    pub(crate) fn client_died(&self) {
        let mut state = self.state.lock().unwrap();
        if state.callback.take().is_some() {
            warn!(
                package = %self.package_name,
                user = self.user_id,
                "requesting client died while awaiting consent"
            );
        }
    }

    /// Claim the one-shot resolution. `None` if already resolved;
    /// `Some(None)` if resolving but the client is gone.
    fn resolve(&self) -> Option<Option<Arc<dyn PermissionCallback>>> {
        let mut state = self.state.lock().unwrap();
        if state.resolved {
            debug!(package = %self.package_name, "duplicate consent decision ignored");
            return None;
        }
        state.resolved = true;
        Some(state.callback.take())
    }
}
