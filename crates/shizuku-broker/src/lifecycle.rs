//! Platform lifecycle hooks.
//!
//! The embedding platform calls these when users unlock, users are
//! removed, and packages are uninstalled. All reconciliation happens
//! through the shared store; the hooks never create grants.

use std::sync::Arc;

use tracing::{debug, info, warn};

use shizuku_broker_core::{now_millis, AuditEvent, EventType};
use shizuku_broker_store::PermissionStore;

/// Boot and package lifecycle handlers.
pub struct LifecycleHooks {
    store: Arc<PermissionStore>,
}

impl LifecycleHooks {
    /// Create hooks over the shared store.
    pub fn new(store: Arc<PermissionStore>) -> Self {
        Self { store }
    }

    /// Direct-boot phase: credential storage is not available yet, so the
    /// sealed store is unreadable. Nothing to do.
    pub fn handle_locked_boot(&self, user: i32) {
        debug!(user, "locked boot; store unavailable until unlock");
    }

    /// Post-unlock boot: reconcile grants that should not have survived
    /// the reboot.
    ///
    /// Session-only grants are revoked (their session died with the old
    /// boot; the liveness path could not observe it). Time-limited grants
    /// that expired while the device was off are revoked with an `EXPIRE`
    /// audit entry.
    pub fn handle_boot_completed(&self, user: i32) {
        info!(user, "boot completed; reconciling grants");

        for grant in self.store.grants(user) {
            if grant.granted && grant.is_session_only() {
                debug!(package = %grant.package_name, "revoking session-only grant from previous boot");
                self.store.revoke(&grant.package_name, user);
            }
        }

        let now = now_millis();
        for grant in self.store.grants(user) {
            if grant.granted && grant.is_expired(now) {
                debug!(package = %grant.package_name, "expiring time-limited grant");
                self.store.revoke(&grant.package_name, user);
                self.store.append_audit(AuditEvent::new(
                    EventType::Expire,
                    &grant.package_name,
                    grant.app_id,
                    user,
                    now,
                ));
            }
        }
    }

    /// A platform user was removed: purge both files. No per-record audit;
    /// the log goes with the user.
    pub fn handle_user_removed(&self, user: i32) {
        info!(user, "user removed; purging store");
        self.store.delete_user(user);
    }

    /// A package was uninstalled (not replaced). Revoke its grant
    /// silently; audit entries are kept for forensic retention.
    pub fn handle_package_removed(&self, package: &str, user: i32, replacing: bool) {
        if replacing {
            debug!(package, user, "package replaced; keeping grant");
            return;
        }
        if package.is_empty() {
            warn!(user, "package-removed event without a package name");
            return;
        }
        info!(package, user, "package removed; revoking grant");
        self.store.revoke(package, user);
    }
}
