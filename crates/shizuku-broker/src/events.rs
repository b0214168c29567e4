//! Permission-change notifications.
//!
//! One-way, targeted egress to the affected application's process. The
//! transport restricts delivery to platform-signed receivers; the broker
//! never retries a failed delivery.

/// Event name for permission-state changes.
pub const ACTION_PERMISSION_CHANGED: &str =
    "com.android.systemshizuku.action.PERMISSION_CHANGED";

/// Payload of a permission-change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionChange {
    /// The affected package; delivery is targeted at it.
    pub package_name: String,
    /// The affected platform user.
    pub user_id: i32,
    /// The new grant state.
    pub granted: bool,
}

/// Delivers permission-change notifications.
///
/// Delivery failure is non-fatal; implementations log and drop.
pub trait EventSink: Send + Sync {
    /// Notify the affected application that its grant state changed.
    fn notify_permission_changed(&self, change: PermissionChange);
}

/// Convenience constructor used by every engine that notifies.
pub fn permission_changed(package: &str, user: i32, granted: bool) -> PermissionChange {
    PermissionChange {
        package_name: package.to_string(),
        user_id: user,
        granted,
    }
}

/// An [`EventSink`] that logs and drops every notification.
///
/// Useful when the embedding platform has no broadcast path wired yet.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn notify_permission_changed(&self, change: PermissionChange) {
        tracing::debug!(
            package = %change.package_name,
            user = change.user_id,
            granted = change.granted,
            "permission change dropped (no event sink wired)"
        );
    }
}
