//! Ecosystem compatibility shim.
//!
//! Mirrors the established elevated-execution interface (`IShizukuService`
//! equivalent) so existing clients keep working. Every call routes through
//! the same permission engine, supervisor, and store as the first-party
//! surface; the shim holds no grant state of its own.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use shizuku_broker_core::{Grant, PeerIdentity, SessionToken};
use shizuku_broker_store::PermissionStore;

use crate::callback::PermissionCallback;
use crate::error::Result;
use crate::platform::{LivenessHandle, PackageDatabase};
use crate::process::{ProcessSupervisor, RemoteProcess};
use crate::service::ShizukuService;

/// Interface version reported to compat clients.
pub const COMPAT_VERSION: i32 = 13;

/// The uid the broker itself runs as.
pub const SYSTEM_UID: i32 = 1000;

/// `check_permission` result: permission held.
pub const PERMISSION_GRANTED: i32 = 0;

/// `check_permission` result: permission missing.
pub const PERMISSION_DENIED: i32 = -1;

/// SELinux context the broker executes under.
pub const SELINUX_CONTEXT: &str = "u:r:system_shizuku:s0";

/// The compat surface registered under the legacy service name.
pub struct ShizukuCompatService {
    service: Arc<ShizukuService>,
    supervisor: Arc<ProcessSupervisor>,
    store: Arc<PermissionStore>,
    packages: Arc<dyn PackageDatabase>,
}

impl ShizukuCompatService {
    /// Assemble the shim over the first-party engines.
    pub fn new(
        service: Arc<ShizukuService>,
        supervisor: Arc<ProcessSupervisor>,
        store: Arc<PermissionStore>,
        packages: Arc<dyn PackageDatabase>,
    ) -> Self {
        Self {
            service,
            supervisor,
            store,
            packages,
        }
    }

    /// Interface version; high enough to advertise modern support.
    pub fn get_version(&self) -> i32 {
        COMPAT_VERSION
    }

    /// The uid elevated operations run as.
    pub fn get_uid(&self) -> i32 {
        SYSTEM_UID
    }

    /// The SELinux context elevated operations run under.
    pub fn selinux_context(&self) -> &'static str {
        SELINUX_CONTEXT
    }

    /// Whether the calling peer currently holds an active grant.
    pub fn check_self_permission(&self, peer: PeerIdentity) -> bool {
        let Some(package) = self.packages.package_for_uid(peer) else {
            return false;
        };
        self.store
            .grant(&package, peer.user_id())
            .map(|g| g.granted)
            .unwrap_or(false)
    }

    /// Grant state as the legacy granted/denied integer pair.
    pub fn check_permission(&self, peer: PeerIdentity) -> i32 {
        if self.check_self_permission(peer) {
            PERMISSION_GRANTED
        } else {
            PERMISSION_DENIED
        }
    }

    /// Legacy permission request: resolve the caller's package and route
    /// through the permission engine with a log-only callback. Compat
    /// clients observe the outcome via the permission-changed event, not a
    /// direct callback.
    pub fn request_permission(
        &self,
        peer: PeerIdentity,
        callback_liveness: Arc<dyn LivenessHandle>,
        request_code: i32,
    ) -> Result<()> {
        let Some(package) = self.packages.package_for_uid(peer) else {
            debug!(%peer, "compat request from uid with no package; dropped");
            return Ok(());
        };
        debug!(%peer, package, request_code, "compat permission request");
        self.service.request_permission(
            peer,
            &package,
            peer.user_id(),
            Arc::new(LogOnlyCallback),
            callback_liveness,
        )
    }

    /// Launch an elevated child for the calling peer; see
    /// [`ProcessSupervisor::new_process`].
    pub fn new_process(
        &self,
        peer: PeerIdentity,
        owner_liveness: Arc<dyn LivenessHandle>,
        cmd: &[String],
        env: Option<&[String]>,
        cwd: Option<&Path>,
    ) -> Result<Option<Arc<RemoteProcess>>> {
        self.supervisor
            .new_process(peer, owner_liveness, cmd, env, cwd)
    }
}

/// Callback for compat requests, which have no callback of their own.
struct LogOnlyCallback;

impl PermissionCallback for LogOnlyCallback {
    fn on_granted(&self, grant: &Grant, _token: SessionToken) {
        info!(package = %grant.package_name, user = grant.user_id, "compat request granted");
    }

    fn on_denied(&self, package: &str, user: i32) {
        info!(package, user, "compat request denied");
    }
}
