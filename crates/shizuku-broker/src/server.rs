//! Broker assembly.
//!
//! One shared store feeds every surface so all of them observe the same
//! state. The embedding platform builds a [`Broker`] and registers its
//! surfaces with the transport under the two well-known names; the
//! transport owns the threads.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use shizuku_broker_store::{MasterKey, PermissionStore, StoreError};

use crate::compat::ShizukuCompatService;
use crate::events::EventSink;
use crate::lifecycle::LifecycleHooks;
use crate::manager::ShizukuManager;
use crate::platform::{ConsentUi, PackageDatabase, PlatformAuthority};
use crate::process::ProcessSupervisor;
use crate::service::ShizukuService;
use crate::session::SessionManager;

/// Registration name of the public surface.
pub const SERVICE_NAME: &str = "shizuku";

/// Registration name of the management surface.
pub const MANAGER_SERVICE_NAME: &str = "shizuku_mgr";

/// Default on-device location of the sealed store.
pub const DEFAULT_BASE_DIR: &str = "/data/system/system_shizuku";

/// Everything the broker needs from the embedding platform.
pub struct BrokerConfig {
    /// Directory holding the sealed grant and audit files.
    pub base_dir: PathBuf,
    /// The platform master key for the sealed store.
    pub master_key: MasterKey,
    /// Package-identity resolution.
    pub packages: Arc<dyn PackageDatabase>,
    /// The consent dialog.
    pub consent: Arc<dyn ConsentUi>,
    /// Permission-change egress.
    pub events: Arc<dyn EventSink>,
    /// Capability checks for the management surface.
    pub authority: Arc<dyn PlatformAuthority>,
}

/// The assembled broker: one store, every surface.
pub struct Broker {
    /// The shared store.
    pub store: Arc<PermissionStore>,
    /// The session registry.
    pub sessions: Arc<SessionManager>,
    /// The public app-facing surface.
    pub service: Arc<ShizukuService>,
    /// The privileged management surface.
    pub manager: Arc<ShizukuManager>,
    /// The elevated-execution supervisor.
    pub supervisor: Arc<ProcessSupervisor>,
    /// The ecosystem compat shim.
    pub compat: Arc<ShizukuCompatService>,
    /// Boot / user / package lifecycle handlers.
    pub lifecycle: Arc<LifecycleHooks>,
}

impl Broker {
    /// Open the store and wire every surface to it.
    pub fn new(config: BrokerConfig) -> Result<Self, StoreError> {
        let store = Arc::new(PermissionStore::open(config.base_dir, config.master_key)?);
        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&store),
            Arc::clone(&config.events),
        ));
        let service = Arc::new(ShizukuService::new(
            Arc::clone(&store),
            Arc::clone(&sessions),
            Arc::clone(&config.packages),
            Arc::clone(&config.consent),
            Arc::clone(&config.events),
        ));
        let manager = Arc::new(ShizukuManager::new(
            Arc::clone(&store),
            Arc::clone(&sessions),
            Arc::clone(&config.events),
            Arc::clone(&config.authority),
        ));
        let supervisor = Arc::new(ProcessSupervisor::new(
            Arc::clone(&store),
            Arc::clone(&config.packages),
        ));
        let compat = Arc::new(ShizukuCompatService::new(
            Arc::clone(&service),
            Arc::clone(&supervisor),
            Arc::clone(&store),
            Arc::clone(&config.packages),
        ));
        let lifecycle = Arc::new(LifecycleHooks::new(Arc::clone(&store)));

        info!(
            service = SERVICE_NAME,
            manager = MANAGER_SERVICE_NAME,
            "broker assembled"
        );
        Ok(Self {
            store,
            sessions,
            service,
            manager,
            supervisor,
            compat,
            lifecycle,
        })
    }
}
