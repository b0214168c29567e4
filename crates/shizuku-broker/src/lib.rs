//! # Shizuku Broker
//!
//! The server-side runtime of the system_shizuku permission broker.
//!
//! Applications request elevated access through the public surface; a
//! user-visible consent dialog gates every new grant; granted applications
//! receive a session token bound to their liveness and may launch
//! supervised elevated subprocesses. A distinct management surface lists,
//! inspects, and revokes grants but can never create one.
//!
//! ## Surfaces
//!
//! - [`ShizukuService`] - public: ping, request, query, attach session
//! - [`ShizukuManager`] - privileged: list, inspect, revoke, audit
//! - [`ShizukuCompatService`] - ecosystem shim routing through the above
//! - [`ProcessSupervisor`] - elevated subprocess execution
//! - [`LifecycleHooks`] - boot / user-removed / package-removed
//!
//! ## Collaborators
//!
//! The surrounding platform is consumed through narrow traits
//! ([`PackageDatabase`], [`ConsentUi`], [`EventSink`],
//! [`PlatformAuthority`], [`LivenessHandle`]); any on-device IPC with
//! authenticated identity, liveness subscription, and descriptor passing
//! can satisfy them.

pub mod callback;
pub mod compat;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod manager;
pub mod pending;
pub mod platform;
pub mod process;
pub mod server;
pub mod service;
pub mod session;

pub use callback::{ConsentDecision, PermissionCallback};
pub use compat::{ShizukuCompatService, COMPAT_VERSION, SELINUX_CONTEXT};
pub use error::{BrokerError, Result};
pub use events::{EventSink, NullEventSink, PermissionChange, ACTION_PERMISSION_CHANGED};
pub use lifecycle::LifecycleHooks;
pub use manager::{ShizukuManager, MAX_AUDIT_RESULTS};
pub use pending::{PendingRequests, MAX_PENDING_REQUESTS};
pub use platform::{
    Capability, ConsentRequest, ConsentUi, LivenessHandle, PackageDatabase, PlatformAuthority,
};
pub use process::{
    ProcessSupervisor, RemoteProcess, MAX_GLOBAL_PROCESSES, MAX_PER_OWNER_PROCESSES,
};
pub use server::{Broker, BrokerConfig, DEFAULT_BASE_DIR, MANAGER_SERVICE_NAME, SERVICE_NAME};
pub use service::{ShizukuService, PROTOCOL_VERSION};
pub use session::{SessionEntry, SessionManager};
