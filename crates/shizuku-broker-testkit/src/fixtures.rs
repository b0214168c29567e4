//! Pre-wired broker fixtures.

use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use shizuku_broker::{Broker, BrokerConfig, Capability, PermissionCallback};
use shizuku_broker_core::{Grant, PeerIdentity, SessionToken};
use shizuku_broker_store::MasterKey;

use crate::fakes::{
    FakePackageDatabase, ManualConsentUi, RecordingEventSink, StaticAuthority,
};

/// A full broker wired to fakes over a temporary store directory.
pub struct BrokerFixture {
    /// Keeps the store directory alive for the fixture's lifetime.
    pub dir: TempDir,
    pub packages: Arc<FakePackageDatabase>,
    pub consent: Arc<ManualConsentUi>,
    pub events: Arc<RecordingEventSink>,
    pub authority: Arc<StaticAuthority>,
    pub broker: Broker,
}

impl BrokerFixture {
    /// Build a broker over a fresh temporary directory and a fixed key.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let packages = Arc::new(FakePackageDatabase::new());
        let consent = Arc::new(ManualConsentUi::new());
        let events = Arc::new(RecordingEventSink::new());
        let authority = Arc::new(StaticAuthority::new());

        let broker = Broker::new(BrokerConfig {
            base_dir: dir.path().to_path_buf(),
            master_key: MasterKey::from_bytes([0x42; 32]),
            packages: Arc::clone(&packages) as Arc<dyn shizuku_broker::PackageDatabase>,
            consent: Arc::clone(&consent) as Arc<dyn shizuku_broker::ConsentUi>,
            events: Arc::clone(&events) as Arc<dyn shizuku_broker::EventSink>,
            authority: Arc::clone(&authority) as Arc<dyn shizuku_broker::PlatformAuthority>,
        })
        .expect("broker assembly");

        Self {
            dir,
            packages,
            consent,
            events,
            authority,
            broker,
        }
    }

    /// Install a package and return its owning identity.
    pub fn install_app(&self, package: &str, user: i32, app_id: i32) -> PeerIdentity {
        self.packages.install(package, user, app_id)
    }

    /// A caller holding the management capability (system uid).
    pub fn management_caller(&self) -> PeerIdentity {
        let peer = PeerIdentity::from_uid(1000);
        self.authority
            .grant_capability(peer, Capability::ManageShizuku);
        peer
    }

    /// A caller holding both the management and cross-user capabilities.
    pub fn cross_user_caller(&self) -> PeerIdentity {
        let peer = self.management_caller();
        self.authority
            .grant_capability(peer, Capability::InteractAcrossUsersFull);
        peer
    }
}

impl Default for BrokerFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// One observed callback delivery.
#[derive(Debug, Clone)]
pub enum CallbackOutcome {
    /// `on_granted` fired with this record and token.
    Granted(Grant, SessionToken),
    /// `on_denied` fired for this (package, user).
    Denied { package: String, user: i32 },
}

/// A [`PermissionCallback`] that records every delivery.
#[derive(Default)]
pub struct CollectingCallback {
    outcomes: Mutex<Vec<CallbackOutcome>>,
}

impl CollectingCallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Everything delivered so far, in order.
    pub fn outcomes(&self) -> Vec<CallbackOutcome> {
        self.outcomes.lock().unwrap().clone()
    }

    /// The token from the first grant delivery, if any.
    pub fn granted_token(&self) -> Option<SessionToken> {
        self.outcomes
            .lock()
            .unwrap()
            .iter()
            .find_map(|o| match o {
                CallbackOutcome::Granted(_, token) => Some(*token),
                CallbackOutcome::Denied { .. } => None,
            })
    }

    /// The grant from the first grant delivery, if any.
    pub fn granted_record(&self) -> Option<Grant> {
        self.outcomes
            .lock()
            .unwrap()
            .iter()
            .find_map(|o| match o {
                CallbackOutcome::Granted(grant, _) => Some(grant.clone()),
                CallbackOutcome::Denied { .. } => None,
            })
    }

    /// Whether any `on_denied` fired.
    pub fn denied(&self) -> bool {
        self.outcomes
            .lock()
            .unwrap()
            .iter()
            .any(|o| matches!(o, CallbackOutcome::Denied { .. }))
    }
}

impl PermissionCallback for CollectingCallback {
    fn on_granted(&self, grant: &Grant, token: SessionToken) {
        self.outcomes
            .lock()
            .unwrap()
            .push(CallbackOutcome::Granted(grant.clone(), token));
    }

    fn on_denied(&self, package: &str, user: i32) {
        self.outcomes.lock().unwrap().push(CallbackOutcome::Denied {
            package: package.to_string(),
            user,
        });
    }
}
