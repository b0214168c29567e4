//! Fake platform collaborators.
//!
//! Each fake implements one of the broker's collaborator traits with
//! deterministic, inspectable in-memory behavior.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use shizuku_broker::{
    Capability, ConsentDecision, ConsentRequest, ConsentUi, EventSink, LivenessHandle,
    PackageDatabase, PermissionChange, PlatformAuthority,
};
use shizuku_broker_core::PeerIdentity;

/// In-memory package database.
///
/// Tests install packages with explicit app ids; both lookup directions
/// resolve against the same table.
#[derive(Default)]
pub struct FakePackageDatabase {
    by_package: Mutex<HashMap<(String, i32), PeerIdentity>>,
}

impl FakePackageDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `package` for `user` under `app_id`; returns the owning
    /// identity.
    pub fn install(&self, package: &str, user: i32, app_id: i32) -> PeerIdentity {
        let peer = PeerIdentity::from_parts(user, app_id);
        self.by_package
            .lock()
            .unwrap()
            .insert((package.to_string(), user), peer);
        peer
    }

    /// Remove `package` from `user`.
    pub fn uninstall(&self, package: &str, user: i32) {
        self.by_package
            .lock()
            .unwrap()
            .remove(&(package.to_string(), user));
    }
}

impl PackageDatabase for FakePackageDatabase {
    fn package_uid(&self, package: &str, user: i32) -> Option<PeerIdentity> {
        self.by_package
            .lock()
            .unwrap()
            .get(&(package.to_string(), user))
            .copied()
    }

    fn package_for_uid(&self, peer: PeerIdentity) -> Option<String> {
        self.by_package
            .lock()
            .unwrap()
            .iter()
            .find(|(_, p)| **p == peer)
            .map(|((package, _), _)| package.clone())
    }
}

/// Capability table with explicit grants.
#[derive(Default)]
pub struct StaticAuthority {
    held: Mutex<HashSet<(i32, Capability)>>,
}

impl StaticAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `capability` to `peer`.
    pub fn grant_capability(&self, peer: PeerIdentity, capability: Capability) {
        self.held.lock().unwrap().insert((peer.uid(), capability));
    }
}

impl PlatformAuthority for StaticAuthority {
    fn check(&self, peer: PeerIdentity, capability: Capability) -> bool {
        self.held.lock().unwrap().contains(&(peer.uid(), capability))
    }
}

/// Records every permission-change notification for assertions.
#[derive(Default)]
pub struct RecordingEventSink {
    changes: Mutex<Vec<PermissionChange>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications delivered so far, in order.
    pub fn changes(&self) -> Vec<PermissionChange> {
        self.changes.lock().unwrap().clone()
    }

    /// Clear the recording.
    pub fn clear(&self) {
        self.changes.lock().unwrap().clear();
    }
}

impl EventSink for RecordingEventSink {
    fn notify_permission_changed(&self, change: PermissionChange) {
        self.changes.lock().unwrap().push(change);
    }
}

/// Consent dialog driven by the test.
///
/// Requests queue in FIFO order; the test resolves them with
/// [`allow_next`](Self::allow_next) / [`deny_next`](Self::deny_next).
#[derive(Default)]
pub struct ManualConsentUi {
    queue: Mutex<VecDeque<(ConsentRequest, Arc<ConsentDecision>)>>,
}

impl ManualConsentUi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of dialogs awaiting a decision.
    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// The parameters of the oldest queued dialog.
    pub fn peek_request(&self) -> Option<ConsentRequest> {
        self.queue.lock().unwrap().front().map(|(r, _)| r.clone())
    }

    /// Take the oldest dialog out of the queue for manual resolution.
    pub fn take_next(&self) -> Option<(ConsentRequest, Arc<ConsentDecision>)> {
        self.queue.lock().unwrap().pop_front()
    }

    /// Resolve the oldest dialog as allowed. Returns false if none queued.
    pub fn allow_next(&self) -> bool {
        let entry = self.queue.lock().unwrap().pop_front();
        match entry {
            Some((_, decision)) => {
                decision.allow();
                true
            }
            None => false,
        }
    }

    /// Resolve the oldest dialog as denied (back/home/recents included).
    pub fn deny_next(&self) -> bool {
        let entry = self.queue.lock().unwrap().pop_front();
        match entry {
            Some((_, decision)) => {
                decision.deny();
                true
            }
            None => false,
        }
    }
}

impl ConsentUi for ManualConsentUi {
    fn request_consent(&self, request: ConsentRequest, decision: Arc<ConsentDecision>) {
        self.queue.lock().unwrap().push_back((request, decision));
    }
}

type DeathRecipient = Box<dyn FnOnce() + Send>;

struct LivenessState {
    dead: bool,
    recipients: Vec<DeathRecipient>,
}

/// A liveness handle the test can kill.
///
/// Killing invokes every linked recipient exactly once; links after death
/// report the peer as already dead.
pub struct FakeLivenessHandle {
    state: Mutex<LivenessState>,
}

impl FakeLivenessHandle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(LivenessState {
                dead: false,
                recipients: Vec::new(),
            }),
        })
    }

    /// Signal peer death, firing all linked recipients.
    pub fn kill(&self) {
        let recipients = {
            let mut state = self.state.lock().unwrap();
            if state.dead {
                return;
            }
            state.dead = true;
            std::mem::take(&mut state.recipients)
        };
        for recipient in recipients {
            recipient();
        }
    }

    /// Whether the fake peer has been killed.
    pub fn is_dead(&self) -> bool {
        self.state.lock().unwrap().dead
    }
}

impl LivenessHandle for FakeLivenessHandle {
    fn link_to_death(&self, recipient: DeathRecipient) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.dead {
            return false;
        }
        state.recipients.push(recipient);
        true
    }
}
