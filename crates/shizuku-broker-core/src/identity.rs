//! Peer identity: the transport-authenticated caller.
//!
//! The IPC transport authenticates every incoming call with the caller's
//! uid. A uid decomposes into a user component and an app-id component; the
//! app id is stable across user re-creation while the full uid is not.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of one platform user's uid range. `uid = user * PER_USER_RANGE + app_id`.
pub const PER_USER_RANGE: i32 = 100_000;

/// The transport-authenticated identity of a calling peer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerIdentity {
    uid: i32,
}

impl PeerIdentity {
    /// Create an identity from a raw uid.
    pub const fn from_uid(uid: i32) -> Self {
        Self { uid }
    }

    /// Create an identity from its (user, app id) components.
    pub const fn from_parts(user_id: i32, app_id: i32) -> Self {
        Self {
            uid: user_id * PER_USER_RANGE + app_id,
        }
    }

    /// The raw uid.
    pub const fn uid(&self) -> i32 {
        self.uid
    }

    /// The app-id component (uid without the user component).
    pub const fn app_id(&self) -> i32 {
        self.uid % PER_USER_RANGE
    }

    /// The platform user this identity belongs to.
    pub const fn user_id(&self) -> i32 {
        self.uid / PER_USER_RANGE
    }
}

impl fmt::Debug for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerIdentity(uid={})", self.uid)
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uid {}", self.uid)
    }
}
