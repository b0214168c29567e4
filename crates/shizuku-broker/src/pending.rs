//! Pending consent-request rate limiting.
//!
//! One counter per (package, user), capped at [`MAX_PENDING_REQUESTS`].
//! The slot is acquired before the dialog is queued and released exactly
//! once when the dialog reaches any terminal decision, whether or not the
//! requesting client is still alive.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{BrokerError, Result};

/// Maximum in-flight consent dialogs per (package, user).
pub const MAX_PENDING_REQUESTS: u32 = 3;

/// Concurrent counter map for in-flight consent dialogs.
#[derive(Default)]
pub struct PendingRequests {
    counts: Mutex<HashMap<(String, i32), u32>>,
}

impl PendingRequests {
    /// Create an empty counter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim a pending slot.
    ///
    /// Fails with [`BrokerError::RateLimit`] if the new count would exceed
    /// the cap, leaving the counter unchanged.
    pub fn try_acquire(&self, package: &str, user: i32) -> Result<()> {
        let mut counts = self.counts.lock().unwrap();
        let entry = counts.entry((package.to_string(), user)).or_insert(0);
        if *entry >= MAX_PENDING_REQUESTS {
            return Err(BrokerError::RateLimit {
                package: package.to_string(),
                user,
            });
        }
        *entry += 1;
        Ok(())
    }

    /// Release a previously claimed slot.
    pub fn release(&self, package: &str, user: i32) {
        let mut counts = self.counts.lock().unwrap();
        match counts.get_mut(&(package.to_string(), user)) {
            Some(entry) if *entry > 1 => *entry -= 1,
            Some(_) => {
                counts.remove(&(package.to_string(), user));
            }
            None => {
                tracing::warn!(package, user, "pending release without matching acquire");
            }
        }
    }

    /// Current count for a (package, user). Zero when no dialog is in
    /// flight.
    pub fn count(&self, package: &str, user: i32) -> u32 {
        let counts = self.counts.lock().unwrap();
        counts
            .get(&(package.to_string(), user))
            .copied()
            .unwrap_or(0)
    }
}
