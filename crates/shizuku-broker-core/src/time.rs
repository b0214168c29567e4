//! Wall-clock helpers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Get current time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}
