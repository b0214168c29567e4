//! Small shared identifiers.
//!
//! Identifiers that cross crate boundaries are newtypes to prevent misuse
//! at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pseudo user id meaning "every user" on the management surface.
///
/// Operations passed `USER_ALL` require the cross-user capability in
/// addition to the management capability.
pub const USER_ALL: i32 = -1;

/// An opaque session handle conferring one live permission session.
///
/// Tokens are minted by the session manager and are only meaningful inside
/// the broker process; clients treat them as opaque. A token is live until
/// its issuing peer dies, the session is revoked, or the grant expires.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(pub u64);

impl SessionToken {
    /// Create a token from its raw value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken({:016x})", self.0)
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_display_is_hex() {
        let token = SessionToken::from_raw(0xabcd);
        assert_eq!(format!("{}", token), "000000000000abcd");
    }

    #[test]
    fn test_token_roundtrip() {
        let token = SessionToken::from_raw(42);
        assert_eq!(token.as_raw(), 42);
    }
}
