//! Grant records.
//!
//! A grant is the persistent permission state for one (package, user)
//! tuple. At most one record exists per tuple; `granted = false` denotes a
//! record that exists but is currently inactive (revoked or expired).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};

/// Grant survives reboots; revoked only by user or policy action.
pub const GRANT_PERSISTENT: u32 = 0x1;

/// Grant is revoked automatically when the issuing session's peer dies.
pub const GRANT_SESSION_ONLY: u32 = 0x2;

/// Record was revoked by an explicit user decision. Blocks future consent
/// dialogs until cleared by management action.
pub const REVOKED_BY_USER: u32 = 0x4;

/// Record was revoked by device policy.
pub const REVOKED_BY_POLICY: u32 = 0x8;

/// Schema version written into every new grant record.
pub const GRANT_RECORD_VERSION: i64 = 1;

fn default_version() -> i64 {
    GRANT_RECORD_VERSION
}

fn default_flags() -> u32 {
    GRANT_PERSISTENT
}

/// The persistent permission record for one (package, user).
///
/// Unknown JSON fields survive a read/write cycle via the flattened `extra`
/// map, and unknown flag bits survive because `flags` is stored raw. Higher
/// record versions are tolerated on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    /// Record schema version. Unknown higher values are tolerated on read.
    #[serde(default = "default_version")]
    pub version: i64,

    /// The package this record belongs to. Never empty.
    pub package_name: String,

    /// App-id component of the peer identity; stable across user re-creation.
    pub app_id: i32,

    /// The platform user this record belongs to.
    pub user_id: i32,

    /// Whether the permission is currently active.
    pub granted: bool,

    /// Wall-clock milliseconds of the most recent transition into
    /// `granted = true`.
    pub granted_at: i64,

    /// Expiry in wall-clock milliseconds; 0 means never.
    #[serde(default)]
    pub expires_at: i64,

    /// Flag bitfield. Unknown bits are preserved.
    #[serde(default = "default_flags")]
    pub flags: u32,

    /// Optional scope restriction. `None` and empty both mean "full".
    #[serde(default)]
    pub scope: Option<String>,

    /// Fields this version of the broker does not understand, preserved
    /// across read/write.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Grant {
    /// Create an active grant with the default persistent flags.
    pub fn new_granted(package_name: impl Into<String>, app_id: i32, user_id: i32, now: i64) -> Self {
        Self {
            version: GRANT_RECORD_VERSION,
            package_name: package_name.into(),
            app_id,
            user_id,
            granted: true,
            granted_at: now,
            expires_at: 0,
            flags: GRANT_PERSISTENT,
            scope: None,
            extra: Map::new(),
        }
    }

    /// Whether this grant survives reboots.
    pub fn is_persistent(&self) -> bool {
        self.flags & GRANT_PERSISTENT != 0
    }

    /// Whether this grant must be revoked when its issuing peer dies.
    pub fn is_session_only(&self) -> bool {
        self.flags & GRANT_SESSION_ONLY != 0
    }

    /// Whether an explicit user decision revoked this record.
    pub fn is_revoked_by_user(&self) -> bool {
        self.flags & REVOKED_BY_USER != 0
    }

    /// Whether device policy revoked this record.
    pub fn is_revoked_by_policy(&self) -> bool {
        self.flags & REVOKED_BY_POLICY != 0
    }

    /// Whether the grant has an expiry and it has passed.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at > 0 && now > self.expires_at
    }

    /// The effective scope string; `None` and empty mean "full".
    pub fn effective_scope(&self) -> &str {
        match self.scope.as_deref() {
            None | Some("") => "full",
            Some(s) => s,
        }
    }

    /// Check the model invariants.
    ///
    /// - non-empty package name
    /// - revoked flags imply `granted = false`
    /// - `granted = true` implies exactly one of PERSISTENT / SESSION_ONLY
    /// - `expires_at == 0 || expires_at > granted_at`
    pub fn validate(&self) -> Result<()> {
        if self.package_name.is_empty() {
            return Err(CoreError::InvalidGrant("empty package name".into()));
        }
        if self.granted && (self.is_revoked_by_user() || self.is_revoked_by_policy()) {
            return Err(CoreError::InvalidGrant(format!(
                "{} is granted but carries a revoked flag (flags=0x{:x})",
                self.package_name, self.flags
            )));
        }
        if self.granted {
            let persistent = self.is_persistent();
            let session_only = self.is_session_only();
            if persistent == session_only {
                return Err(CoreError::InvalidGrant(format!(
                    "{} must have exactly one of PERSISTENT / SESSION_ONLY (flags=0x{:x})",
                    self.package_name, self.flags
                )));
            }
        }
        if self.expires_at != 0 && self.expires_at <= self.granted_at {
            return Err(CoreError::InvalidGrant(format!(
                "{} expires at {} which is not after grant time {}",
                self.package_name, self.expires_at, self.granted_at
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_granted_is_valid() {
        let grant = Grant::new_granted("com.example.app", 10042, 0, 1_000);
        assert!(grant.validate().is_ok());
        assert!(grant.is_persistent());
        assert!(!grant.is_session_only());
        assert_eq!(grant.effective_scope(), "full");
    }

    #[test]
    fn test_granted_with_revoked_flag_is_invalid() {
        let mut grant = Grant::new_granted("com.example.app", 10042, 0, 1_000);
        grant.flags |= REVOKED_BY_USER;
        assert!(grant.validate().is_err());
    }

    #[test]
    fn test_granted_needs_exactly_one_lifetime_flag() {
        let mut grant = Grant::new_granted("com.example.app", 10042, 0, 1_000);
        grant.flags = GRANT_PERSISTENT | GRANT_SESSION_ONLY;
        assert!(grant.validate().is_err());

        grant.flags = 0;
        assert!(grant.validate().is_err());

        grant.flags = GRANT_SESSION_ONLY;
        assert!(grant.validate().is_ok());
    }

    #[test]
    fn test_expiry_must_follow_grant_time() {
        let mut grant = Grant::new_granted("com.example.app", 10042, 0, 1_000);
        grant.expires_at = 500;
        assert!(grant.validate().is_err());

        grant.expires_at = 2_000;
        assert!(grant.validate().is_ok());
        assert!(!grant.is_expired(1_500));
        assert!(grant.is_expired(2_001));
    }

    #[test]
    fn test_unknown_fields_roundtrip() {
        let json = r#"{
            "version": 3,
            "packageName": "com.example.app",
            "appId": 10042,
            "userId": 0,
            "granted": true,
            "grantedAt": 1000,
            "expiresAt": 0,
            "flags": 17,
            "scope": null,
            "futureField": {"nested": true}
        }"#;
        let grant: Grant = serde_json::from_str(json).unwrap();
        assert_eq!(grant.version, 3);
        assert_eq!(grant.flags, 17); // unknown bit 0x10 preserved
        assert!(grant.extra.contains_key("futureField"));

        let out = serde_json::to_value(&grant).unwrap();
        assert_eq!(out["futureField"]["nested"], true);
        assert_eq!(out["flags"], 17);
    }

    #[test]
    fn test_read_defaults() {
        // Minimal record as an older writer might have produced it.
        let json = r#"{
            "packageName": "com.example.app",
            "appId": 10042,
            "userId": 0,
            "granted": true,
            "grantedAt": 1000
        }"#;
        let grant: Grant = serde_json::from_str(json).unwrap();
        assert_eq!(grant.version, GRANT_RECORD_VERSION);
        assert_eq!(grant.flags, GRANT_PERSISTENT);
        assert_eq!(grant.expires_at, 0);
        assert_eq!(grant.scope, None);
    }

    #[test]
    fn test_empty_scope_means_full() {
        let mut grant = Grant::new_granted("com.example.app", 10042, 0, 1_000);
        grant.scope = Some(String::new());
        assert_eq!(grant.effective_scope(), "full");
        grant.scope = Some("shell".into());
        assert_eq!(grant.effective_scope(), "shell");
    }
}
