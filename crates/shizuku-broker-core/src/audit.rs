//! Audit events.
//!
//! Every grant, revoke, deny, expiry, and elevated use appends an event to
//! the per-user audit log. The log is newest-first and bounded; it survives
//! package uninstall for forensic retention.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Schema version written into every new audit event.
pub const AUDIT_EVENT_VERSION: i64 = 1;

/// Well-known audit event types.
///
/// The on-disk field is a raw integer so records written by a newer broker
/// with event types this version does not know still parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// A consent dialog resolved to allow and a grant was written.
    Grant,
    /// A grant transitioned to revoked (user, management, or session death).
    Revoke,
    /// An elevated operation ran under an active grant.
    Use,
    /// A consent dialog resolved to deny.
    Deny,
    /// A time-limited grant passed its expiry.
    Expire,
}

impl EventType {
    /// The on-disk integer code.
    pub const fn code(&self) -> i32 {
        match self {
            EventType::Grant => 1,
            EventType::Revoke => 2,
            EventType::Use => 3,
            EventType::Deny => 4,
            EventType::Expire => 5,
        }
    }

    /// Parse a known code; `None` for codes this version does not know.
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(EventType::Grant),
            2 => Some(EventType::Revoke),
            3 => Some(EventType::Use),
            4 => Some(EventType::Deny),
            5 => Some(EventType::Expire),
            _ => None,
        }
    }
}

fn default_version() -> i64 {
    AUDIT_EVENT_VERSION
}

/// One entry in the per-user audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Record schema version. Unknown higher values are tolerated on read.
    #[serde(default = "default_version")]
    pub version: i64,

    /// Raw event-type code; see [`EventType`].
    pub event_type: i32,

    /// The package the event concerns.
    pub package_name: String,

    /// App-id component of the affected peer identity.
    pub app_id: i32,

    /// The platform user the event concerns.
    pub user_id: i32,

    /// Wall-clock milliseconds at which the event occurred.
    pub event_at: i64,

    /// Optional free-form context (e.g. the revoking caller's uid, or a
    /// redacted command summary on USE).
    #[serde(default)]
    pub detail: Option<String>,

    /// Fields this version of the broker does not understand, preserved
    /// across read/write.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuditEvent {
    /// Build an event with the current schema version.
    pub fn new(
        event_type: EventType,
        package_name: impl Into<String>,
        app_id: i32,
        user_id: i32,
        event_at: i64,
    ) -> Self {
        Self {
            version: AUDIT_EVENT_VERSION,
            event_type: event_type.code(),
            package_name: package_name.into(),
            app_id,
            user_id,
            event_at,
            detail: None,
            extra: Map::new(),
        }
    }

    /// Attach a free-form detail string.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// The decoded event type, if this version knows the code.
    pub fn kind(&self) -> Option<EventType> {
        EventType::from_code(self.event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_codes() {
        assert_eq!(EventType::Grant.code(), 1);
        assert_eq!(EventType::Expire.code(), 5);
        assert_eq!(EventType::from_code(2), Some(EventType::Revoke));
        assert_eq!(EventType::from_code(99), None);
    }

    #[test]
    fn test_builder() {
        let event = AuditEvent::new(EventType::Revoke, "com.example.app", 10042, 0, 5_000)
            .with_detail("callerUid=1000");
        assert_eq!(event.kind(), Some(EventType::Revoke));
        assert_eq!(event.detail.as_deref(), Some("callerUid=1000"));
    }

    #[test]
    fn test_unknown_event_type_survives_roundtrip() {
        let json = r#"{
            "version": 2,
            "eventType": 42,
            "packageName": "com.example.app",
            "appId": 10042,
            "userId": 0,
            "eventAt": 1000,
            "auxiliary": "kept"
        }"#;
        let event: AuditEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, 42);
        assert_eq!(event.kind(), None);

        let out = serde_json::to_value(&event).unwrap();
        assert_eq!(out["eventType"], 42);
        assert_eq!(out["auxiliary"], "kept");
    }

    #[test]
    fn test_camel_case_wire_names() {
        let event = AuditEvent::new(EventType::Use, "com.example.app", 10042, 0, 1_000);
        let out = serde_json::to_value(&event).unwrap();
        assert!(out.get("packageName").is_some());
        assert!(out.get("eventAt").is_some());
        assert!(out.get("appId").is_some());
    }
}
