//! Persistent, encrypted storage of grant records and audit events.
//!
//! A per-user reader-writer lock guards all I/O: any number of concurrent
//! readers per user, exclusive writes within a user, users fully
//! independent. Lock acquisition is synchronous.
//!
//! Every write replaces the whole file. The sealing primitive never
//! overwrites in place, so writes unlink first; a partial write from a
//! crash reads as "file absent" afterwards and the engines reissue state on
//! the next transition.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use shizuku_broker_core::{AuditEvent, Grant, REVOKED_BY_USER};

use crate::error::Result;
use crate::vault::MasterKey;

/// Maximum audit-log entries retained per user (oldest trimmed first).
pub const MAX_AUDIT_ENTRIES: usize = 200;

/// File-schema version written to every grants / audit file.
const FILE_FORMAT_VERSION: i64 = 1;

fn default_file_version() -> i64 {
    FILE_FORMAT_VERSION
}

/// Plaintext shape of `grants_u{user}.json`.
#[derive(Debug, Serialize, Deserialize)]
struct GrantsFile {
    #[serde(default = "default_file_version")]
    version: i64,
    #[serde(default)]
    grants: Vec<Grant>,
}

/// Plaintext shape of `audit_u{user}.json`.
#[derive(Debug, Serialize, Deserialize)]
struct AuditFile {
    #[serde(default = "default_file_version")]
    version: i64,
    #[serde(default)]
    events: Vec<AuditEvent>,
}

/// Encrypted persistent store of grants and audit events.
///
/// Shared between the permission engine, the management engine, the
/// supervisor, and the lifecycle hooks; one instance per broker so every
/// surface observes the same state.
pub struct PermissionStore {
    base_dir: PathBuf,
    key: MasterKey,

    // Per-user read-write locks. Access to the map itself is synchronized.
    locks: Mutex<HashMap<i32, Arc<RwLock<()>>>>,
}

impl PermissionStore {
    /// Open the store rooted at `base_dir`, creating the directory if
    /// needed.
    pub fn open(base_dir: impl Into<PathBuf>, key: MasterKey) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            key,
            locks: Mutex::new(HashMap::new()),
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Grants
    // ─────────────────────────────────────────────────────────────────────

    /// All grant records for `user`.
    ///
    /// Returns an empty list if the file does not exist or cannot be read.
    pub fn grants(&self, user: i32) -> Vec<Grant> {
        let lock = self.user_lock(user);
        let _guard = lock.read().unwrap();
        self.read_grants(user)
    }

    /// The grant record for `package` in `user`, if one exists.
    pub fn grant(&self, package: &str, user: i32) -> Option<Grant> {
        self.grants(user)
            .into_iter()
            .find(|g| g.package_name == package)
    }

    /// Insert or replace the record for `(grant.package_name, grant.user_id)`.
    ///
    /// Records that violate the model invariants are still written (the
    /// store is not the policy layer) but logged.
    pub fn put_grant(&self, grant: Grant) {
        if let Err(e) = grant.validate() {
            warn!(error = %e, "storing grant that violates model invariants");
        }
        let user = grant.user_id;
        let lock = self.user_lock(user);
        let _guard = lock.write().unwrap();

        let mut list = self.read_grants(user);
        list.retain(|g| g.package_name != grant.package_name);
        list.push(grant);
        self.write_grants(user, &list);
    }

    /// Mark the grant for `package` as revoked: `granted = false` and
    /// `REVOKED_BY_USER` ORed into the flags.
    ///
    /// Returns the updated record, or `None` if no record existed.
    pub fn revoke(&self, package: &str, user: i32) -> Option<Grant> {
        let lock = self.user_lock(user);
        let _guard = lock.write().unwrap();

        let mut list = self.read_grants(user);
        let entry = list.iter_mut().find(|g| g.package_name == package)?;
        entry.granted = false;
        entry.flags |= REVOKED_BY_USER;
        let updated = entry.clone();
        self.write_grants(user, &list);
        Some(updated)
    }

    /// Revoke every grant for `user` in a single write.
    ///
    /// Returns the updated records.
    pub fn revoke_all(&self, user: i32) -> Vec<Grant> {
        let lock = self.user_lock(user);
        let _guard = lock.write().unwrap();

        let mut list = self.read_grants(user);
        for grant in &mut list {
            grant.granted = false;
            grant.flags |= REVOKED_BY_USER;
        }
        self.write_grants(user, &list);
        list
    }

    /// Remove all records for `user`: unlink both files.
    pub fn delete_user(&self, user: i32) {
        let lock = self.user_lock(user);
        let _guard = lock.write().unwrap();

        unlink(&self.grants_file(user));
        unlink(&self.audit_file(user));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Audit log
    // ─────────────────────────────────────────────────────────────────────

    /// Prepend an audit event, trimming the tail to [`MAX_AUDIT_ENTRIES`].
    pub fn append_audit(&self, event: AuditEvent) {
        let user = event.user_id;
        let lock = self.user_lock(user);
        let _guard = lock.write().unwrap();

        let mut list = self.read_audit(user);
        list.insert(0, event);
        list.truncate(MAX_AUDIT_ENTRIES);
        self.write_audit(user, &list);
    }

    /// Audit events for `user`, newest first, optionally filtered to one
    /// package.
    pub fn audit(&self, package: Option<&str>, user: i32) -> Vec<AuditEvent> {
        let lock = self.user_lock(user);
        let _guard = lock.read().unwrap();

        let all = self.read_audit(user);
        match package {
            None => all,
            Some(pkg) => all
                .into_iter()
                .filter(|e| e.package_name == pkg)
                .collect(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lock management
    // ─────────────────────────────────────────────────────────────────────

    fn user_lock(&self, user: i32) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap();
        Arc::clone(locks.entry(user).or_default())
    }

    // ─────────────────────────────────────────────────────────────────────
    // File I/O (callers hold the appropriate per-user lock)
    // ─────────────────────────────────────────────────────────────────────

    fn read_grants(&self, user: i32) -> Vec<Grant> {
        match self.read_plaintext(&self.grants_file(user)) {
            Some(bytes) => match serde_json::from_slice::<GrantsFile>(&bytes) {
                Ok(file) => file.grants,
                Err(e) => {
                    error!(user, error = %e, "grants file failed to parse; treating as empty");
                    Vec::new()
                }
            },
            None => Vec::new(),
        }
    }

    fn read_audit(&self, user: i32) -> Vec<AuditEvent> {
        match self.read_plaintext(&self.audit_file(user)) {
            Some(bytes) => match serde_json::from_slice::<AuditFile>(&bytes) {
                Ok(file) => file.events,
                Err(e) => {
                    error!(user, error = %e, "audit file failed to parse; treating as empty");
                    Vec::new()
                }
            },
            None => Vec::new(),
        }
    }

    fn write_grants(&self, user: i32, grants: &[Grant]) {
        let file = GrantsFile {
            version: FILE_FORMAT_VERSION,
            grants: grants.to_vec(),
        };
        match serde_json::to_vec(&file) {
            Ok(bytes) => self.write_plaintext(&self.grants_file(user), &bytes),
            Err(e) => error!(user, error = %e, "failed to serialize grants file"),
        }
    }

    fn write_audit(&self, user: i32, events: &[AuditEvent]) {
        let file = AuditFile {
            version: FILE_FORMAT_VERSION,
            events: events.to_vec(),
        };
        match serde_json::to_vec(&file) {
            Ok(bytes) => self.write_plaintext(&self.audit_file(user), &bytes),
            Err(e) => error!(user, error = %e, "failed to serialize audit file"),
        }
    }

    fn read_plaintext(&self, path: &Path) -> Option<Vec<u8>> {
        let sealed = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                error!(path = %path.display(), error = %e, "read failed; treating as empty");
                return None;
            }
        };
        match self.key.open(&sealed) {
            Ok(plaintext) => Some(plaintext),
            Err(e) => {
                // Corrupt or partially written file: the state machine
                // reissues on the next transition.
                warn!(path = %path.display(), error = %e, "unseal failed; treating as empty");
                None
            }
        }
    }

    fn write_plaintext(&self, path: &Path, plaintext: &[u8]) {
        // Unlink first: the sealing primitive never overwrites in place.
        unlink(path);
        let sealed = match self.key.seal(plaintext) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(path = %path.display(), error = %e, "seal failed; write dropped");
                return;
            }
        };
        if let Err(e) = fs::write(path, sealed) {
            error!(path = %path.display(), error = %e, "write failed");
        } else {
            debug!(path = %path.display(), "wrote sealed file");
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // File paths
    // ─────────────────────────────────────────────────────────────────────

    fn grants_file(&self, user: i32) -> PathBuf {
        self.base_dir.join(format!("grants_u{user}.json"))
    }

    fn audit_file(&self, user: i32) -> PathBuf {
        self.base_dir.join(format!("audit_u{user}.json"))
    }
}

fn unlink(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "unlink failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shizuku_broker_core::{AuditEvent, EventType, Grant, GRANT_PERSISTENT};
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> PermissionStore {
        PermissionStore::open(dir.path(), MasterKey::from_bytes([0x42; 32])).unwrap()
    }

    fn make_grant(package: &str, user: i32) -> Grant {
        Grant::new_granted(package, 10042, user, 1_000)
    }

    #[test]
    fn test_missing_files_read_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(store.grants(0).is_empty());
        assert!(store.audit(None, 0).is_empty());
        assert!(store.grant("com.example.app", 0).is_none());
    }

    #[test]
    fn test_put_and_get_grant() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let grant = make_grant("com.example.app", 0);
        store.put_grant(grant.clone());

        let read = store.grant("com.example.app", 0).unwrap();
        assert_eq!(read, grant);
    }

    #[test]
    fn test_put_replaces_same_package() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.put_grant(make_grant("com.example.app", 0));
        let mut updated = make_grant("com.example.app", 0);
        updated.granted_at = 9_999;
        store.put_grant(updated);

        let list = store.grants(0);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].granted_at, 9_999);
    }

    #[test]
    fn test_revoke_sets_flag_and_clears_granted() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.put_grant(make_grant("com.example.app", 0));
        let revoked = store.revoke("com.example.app", 0).unwrap();
        assert!(!revoked.granted);
        assert_eq!(revoked.flags, GRANT_PERSISTENT | REVOKED_BY_USER);

        // The write is visible on re-read.
        let read = store.grant("com.example.app", 0).unwrap();
        assert!(!read.granted);
    }

    #[test]
    fn test_revoke_absent_is_none() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(store.revoke("com.missing", 0).is_none());
    }

    #[test]
    fn test_revoke_all_is_one_write_for_every_record() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.put_grant(make_grant("com.a", 0));
        store.put_grant(make_grant("com.b", 0));
        store.put_grant(make_grant("com.c", 10));

        let revoked = store.revoke_all(0);
        assert_eq!(revoked.len(), 2);
        assert!(revoked.iter().all(|g| !g.granted && g.is_revoked_by_user()));

        // Other users untouched.
        assert!(store.grant("com.c", 10).unwrap().granted);
    }

    #[test]
    fn test_users_are_independent() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.put_grant(make_grant("com.example.app", 0));
        store.put_grant(make_grant("com.example.app", 10));

        store.delete_user(0);
        assert!(store.grant("com.example.app", 0).is_none());
        assert!(store.grant("com.example.app", 10).is_some());
    }

    #[test]
    fn test_delete_user_unlinks_both_files() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.put_grant(make_grant("com.example.app", 0));
        store.append_audit(AuditEvent::new(EventType::Grant, "com.example.app", 10042, 0, 1_000));
        store.delete_user(0);

        assert!(!dir.path().join("grants_u0.json").exists());
        assert!(!dir.path().join("audit_u0.json").exists());
    }

    #[test]
    fn test_audit_newest_first_and_filter() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.append_audit(AuditEvent::new(EventType::Grant, "com.a", 10042, 0, 1_000));
        store.append_audit(AuditEvent::new(EventType::Revoke, "com.b", 10043, 0, 2_000));
        store.append_audit(AuditEvent::new(EventType::Use, "com.a", 10042, 0, 3_000));

        let all = store.audit(None, 0);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].event_at, 3_000);
        assert_eq!(all[2].event_at, 1_000);

        let filtered = store.audit(Some("com.a"), 0);
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|e| e.package_name == "com.a"));
    }

    #[test]
    fn test_audit_trims_to_cap() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        for i in 0..(MAX_AUDIT_ENTRIES as i64 + 25) {
            store.append_audit(AuditEvent::new(EventType::Use, "com.a", 10042, 0, i));
        }

        let all = store.audit(None, 0);
        assert_eq!(all.len(), MAX_AUDIT_ENTRIES);
        // Newest survives, oldest trimmed.
        assert_eq!(all[0].event_at, MAX_AUDIT_ENTRIES as i64 + 24);
        assert_eq!(all.last().unwrap().event_at, 25);
    }

    #[test]
    fn test_audit_survives_grant_deletion() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.put_grant(make_grant("com.example.app", 0));
        store.append_audit(AuditEvent::new(EventType::Grant, "com.example.app", 10042, 0, 1_000));
        store.revoke("com.example.app", 0);

        assert_eq!(store.audit(Some("com.example.app"), 0).len(), 1);
    }

    #[test]
    fn test_corrupt_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.put_grant(make_grant("com.example.app", 0));
        std::fs::write(dir.path().join("grants_u0.json"), b"garbage").unwrap();

        assert!(store.grants(0).is_empty());
    }

    #[test]
    fn test_wrong_key_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_store(&dir);
            store.put_grant(make_grant("com.example.app", 0));
        }
        let other =
            PermissionStore::open(dir.path(), MasterKey::from_bytes([0x43; 32])).unwrap();
        assert!(other.grants(0).is_empty());
    }

    #[test]
    fn test_file_on_disk_is_sealed() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.put_grant(make_grant("com.example.app", 0));

        let raw = std::fs::read(dir.path().join("grants_u0.json")).unwrap();
        let needle = b"com.example.app";
        assert!(
            !raw.windows(needle.len()).any(|w| w == needle),
            "package name must not appear in the sealed file"
        );
    }

    #[test]
    fn test_unknown_fields_survive_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut grant = make_grant("com.example.app", 0);
        grant.flags |= 0x40; // unknown bit
        grant
            .extra
            .insert("futureField".into(), serde_json::json!({"x": 1}));
        store.put_grant(grant);

        let read = store.grant("com.example.app", 0).unwrap();
        assert_eq!(read.flags & 0x40, 0x40);
        assert_eq!(read.extra["futureField"]["x"], 1);
    }
}
