//! End-to-end broker scenarios.
//!
//! Each test drives the assembled broker through its public surfaces with
//! fake collaborators and asserts the full set of observable effects:
//! stored records, audit entries, notifications, callback deliveries, and
//! counter state.

use std::sync::Arc;
use std::time::Duration;

use shizuku_broker::{BrokerError, MAX_PENDING_REQUESTS, MAX_PER_OWNER_PROCESSES};
use shizuku_broker_core::{
    now_millis, EventType, Grant, GRANT_PERSISTENT, GRANT_SESSION_ONLY, REVOKED_BY_USER,
};
use shizuku_broker_testkit::{BrokerFixture, CollectingCallback, FakeLivenessHandle};

fn sh_sleep() -> Vec<String> {
    vec!["/bin/sh".into(), "-c".into(), "sleep 60".into()]
}

#[test]
fn fresh_grant_path() {
    let fx = BrokerFixture::new();
    let peer = fx.install_app("com.x", 0, 10042);
    let cb = CollectingCallback::new();
    let cb_liveness = FakeLivenessHandle::new();

    let before = now_millis();
    fx.broker
        .service
        .request_permission(peer, "com.x", 0, cb.clone(), cb_liveness)
        .unwrap();

    // Dialog queued, not yet resolved.
    assert_eq!(fx.consent.pending(), 1);
    let request = fx.consent.peek_request().unwrap();
    assert_eq!(request.package_name, "com.x");
    assert_eq!(request.app_id, 10042);
    assert_eq!(request.user_id, 0);
    assert!(cb.outcomes().is_empty());

    assert!(fx.consent.allow_next());

    // Stored record.
    let grant = fx.broker.store.grant("com.x", 0).unwrap();
    assert!(grant.granted);
    assert_eq!(grant.app_id, 10042);
    assert_eq!(grant.user_id, 0);
    assert_eq!(grant.flags, GRANT_PERSISTENT);
    assert_eq!(grant.expires_at, 0);
    assert!(grant.granted_at >= before);
    grant.validate().unwrap();

    // Newest audit entry is the GRANT.
    let audit = fx.broker.store.audit(None, 0);
    assert_eq!(audit[0].kind(), Some(EventType::Grant));

    // One notification, granted=true.
    let changes = fx.events.changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].package_name, "com.x");
    assert!(changes[0].granted);

    // Exactly one callback delivery, and the token attaches.
    let outcomes = cb.outcomes();
    assert_eq!(outcomes.len(), 1);
    let token = cb.granted_token().unwrap();
    let peer_liveness = FakeLivenessHandle::new();
    fx.broker
        .service
        .attach_session(peer, token, peer_liveness)
        .unwrap();

    assert_eq!(fx.broker.service.pending_count("com.x", 0), 0);
}

#[test]
fn permanent_deny_shortcut() {
    let fx = BrokerFixture::new();
    let peer = fx.install_app("com.x", 0, 10042);

    // A user-revoked record exists.
    let mut record = Grant::new_granted("com.x", 10042, 0, 1_000);
    record.granted = false;
    record.flags = REVOKED_BY_USER;
    fx.broker.store.put_grant(record);

    let cb = CollectingCallback::new();
    fx.broker
        .service
        .request_permission(peer, "com.x", 0, cb.clone(), FakeLivenessHandle::new())
        .unwrap();

    // No dialog, immediate deny, counter untouched.
    assert_eq!(fx.consent.pending(), 0);
    assert!(cb.denied());
    assert_eq!(cb.outcomes().len(), 1);
    assert_eq!(fx.broker.service.pending_count("com.x", 0), 0);
}

#[test]
fn rate_limit_caps_pending_dialogs() {
    let fx = BrokerFixture::new();
    let peer = fx.install_app("com.x", 0, 10042);

    let callbacks: Vec<_> = (0..4).map(|_| CollectingCallback::new()).collect();
    for cb in callbacks.iter().take(MAX_PENDING_REQUESTS as usize) {
        fx.broker
            .service
            .request_permission(peer, "com.x", 0, cb.clone(), FakeLivenessHandle::new())
            .unwrap();
    }

    // The fourth is refused without disturbing the counter.
    let err = fx
        .broker
        .service
        .request_permission(
            peer,
            "com.x",
            0,
            callbacks[3].clone(),
            FakeLivenessHandle::new(),
        )
        .unwrap_err();
    assert!(matches!(err, BrokerError::RateLimit { .. }));
    assert_eq!(fx.consent.pending(), MAX_PENDING_REQUESTS as usize);
    assert_eq!(
        fx.broker.service.pending_count("com.x", 0),
        MAX_PENDING_REQUESTS
    );

    // Dialogs resolve in FIFO order; the counter drains to zero.
    assert!(fx.consent.deny_next());
    assert_eq!(fx.broker.service.pending_count("com.x", 0), 2);
    assert!(fx.consent.deny_next());
    assert!(fx.consent.deny_next());
    assert_eq!(fx.broker.service.pending_count("com.x", 0), 0);

    for cb in callbacks.iter().take(3) {
        assert!(cb.denied());
    }
}

#[test]
fn session_only_grant_revoked_on_peer_death() {
    let fx = BrokerFixture::new();
    let peer = fx.install_app("com.x", 0, 10042);

    let mut record = Grant::new_granted("com.x", 10042, 0, 1_000);
    record.flags = GRANT_SESSION_ONLY;
    fx.broker.store.put_grant(record);

    // The existing valid grant short-circuits to a token.
    let cb = CollectingCallback::new();
    fx.broker
        .service
        .request_permission(peer, "com.x", 0, cb.clone(), FakeLivenessHandle::new())
        .unwrap();
    let token = cb.granted_token().unwrap();

    let peer_liveness = FakeLivenessHandle::new();
    fx.broker
        .service
        .attach_session(peer, token, peer_liveness.clone())
        .unwrap();

    peer_liveness.kill();

    // Record transitioned, REVOKE audited once, one notification.
    let stored = fx.broker.store.grant("com.x", 0).unwrap();
    assert!(!stored.granted);
    assert_ne!(stored.flags & REVOKED_BY_USER, 0);
    assert_ne!(stored.flags & GRANT_SESSION_ONLY, 0);

    let revokes: Vec<_> = fx
        .broker
        .store
        .audit(None, 0)
        .into_iter()
        .filter(|e| e.kind() == Some(EventType::Revoke))
        .collect();
    assert_eq!(revokes.len(), 1);
    assert_eq!(revokes[0].detail.as_deref(), Some("session died"));

    let changes = fx.events.changes();
    assert_eq!(changes.len(), 1);
    assert!(!changes[0].granted);

    assert_eq!(fx.broker.sessions.live_count(), 0);
}

#[test]
fn expired_grant_reenters_dialog_path() {
    let fx = BrokerFixture::new();
    let peer = fx.install_app("com.x", 0, 10042);

    let now = now_millis();
    let mut record = Grant::new_granted("com.x", 10042, 0, now - 10_000);
    record.expires_at = now - 1;
    fx.broker.store.put_grant(record);

    let cb = CollectingCallback::new();
    fx.broker
        .service
        .request_permission(peer, "com.x", 0, cb.clone(), FakeLivenessHandle::new())
        .unwrap();

    // Store transitioned and the expiry was audited.
    let stored = fx.broker.store.grant("com.x", 0).unwrap();
    assert!(!stored.granted);
    let audit = fx.broker.store.audit(None, 0);
    assert_eq!(audit[0].kind(), Some(EventType::Expire));

    // The dialog path runs.
    assert_eq!(fx.consent.pending(), 1);
    assert!(cb.outcomes().is_empty());

    assert!(fx.consent.allow_next());
    assert!(fx.broker.store.grant("com.x", 0).unwrap().granted);
    assert!(cb.granted_token().is_some());
}

#[test]
fn management_revoke_all_is_per_user() {
    let fx = BrokerFixture::new();
    for (package, user, app_id) in [
        ("com.a", 0, 10001),
        ("com.b", 0, 10002),
        ("com.c", 10, 10001),
        ("com.d", 10, 10002),
    ] {
        fx.broker
            .store
            .put_grant(Grant::new_granted(package, app_id, user, 1_000));
    }

    let mgmt = fx.management_caller();
    fx.broker.manager.revoke_all_permissions(mgmt, 0).unwrap();

    // Both user-0 records revoked.
    for package in ["com.a", "com.b"] {
        let g = fx.broker.store.grant(package, 0).unwrap();
        assert!(!g.granted);
        assert!(g.is_revoked_by_user());
    }

    // Two REVOKE audits for user 0 only.
    let revokes: Vec<_> = fx
        .broker
        .store
        .audit(None, 0)
        .into_iter()
        .filter(|e| e.kind() == Some(EventType::Revoke))
        .collect();
    assert_eq!(revokes.len(), 2);
    assert!(revokes
        .iter()
        .all(|e| e.detail.as_deref().unwrap().starts_with("bulk;")));
    assert!(fx.broker.store.audit(None, 10).is_empty());

    // Two notifications, both granted=false.
    let changes = fx.events.changes();
    assert_eq!(changes.len(), 2);
    assert!(changes.iter().all(|c| !c.granted && c.user_id == 0));

    // User 10 untouched.
    assert!(fx.broker.store.grant("com.c", 10).unwrap().granted);
    assert!(fx.broker.store.grant("com.d", 10).unwrap().granted);
}

#[test]
fn process_caps_and_owner_death_cleanup() {
    let fx = BrokerFixture::new();
    let peer = fx.install_app("com.x", 0, 10042);
    fx.broker
        .store
        .put_grant(Grant::new_granted("com.x", 10042, 0, 1_000));

    let owner_liveness = FakeLivenessHandle::new();
    let mut children = Vec::new();
    for _ in 0..MAX_PER_OWNER_PROCESSES {
        let child = fx
            .broker
            .supervisor
            .new_process(peer, owner_liveness.clone(), &sh_sleep(), None, None)
            .unwrap()
            .expect("spawn");
        children.push(child);
    }
    assert_eq!(fx.broker.supervisor.owner_count(peer), MAX_PER_OWNER_PROCESSES);

    // The ninth is refused.
    let err = fx
        .broker
        .supervisor
        .new_process(peer, owner_liveness.clone(), &sh_sleep(), None, None)
        .unwrap_err();
    assert!(matches!(err, BrokerError::ResourceExhausted(_)));

    // Owner death destroys every child and restores the counters.
    owner_liveness.kill();
    for child in &children {
        assert!(child.wait_timeout(Duration::from_secs(5)));
        assert!(!child.alive());
    }
    assert_eq!(fx.broker.supervisor.global_count(), 0);
    assert_eq!(fx.broker.supervisor.owner_count(peer), 0);

    // Every spawn was audited as a USE with a redacted summary.
    let uses: Vec<_> = fx
        .broker
        .store
        .audit(Some("com.x"), 0)
        .into_iter()
        .filter(|e| e.kind() == Some(EventType::Use))
        .collect();
    assert_eq!(uses.len(), MAX_PER_OWNER_PROCESSES);
    assert!(uses
        .iter()
        .all(|e| e.detail.as_deref() == Some("/bin/sh (+2 args)")));
}
