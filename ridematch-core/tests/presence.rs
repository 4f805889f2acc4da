mod support;

use ridematch_core::entities::SessionEndReason;
use ridematch_core::matching::PresenceChange;
use ridematch_sdk::objects::GeoPoint;
use support::{Harness, driver};
use time::Duration;

#[tokio::test]
async fn going_online_twice_is_a_no_op() {
    let h = Harness::new();
    let registry = h.engine.registry();

    let first = registry.online(driver(1), None).await.unwrap();
    let second = registry.online(driver(1), None).await.unwrap();

    assert!(first.changed());
    assert!(!second.changed());
    let (PresenceChange::WentOnline(a), PresenceChange::AlreadyOnline(b)) = (first, second) else {
        panic!("unexpected presence changes");
    };
    assert_eq!(a.session_id, b.session_id);
}

#[tokio::test]
async fn going_offline_while_offline_is_a_no_op() {
    let h = Harness::new();
    let registry = h.engine.registry();

    assert_eq!(
        registry.offline(driver(1)).await.unwrap(),
        PresenceChange::NotOnline
    );
    registry.online(driver(1), None).await.unwrap();
    let PresenceChange::WentOffline(session) = registry.offline(driver(1)).await.unwrap() else {
        panic!("expected the session to close");
    };
    assert_eq!(session.end_reason, Some(SessionEndReason::Offline));
    assert!(session.ended_at.is_some());
    assert_eq!(
        registry.offline(driver(1)).await.unwrap(),
        PresenceChange::NotOnline
    );
}

#[tokio::test]
async fn snapshot_lists_only_open_sessions() {
    let h = Harness::new();
    let registry = h.engine.registry();
    registry.online(driver(2), None).await.unwrap();
    registry.online(driver(1), None).await.unwrap();
    registry.online(driver(3), None).await.unwrap();
    registry.offline(driver(2)).await.unwrap();

    let online: Vec<_> = registry
        .snapshot_online_drivers()
        .await
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(online, vec![driver(1), driver(3)]);
}

#[tokio::test]
async fn heartbeat_refreshes_the_session_and_location() {
    let h = Harness::new();
    let registry = h.engine.registry();
    assert_eq!(
        registry.heartbeat(driver(1), None).await.unwrap(),
        PresenceChange::NotOnline
    );

    registry.online(driver(1), None).await.unwrap();
    h.advance(45);
    let here = GeoPoint {
        lat: 52.52,
        lng: 13.405,
    };
    let change = registry.heartbeat(driver(1), Some(here)).await.unwrap();
    let PresenceChange::Refreshed(session) = change else {
        panic!("expected a refreshed session");
    };
    assert_eq!(session.last_heartbeat_at, h.now());
    assert_eq!(session.location(), Some(here));
}

#[tokio::test]
async fn stale_sessions_close_with_the_timeout_reason() {
    let h = Harness::new();
    let registry = h.engine.registry();
    registry.online(driver(1), None).await.unwrap();

    h.advance(91);
    let closed = registry.expire_stale(Duration::seconds(90)).await.unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].end_reason, Some(SessionEndReason::HeartbeatTimeout));
    assert!(registry.session(driver(1)).await.unwrap().is_none());

    let reopened = registry.online(driver(1), None).await.unwrap();
    assert!(matches!(reopened, PresenceChange::WentOnline(_)));
}
