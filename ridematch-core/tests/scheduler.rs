mod support;

use ridematch_core::config::MatchingConfig;
use ridematch_core::entities::{OfferState, RideStatus};
use ridematch_core::events::NotificationEvent;
use ridematch_core::matching::{DispatchOutcome, MatchError};
use ridematch_core::processors::MatchScheduler;
use support::{Harness, ScriptedCalendar, START};
use time::Duration;

#[tokio::test]
async fn sweep_after_the_offer_window_expires_and_redispatches() {
    let mut h = Harness::new();
    let d1 = h.online_driver(1, &[]).await;
    let created = h.immediate_ride(&[]).await;
    let ride_id = created.ride.ride_id;
    h.drain_notifications();
    let scheduler = MatchScheduler::new(h.engine.clone());

    h.advance(31);
    let report = scheduler.tick().await;
    assert_eq!(report.expired_offers, 1);
    assert_eq!(report.dispatched, 1);

    let offers = h.engine.store().offers_for_ride(ride_id).await.unwrap();
    assert_eq!(offers.len(), 2);
    assert_eq!(offers[0].state, OfferState::Expired);
    assert_eq!(offers[1].state, OfferState::Pending);
    assert_eq!(offers[1].round, 2);
    assert_eq!(offers[1].driver_id, d1);

    let ride = h.engine.store().ride(ride_id).await.unwrap().unwrap();
    assert_eq!(ride.status, RideStatus::Offering);
    assert_eq!(ride.dispatch_rounds, 2);
    assert!(h.drain_notifications().iter().any(|e| matches!(
        e,
        NotificationEvent::OfferCreated { driver_id, .. } if *driver_id == d1
    )));
}

#[tokio::test]
async fn sweep_leaves_rides_with_live_offers_alone() {
    let h = Harness::new();
    h.online_driver(1, &[]).await;
    let created = h.immediate_ride(&[]).await;
    let scheduler = MatchScheduler::new(h.engine.clone());

    h.advance(10);
    let report = scheduler.tick().await;
    assert!(report.is_idle());
    let ride = h.engine.store().ride(created.ride.ride_id).await.unwrap().unwrap();
    assert_eq!(ride.dispatch_rounds, 1);
}

#[tokio::test]
async fn unmatched_ride_is_picked_up_once_a_driver_comes_online() {
    let h = Harness::new();
    let created = h.immediate_ride(&[]).await;
    assert_eq!(created.dispatch, DispatchOutcome::NoEligibleDrivers);
    let scheduler = MatchScheduler::new(h.engine.clone());

    h.advance(5);
    let d1 = h.online_driver(1, &[]).await;
    let report = scheduler.tick().await;
    assert_eq!(report.dispatched, 1);

    let offers = h
        .engine
        .live_offers_for_driver(d1)
        .await
        .unwrap();
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].ride_id, created.ride.ride_id);
}

#[tokio::test]
async fn ride_past_its_deadline_expires_and_the_rider_is_told() {
    let mut h = Harness::new();
    let created = h.immediate_ride(&[]).await;
    let ride_id = created.ride.ride_id;
    let scheduler = MatchScheduler::new(h.engine.clone());
    let mut statuses = h.engine.events().subscribe_status();

    h.advance(10 * 60);
    let report = scheduler.tick().await;
    assert_eq!(report.expired_rides, 1);

    let ride = h.engine.store().ride(ride_id).await.unwrap().unwrap();
    assert_eq!(ride.status, RideStatus::Expired);
    assert!(h.drain_notifications().iter().any(|e| matches!(
        e,
        NotificationEvent::RideUnmatched { ride_id: id, .. } if *id == ride_id
    )));
    let update = statuses.try_recv().unwrap();
    assert_eq!(update.ride_id, ride_id);
    assert_eq!(update.status, RideStatus::Expired);

    let listed = h.engine.rides_by_status(RideStatus::Expired, 10).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn expired_ride_can_be_dispatched_again_by_an_admin() {
    let h = Harness::new();
    let created = h.immediate_ride(&[]).await;
    let ride_id = created.ride.ride_id;
    let scheduler = MatchScheduler::new(h.engine.clone());
    h.advance(10 * 60);
    scheduler.tick().await;

    let d1 = h.online_driver(1, &[]).await;
    let outcome = h.engine.manual_dispatch(ride_id).await.unwrap();
    assert!(matches!(outcome, DispatchOutcome::Offered { live: 1, .. }));

    let ride = h.engine.store().ride(ride_id).await.unwrap().unwrap();
    assert_eq!(ride.status, RideStatus::Offering);
    assert_eq!(ride.match_deadline, h.now() + Duration::minutes(10));
    assert_eq!(h.engine.live_offers_for_driver(d1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn manual_dispatch_refuses_assigned_rides() {
    let h = Harness::new();
    let d1 = h.online_driver(1, &[]).await;
    let created = h.immediate_ride(&[]).await;
    let DispatchOutcome::Offered { created: offers, .. } = created.dispatch else {
        panic!("expected offers");
    };
    h.engine.accept_offer(offers[0].offer_id, d1).await.unwrap();

    let result = h.engine.manual_dispatch(created.ride.ride_id).await;
    assert!(matches!(
        result,
        Err(MatchError::RideNotDispatchable(RideStatus::Assigned))
    ));
}

#[tokio::test]
async fn unmatched_prebooked_ride_is_retried_long_before_pickup() {
    let h = Harness::new();
    let created = h.prebooked_ride(START + Duration::days(2)).await;
    assert_eq!(created.dispatch, DispatchOutcome::NoEligibleDrivers);
    let scheduler = MatchScheduler::new(h.engine.clone());

    h.advance(10);
    let d1 = h.online_driver(1, &[]).await;
    assert_eq!(scheduler.tick().await.dispatched, 1);

    let ride = h.engine.store().ride(created.ride.ride_id).await.unwrap().unwrap();
    assert_eq!(ride.status, RideStatus::Offering);
    let offers = h.engine.live_offers_for_driver(d1).await.unwrap();
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].ride_id, created.ride.ride_id);
}

#[tokio::test]
async fn rides_inside_the_lead_window_are_swept_first() {
    let h = Harness::with_config(MatchingConfig {
        sweep_batch_size: 1,
        ..MatchingConfig::default()
    });
    let later = h.prebooked_ride(START + Duration::days(2)).await;
    h.advance(1);
    let soon = h.prebooked_ride(START + Duration::minutes(40)).await;
    assert_eq!(later.dispatch, DispatchOutcome::NoEligibleDrivers);
    assert_eq!(soon.dispatch, DispatchOutcome::NoEligibleDrivers);
    let scheduler = MatchScheduler::new(h.engine.clone());

    let d1 = h.online_driver(1, &[]).await;
    assert_eq!(scheduler.tick().await.dispatched, 1);
    let offers = h.engine.live_offers_for_driver(d1).await.unwrap();
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].ride_id, soon.ride.ride_id);

    // The older ride is next once the urgent one is covered.
    assert_eq!(scheduler.tick().await.dispatched, 1);
    let ride = h.engine.store().ride(later.ride.ride_id).await.unwrap().unwrap();
    assert_eq!(ride.status, RideStatus::Offering);
}

#[tokio::test]
async fn drivers_without_heartbeats_are_taken_offline() {
    let h = Harness::new();
    let d1 = h.online_driver(1, &[]).await;
    let d2 = h.online_driver(2, &[]).await;
    let scheduler = MatchScheduler::new(h.engine.clone());

    h.advance(60);
    h.engine.registry().heartbeat(d2, None).await.unwrap();
    h.advance(31);
    let report = scheduler.tick().await;
    assert_eq!(report.closed_sessions, 1);

    let online = h.engine.registry().snapshot_online_drivers().await.unwrap();
    assert!(!online.contains(&d1));
    assert!(online.contains(&d2));
    assert!(h.engine.registry().session(d1).await.unwrap().is_none());
}

#[tokio::test]
async fn failed_calendar_write_is_retried_with_backoff() {
    let h = Harness::with_calendar(ScriptedCalendar::failing(2));
    let d1 = h.online_driver(1, &[]).await;
    let created = h.immediate_ride(&[]).await;
    let DispatchOutcome::Offered { created: offers, .. } = created.dispatch else {
        panic!("expected offers");
    };
    h.engine.accept_offer(offers[0].offer_id, d1).await.unwrap();
    assert_eq!(h.calendar.calls(), 1);
    let scheduler = MatchScheduler::new(h.engine.clone());

    // One failure so far: the next try waits 2 seconds.
    h.advance(1);
    assert_eq!(scheduler.tick().await.calendar_retries, 0);
    h.advance(1);
    assert_eq!(scheduler.tick().await.calendar_retries, 1);
    assert_eq!(h.calendar.calls(), 2);

    // Two failures: 4 seconds.
    h.advance(3);
    assert_eq!(scheduler.tick().await.calendar_retries, 0);
    h.advance(1);
    assert_eq!(scheduler.tick().await.calendar_retries, 1);

    let assignment = h
        .engine
        .store()
        .assignment_for_ride(created.ride.ride_id)
        .await
        .unwrap()
        .unwrap();
    assert!(assignment.calendar_entry_id.is_some());
    assert_eq!(assignment.calendar_attempts, 3);

    h.advance(60);
    assert_eq!(scheduler.tick().await.calendar_retries, 0);
    assert_eq!(h.calendar.calls(), 3);
}

#[tokio::test]
async fn scheduler_stops_on_shutdown() {
    let h = Harness::new();
    let scheduler = MatchScheduler::new(h.engine.clone());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(scheduler.run(shutdown_rx, h.config.subscribe()));

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("scheduler stopped")
        .unwrap();
}
