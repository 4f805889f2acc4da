mod support;

use ridematch_core::entities::{Offer, OfferState, RideStatus};
use ridematch_core::events::NotificationEvent;
use ridematch_core::matching::{DispatchOutcome, MatchError, RankedDriver};
use ridematch_core::store::{AcceptOutcome, DispatchRound, RoundOutcome};
use ridematch_sdk::objects::AccessibilityFeature;
use support::{Harness, ScriptedCalendar};
use time::Duration;
use uuid::Uuid;

fn offer_of(dispatch: &DispatchOutcome, driver_id: Uuid) -> Offer {
    let DispatchOutcome::Offered { created, .. } = dispatch else {
        panic!("expected offers, got {dispatch:?}");
    };
    created
        .iter()
        .find(|o| o.driver_id == driver_id)
        .cloned()
        .expect("driver got an offer")
}

#[tokio::test]
async fn first_accept_wins_and_the_loser_sees_no_longer_available() {
    let mut h = Harness::new();
    let d1 = h.online_driver(1, &[]).await;
    let d2 = h.online_driver(2, &[]).await;
    let created = h.immediate_ride(&[]).await;
    let o1 = offer_of(&created.dispatch, d1);
    let o2 = offer_of(&created.dispatch, d2);
    h.drain_notifications();

    h.advance(3);
    let accepted = h.engine.accept_offer(o1.offer_id, d1).await.unwrap();
    assert!(accepted.newly_claimed);
    assert_eq!(accepted.offer.state, OfferState::Accepted);
    assert_eq!(accepted.assignment.driver_id, d1);

    h.advance(1);
    let lost = h.engine.accept_offer(o2.offer_id, d2).await;
    assert!(matches!(lost, Err(MatchError::OfferNoLongerAvailable)));

    let offers = h
        .engine
        .store()
        .offers_for_ride(created.ride.ride_id)
        .await
        .unwrap();
    let state_of = |d| offers.iter().find(|o| o.driver_id == d).map(|o| o.state);
    assert_eq!(state_of(d1), Some(OfferState::Accepted));
    assert_eq!(state_of(d2), Some(OfferState::Superseded));

    let (ride, assignment) = h.engine.ride_view(created.ride.ride_id).await.unwrap();
    assert_eq!(ride.status, RideStatus::Assigned);
    assert_eq!(assignment.map(|a| a.driver_id), Some(d1));

    let events = h.drain_notifications();
    assert!(events.iter().any(|e| matches!(
        e,
        NotificationEvent::OfferWithdrawn { driver_id, .. } if *driver_id == d2
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        NotificationEvent::RideAssigned { driver_id, .. } if *driver_id == d1
    )));
}

#[tokio::test]
async fn accepting_twice_returns_the_same_assignment() {
    let mut h = Harness::new();
    let d1 = h.online_driver(1, &[]).await;
    let created = h.immediate_ride(&[]).await;
    let offer = offer_of(&created.dispatch, d1);

    let first = h.engine.accept_offer(offer.offer_id, d1).await.unwrap();
    let second = h.engine.accept_offer(offer.offer_id, d1).await.unwrap();

    assert!(first.newly_claimed);
    assert!(!second.newly_claimed);
    assert_eq!(
        first.assignment.assignment_id,
        second.assignment.assignment_id
    );
    assert_eq!(h.calendar.calls(), 1);
    let assigned = h
        .drain_notifications()
        .into_iter()
        .filter(|e| matches!(e, NotificationEvent::RideAssigned { .. }))
        .count();
    assert_eq!(assigned, 1);
}

#[tokio::test]
async fn replayed_acceptance_event_is_idempotent() {
    let h = Harness::new();
    let d1 = h.online_driver(1, &[]).await;
    let created = h.immediate_ride(&[]).await;
    let offer = offer_of(&created.dispatch, d1);
    let accepted = h.engine.accept_offer(offer.offer_id, d1).await.unwrap();

    let replayed = h
        .engine
        .coordinator()
        .on_offer_accepted(&accepted.offer)
        .await
        .unwrap();
    assert_eq!(replayed.assignment_id, accepted.assignment.assignment_id);
    assert_eq!(h.calendar.calls(), 1);
}

#[tokio::test]
async fn expired_offer_cannot_be_accepted() {
    let h = Harness::new();
    let d1 = h.online_driver(1, &[]).await;
    let created = h.immediate_ride(&[]).await;
    let offer = offer_of(&created.dispatch, d1);

    h.advance(30);
    let result = h.engine.accept_offer(offer.offer_id, d1).await;
    assert!(matches!(result, Err(MatchError::OfferExpired)));

    let stored = h.engine.store().offer(offer.offer_id).await.unwrap();
    assert_eq!(stored.map(|o| o.state), Some(OfferState::Expired));
    assert!(
        h.engine
            .store()
            .assignment_for_ride(created.ride.ride_id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn cancellation_beats_an_in_flight_accept() {
    let mut h = Harness::new();
    let d1 = h.online_driver(1, &[]).await;
    let created = h.immediate_ride(&[]).await;
    let ride_id = created.ride.ride_id;
    let offer = offer_of(&created.dispatch, d1);
    h.drain_notifications();

    h.advance(5);
    let cancelled = h.engine.cancel_ride(ride_id).await.unwrap();
    assert!(cancelled.changed);
    assert_eq!(cancelled.withdrawn.len(), 1);

    h.advance(1);
    let result = h.engine.accept_offer(offer.offer_id, d1).await;
    assert!(matches!(result, Err(MatchError::RideCancelled)));
    assert!(
        h.engine
            .store()
            .assignment_for_ride(ride_id)
            .await
            .unwrap()
            .is_none()
    );
    assert!(h.drain_notifications().iter().any(|e| matches!(
        e,
        NotificationEvent::OfferWithdrawn { driver_id, .. } if *driver_id == d1
    )));
}

#[tokio::test]
async fn cancelling_twice_is_a_no_op() {
    let h = Harness::new();
    let created = h.immediate_ride(&[]).await;
    let ride_id = created.ride.ride_id;

    assert!(h.engine.cancel_ride(ride_id).await.unwrap().changed);
    let again = h.engine.cancel_ride(ride_id).await.unwrap();
    assert!(!again.changed);
    assert_eq!(again.ride.status, RideStatus::Cancelled);
}

#[tokio::test]
async fn cancelling_an_assigned_ride_frees_the_driver() {
    let h = Harness::new();
    let d1 = h.online_driver(1, &[]).await;
    let created = h.immediate_ride(&[]).await;
    let offer = offer_of(&created.dispatch, d1);
    h.engine.accept_offer(offer.offer_id, d1).await.unwrap();

    let cancelled = h.engine.cancel_ride(created.ride.ride_id).await.unwrap();
    assert!(cancelled.released.is_some_and(|a| a.released_at.is_some()));

    let next = h.immediate_ride(&[]).await;
    assert!(matches!(next.dispatch, DispatchOutcome::Offered { .. }));
}

#[tokio::test]
async fn driver_who_went_offline_cannot_accept() {
    let h = Harness::new();
    let d1 = h.online_driver(1, &[]).await;
    let created = h.immediate_ride(&[]).await;
    let offer = offer_of(&created.dispatch, d1);

    h.engine.registry().offline(d1).await.unwrap();
    let result = h.engine.accept_offer(offer.offer_id, d1).await;
    assert!(matches!(result, Err(MatchError::DriverOffline)));
}

#[tokio::test]
async fn only_the_recipient_may_answer_an_offer() {
    let h = Harness::new();
    let d1 = h.online_driver(1, &[]).await;
    let d9 = h.online_driver(9, &[AccessibilityFeature::ServiceAnimal]).await;
    let created = h
        .immediate_ride(&[AccessibilityFeature::ServiceAnimal])
        .await;
    let offer = offer_of(&created.dispatch, d9);

    let result = h.engine.accept_offer(offer.offer_id, d1).await;
    assert!(matches!(result, Err(MatchError::NotOfferRecipient)));
}

#[tokio::test]
async fn declining_the_last_offer_redispatches() {
    let h = Harness::new();
    let d1 = h.online_driver(1, &[]).await;
    let created = h.immediate_ride(&[]).await;
    let offer = offer_of(&created.dispatch, d1);
    let d2 = h.online_driver(2, &[]).await;

    let declined = h
        .engine
        .decline_offer(offer.offer_id, d1, Some("too far".to_string()))
        .await
        .unwrap();
    assert_eq!(declined.offer.state, OfferState::Declined);
    assert_eq!(declined.offer.decline_reason.as_deref(), Some("too far"));

    let Some(DispatchOutcome::Offered { created: offers, .. }) = declined.redispatched else {
        panic!("expected a new round, got {:?}", declined.redispatched);
    };
    assert_eq!(offers.iter().map(|o| o.driver_id).collect::<Vec<_>>(), vec![d2]);
}

#[tokio::test]
async fn declining_driver_is_not_asked_again() {
    let h = Harness::new();
    let d1 = h.online_driver(1, &[]).await;
    let created = h.immediate_ride(&[]).await;
    let offer = offer_of(&created.dispatch, d1);

    let declined = h.engine.decline_offer(offer.offer_id, d1, None).await.unwrap();
    assert_eq!(
        declined.redispatched,
        Some(DispatchOutcome::NoEligibleDrivers)
    );
    let ride = h.engine.store().ride(created.ride.ride_id).await.unwrap();
    assert_eq!(ride.map(|r| r.status), Some(RideStatus::Unmatched));
}

#[tokio::test]
async fn decline_with_other_live_offers_does_not_redispatch() {
    let h = Harness::new();
    let d1 = h.online_driver(1, &[]).await;
    h.online_driver(2, &[]).await;
    let created = h.immediate_ride(&[]).await;
    let offer = offer_of(&created.dispatch, d1);

    let declined = h.engine.decline_offer(offer.offer_id, d1, None).await.unwrap();
    assert!(declined.redispatched.is_none());
}

#[tokio::test]
async fn calendar_failure_keeps_the_assignment() {
    let h = Harness::with_calendar(ScriptedCalendar::failing(1));
    let d1 = h.online_driver(1, &[]).await;
    let created = h.immediate_ride(&[]).await;
    let offer = offer_of(&created.dispatch, d1);

    let accepted = h.engine.accept_offer(offer.offer_id, d1).await.unwrap();
    assert!(accepted.assignment.calendar_entry_id.is_none());
    assert_eq!(accepted.assignment.calendar_attempts, 1);
    let (ride, assignment) = h.engine.ride_view(created.ride.ride_id).await.unwrap();
    assert_eq!(ride.status, RideStatus::Assigned);
    assert!(assignment.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_accepts_assign_exactly_one_driver() {
    let h = Harness::new();
    let mut drivers = Vec::new();
    for n in 1..=5 {
        drivers.push(h.online_driver(n, &[]).await);
    }
    let created = h.immediate_ride(&[]).await;

    let handles: Vec<_> = drivers
        .iter()
        .map(|&d| {
            let engine = h.engine.clone();
            let offer_id = offer_of(&created.dispatch, d).offer_id;
            tokio::spawn(async move { engine.accept_offer(offer_id, d).await })
        })
        .collect();

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(accepted) => winners.push(accepted.assignment.driver_id),
            Err(e) => assert!(matches!(e, MatchError::OfferNoLongerAvailable)),
        }
    }
    assert_eq!(winners.len(), 1);

    let offers = h
        .engine
        .store()
        .offers_for_ride(created.ride.ride_id)
        .await
        .unwrap();
    let accepted = offers
        .iter()
        .filter(|o| o.state == OfferState::Accepted)
        .count();
    assert_eq!(accepted, 1);
    assert!(
        offers
            .iter()
            .all(|o| o.state == OfferState::Accepted || o.state == OfferState::Superseded)
    );
}

#[tokio::test]
async fn winning_one_ride_withdraws_the_drivers_overlapping_offers() {
    let mut h = Harness::new();
    let d1 = h.online_driver(1, &[]).await;
    let first = h.immediate_ride(&[]).await;
    let second = h.immediate_ride(&[]).await;
    let o1 = offer_of(&first.dispatch, d1);
    let o2 = offer_of(&second.dispatch, d1);
    h.drain_notifications();

    h.engine.accept_offer(o1.offer_id, d1).await.unwrap();
    let result = h.engine.accept_offer(o2.offer_id, d1).await;
    assert!(matches!(result, Err(MatchError::OfferNoLongerAvailable)));

    let stored = h.engine.store().offer(o2.offer_id).await.unwrap();
    assert_eq!(stored.map(|o| o.state), Some(OfferState::Superseded));
    let ride = h.engine.store().ride(second.ride.ride_id).await.unwrap().unwrap();
    assert_eq!(ride.status, RideStatus::Offering);
    assert!(
        h.engine
            .store()
            .assignment_for_ride(second.ride.ride_id)
            .await
            .unwrap()
            .is_none()
    );
    assert!(h.drain_notifications().iter().any(|e| matches!(
        e,
        NotificationEvent::OfferWithdrawn { offer_id, .. } if *offer_id == o2.offer_id
    )));
}

#[tokio::test]
async fn accept_refuses_a_driver_booked_for_an_overlapping_ride() {
    let h = Harness::new();
    let d1 = h.online_driver(1, &[]).await;
    let first = h.immediate_ride(&[]).await;
    let o1 = offer_of(&first.dispatch, d1);
    h.engine.accept_offer(o1.offer_id, d1).await.unwrap();
    let second = h.immediate_ride(&[]).await;
    assert_eq!(second.dispatch, DispatchOutcome::NoEligibleDrivers);

    // A round ranked before the first claim committed still reaches d1.
    let now = h.now();
    let round = DispatchRound {
        ride_id: second.ride.ride_id,
        candidates: vec![RankedDriver {
            driver_id: d1,
            rank: 0,
        }],
        expires_at: now + Duration::seconds(30),
        now,
    };
    let outcome = h.engine.store().apply_dispatch_round(round).await.unwrap();
    let RoundOutcome::Applied(report) = outcome else {
        panic!("round was not applied: {outcome:?}");
    };
    let stale = report.created.first().cloned().expect("offer for d1");

    let result = h.engine.accept_offer(stale.offer_id, d1).await;
    assert!(matches!(result, Err(MatchError::ScheduleConflict)));
    let ride = h.engine.store().ride(second.ride.ride_id).await.unwrap().unwrap();
    assert_eq!(ride.status, RideStatus::Offering);
    let active = h
        .engine
        .store()
        .active_assignments(&[d1], now - Duration::hours(1), now + Duration::hours(2))
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_accepts_by_one_driver_book_one_of_two_overlapping_rides() {
    let h = Harness::new();
    let d1 = h.online_driver(1, &[]).await;
    let rides = [h.immediate_ride(&[]).await, h.immediate_ride(&[]).await];

    let handles: Vec<_> = rides
        .iter()
        .map(|created| {
            let engine = h.engine.clone();
            let offer_id = offer_of(&created.dispatch, d1).offer_id;
            tokio::spawn(async move { engine.accept_offer(offer_id, d1).await })
        })
        .collect();

    let mut won = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(e) => assert!(matches!(
                e,
                MatchError::OfferNoLongerAvailable | MatchError::ScheduleConflict
            )),
        }
    }
    assert_eq!(won, 1);

    let now = h.now();
    let active = h
        .engine
        .store()
        .active_assignments(&[d1], now - Duration::hours(1), now + Duration::hours(2))
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    let mut assigned = 0;
    for created in &rides {
        let ride = h.engine.store().ride(created.ride.ride_id).await.unwrap().unwrap();
        if ride.status == RideStatus::Assigned {
            assigned += 1;
        }
    }
    assert_eq!(assigned, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_accepts_write_the_calendar_once() {
    let latency = std::time::Duration::from_millis(200);
    let mut h = Harness::with_calendar(ScriptedCalendar::slow(latency));
    let d1 = h.online_driver(1, &[]).await;
    let created = h.immediate_ride(&[]).await;
    let offer_id = offer_of(&created.dispatch, d1).offer_id;
    h.drain_notifications();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.accept_offer(offer_id, d1).await })
        })
        .collect();
    let mut assignments = Vec::new();
    for handle in handles {
        let accepted = handle.await.unwrap().unwrap();
        assignments.push(accepted.assignment.assignment_id);
    }

    assert_eq!(assignments[0], assignments[1]);
    assert_eq!(h.calendar.calls(), 1);
    let assigned = h
        .drain_notifications()
        .into_iter()
        .filter(|e| matches!(e, NotificationEvent::RideAssigned { .. }))
        .count();
    assert_eq!(assigned, 1);
}

#[tokio::test]
async fn claimed_calendar_write_is_not_retried_while_in_flight() {
    let h = Harness::new();
    let d1 = h.online_driver(1, &[]).await;
    let created = h.immediate_ride(&[]).await;
    let offer = offer_of(&created.dispatch, d1);
    let store = h.engine.store();
    let outcome = store
        .accept_offer(offer.offer_id, d1, Duration::minutes(15), h.now())
        .await
        .unwrap();
    let AcceptOutcome::Claimed { assignment, .. } = outcome else {
        panic!("expected a claim, got {outcome:?}");
    };
    assert!(store.claim_calendar_write(assignment.assignment_id, h.now()).await.unwrap());
    assert!(!store.claim_calendar_write(assignment.assignment_id, h.now()).await.unwrap());

    // The claim holder gets the full calendar timeout before the sweep steps in.
    h.advance(5);
    let coordinator = h.engine.coordinator();
    assert_eq!(coordinator.retry_missing_calendar_entries().await.unwrap(), 0);
    h.advance(5);
    assert_eq!(coordinator.retry_missing_calendar_entries().await.unwrap(), 1);
    assert_eq!(h.calendar.calls(), 1);
}
