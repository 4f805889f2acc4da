//! PostgreSQL [`MatchStore`] backend.
//!
//! Each state-changing method is one transaction that starts by locking the
//! ride row (`SELECT ... FOR UPDATE`), so competing units on one ride run one
//! after the other. Offer updates are additionally guarded on
//! `state = 'pending'`, which covers the offer sweep that does not take the
//! ride lock. Accepts also take an advisory lock on the driver, after the
//! ride lock, so one driver's accepts on different rides run one at a time.
//! Serialization failures and deadlocks retry the whole unit.

use super::{
    AcceptOutcome, CancelOutcome, DeclineOutcome, DispatchRound, EnsureOutcome, ExpireOutcome,
    MatchStore, ReopenOutcome, RoundOutcome, RoundReport, SessionOpen, StoreError, assignment_for,
};
use crate::entities::assignment::{
    ClaimCalendarWrite, GetActiveAssignmentsForDrivers, GetAssignmentForRide,
    GetAssignmentsMissingCalendar, RecordCalendarAttempt,
};
use crate::entities::driver_profile::{GetDriverProfiles, UpsertDriverProfile};
use crate::entities::driver_session::{
    CloseDriverSession, CloseStaleDriverSessions, GetOpenDriverSession, GetOpenDriverSessions,
    OpenDriverSession, TouchDriverSession,
};
use crate::entities::offer::{ExpireDueOffers, GetLiveOffersForDriver, GetOffer, GetOffersForRide};
use crate::entities::ride_request::{
    GetRideRequest, GetRidesNeedingAttention, InsertRideRequest, ListRideRequestsByStatus,
};
use crate::entities::{
    Assignment, DriverProfile, DriverSession, Offer, OfferState, RideRequest, RideStatus,
    SessionEndReason,
};
use crate::framework::DatabaseProcessor;
use crate::matching::rules::{
    AcceptDecision, DeclineDecision, OfferContext, Rejection, decide_accept, decide_decline,
    new_offers, plan_round, windows_conflict,
};
use async_trait::async_trait;
use kanau::processor::Processor;
use ridematch_sdk::objects::GeoPoint;
use sqlx::PgPool;
use time::{Duration, PrimitiveDateTime};
use tracing::warn;
use uuid::Uuid;

/// Attempts per atomic unit before giving up.
pub const MAX_UNIT_ATTEMPTS: u32 = 3;

/// SQLSTATEs after which a unit is retried from the start.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

pub fn is_retryable(error: &StoreError) -> bool {
    match error {
        StoreError::Database(sqlx::Error::Database(db)) => matches!(
            db.code().as_deref(),
            Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
        ),
        _ => false,
    }
}

/// Run one attempt of a unit, re-running it on retryable failures.
macro_rules! atomic_unit {
    ($unit:literal, $attempt:expr) => {{
        let mut attempt = 1u32;
        loop {
            match $attempt.await {
                Err(e) if is_retryable(&e) => {
                    if attempt >= MAX_UNIT_ATTEMPTS {
                        break Err(StoreError::RetriesExhausted {
                            unit: $unit,
                            attempts: attempt,
                        });
                    }
                    warn!(unit = $unit, attempt, error = %e, "Retrying atomic unit");
                    attempt += 1;
                }
                other => break other,
            }
        }
    }};
}

fn to_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn missing_ride(offer: &Offer) -> StoreError {
    StoreError::Corrupt(format!("offer {} has no ride", offer.offer_id))
}

#[derive(Debug, Clone)]
pub struct PgMatchStore {
    db: DatabaseProcessor,
}

impl PgMatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            db: DatabaseProcessor { pool },
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.db.pool
    }

    async fn open_session_once(
        &self,
        driver_id: Uuid,
        location: Option<GeoPoint>,
        now: PrimitiveDateTime,
    ) -> Result<Option<SessionOpen>, StoreError> {
        let opened = self
            .db
            .process(OpenDriverSession {
                driver_id,
                location,
                now,
            })
            .await?;
        if let Some(session) = opened {
            return Ok(Some(SessionOpen::Opened(session)));
        }
        let existing = self.db.process(GetOpenDriverSession { driver_id }).await?;
        Ok(existing.map(SessionOpen::AlreadyOpen))
    }

    async fn cancel_once(
        &self,
        ride_id: Uuid,
        now: PrimitiveDateTime,
    ) -> Result<CancelOutcome, StoreError> {
        let mut tx = self.db.pool.begin().await?;
        let Some(mut ride) = RideRequest::lock_tx(&mut tx, ride_id).await? else {
            return Ok(CancelOutcome::RideNotFound);
        };
        if ride.status == RideStatus::Cancelled {
            return Ok(CancelOutcome::AlreadyCancelled(ride));
        }
        let pending = pending_ids(&Offer::for_ride_tx(&mut tx, ride_id).await?, None);
        let withdrawn =
            Offer::resolve_many_tx(&mut tx, &pending, OfferState::Superseded, now).await?;
        let released = Assignment::release_tx(&mut tx, ride_id, now).await?;
        RideRequest::update_status_tx(&mut tx, ride_id, RideStatus::Cancelled, now).await?;
        tx.commit().await?;

        ride.status = RideStatus::Cancelled;
        ride.updated_at = now;
        Ok(CancelOutcome::Cancelled {
            ride,
            withdrawn,
            released,
        })
    }

    async fn expire_once(
        &self,
        ride_id: Uuid,
        now: PrimitiveDateTime,
    ) -> Result<ExpireOutcome, StoreError> {
        let mut tx = self.db.pool.begin().await?;
        let Some(mut ride) = RideRequest::lock_tx(&mut tx, ride_id).await? else {
            return Ok(ExpireOutcome::RideNotFound);
        };
        if !ride.status.is_dispatchable() || now < ride.match_deadline {
            return Ok(ExpireOutcome::Unchanged(ride.status));
        }
        let pending = pending_ids(&Offer::for_ride_tx(&mut tx, ride_id).await?, None);
        let withdrawn =
            Offer::resolve_many_tx(&mut tx, &pending, OfferState::Superseded, now).await?;
        RideRequest::update_status_tx(&mut tx, ride_id, RideStatus::Expired, now).await?;
        tx.commit().await?;

        ride.status = RideStatus::Expired;
        ride.updated_at = now;
        Ok(ExpireOutcome::Expired { ride, withdrawn })
    }

    async fn reopen_once(
        &self,
        ride_id: Uuid,
        match_deadline: PrimitiveDateTime,
        now: PrimitiveDateTime,
    ) -> Result<ReopenOutcome, StoreError> {
        let mut tx = self.db.pool.begin().await?;
        let Some(mut ride) = RideRequest::lock_tx(&mut tx, ride_id).await? else {
            return Ok(ReopenOutcome::RideNotFound);
        };
        if ride.status != RideStatus::Expired {
            return Ok(ReopenOutcome::Unchanged(ride.status));
        }
        RideRequest::reopen_tx(&mut tx, ride_id, match_deadline, now).await?;
        tx.commit().await?;

        ride.status = RideStatus::Unmatched;
        ride.match_deadline = match_deadline;
        ride.updated_at = now;
        Ok(ReopenOutcome::Reopened(ride))
    }

    async fn apply_round_once(&self, round: &DispatchRound) -> Result<RoundOutcome, StoreError> {
        let mut tx = self.db.pool.begin().await?;
        let Some(mut ride) = RideRequest::lock_tx(&mut tx, round.ride_id).await? else {
            return Ok(RoundOutcome::RideNotFound);
        };
        if !ride.status.is_dispatchable() {
            return Ok(RoundOutcome::NotDispatchable(ride.status));
        }

        let existing = Offer::for_ride_tx(&mut tx, ride.ride_id).await?;
        let plan = plan_round(&existing, &round.candidates, round.now);
        let expired =
            Offer::resolve_many_tx(&mut tx, &plan.expire, OfferState::Expired, round.now).await?;
        let superseded =
            Offer::resolve_many_tx(&mut tx, &plan.supersede, OfferState::Superseded, round.now)
                .await?;
        let kept: Vec<Offer> = existing
            .into_iter()
            .filter(|o| plan.keep.contains(&o.offer_id))
            .collect();
        let created = new_offers(
            ride.ride_id,
            &plan.create,
            ride.dispatch_rounds + 1,
            round.now,
            round.expires_at,
        );
        Offer::insert_many_tx(&mut tx, &created).await?;
        let status = plan.resulting_status();
        RideRequest::record_round_tx(&mut tx, ride.ride_id, status, round.now).await?;
        tx.commit().await?;

        let previous_status = ride.status;
        ride.status = status;
        ride.dispatch_rounds += 1;
        ride.first_dispatched_at.get_or_insert(round.now);
        ride.updated_at = round.now;
        Ok(RoundOutcome::Applied(RoundReport {
            ride,
            created,
            kept,
            superseded,
            expired,
            previous_status,
        }))
    }

    async fn accept_once(
        &self,
        offer_id: Uuid,
        driver_id: Uuid,
        schedule_buffer: Duration,
        now: PrimitiveDateTime,
    ) -> Result<AcceptOutcome, StoreError> {
        let mut tx = self.db.pool.begin().await?;
        let Some(unlocked) = Offer::get_tx(&mut tx, offer_id).await? else {
            return Ok(AcceptOutcome::OfferNotFound);
        };
        let Some(mut ride) = RideRequest::lock_tx(&mut tx, unlocked.ride_id).await? else {
            return Err(missing_ride(&unlocked));
        };
        // Re-read under the ride lock.
        let Some(offer) = Offer::get_tx(&mut tx, offer_id).await? else {
            return Ok(AcceptOutcome::OfferNotFound);
        };
        let driver_online = DriverSession::is_open_tx(&mut tx, driver_id).await?;
        DriverSession::lock_driver_tx(&mut tx, driver_id).await?;
        let from = ride.window_start - schedule_buffer;
        let to = ride.window_end + schedule_buffer;
        let schedule_conflict =
            Assignment::active_for_driver_tx(&mut tx, driver_id, ride.ride_id, from, to)
                .await?
                .iter()
                .any(|a| {
                    windows_conflict(
                        (a.window_start, a.window_end),
                        (ride.window_start, ride.window_end),
                        schedule_buffer,
                    )
                });
        let decision = decide_accept(&OfferContext {
            offer: &offer,
            ride_status: ride.status,
            driver_id,
            driver_online,
            schedule_conflict,
            now,
        });

        match decision {
            AcceptDecision::Claim => {
                let Some(accepted) =
                    Offer::resolve_many_tx(&mut tx, &[offer_id], OfferState::Accepted, now)
                        .await?
                        .pop()
                else {
                    // Expired by the sweep between our read and the update.
                    return Ok(AcceptOutcome::Rejected(Rejection::NoLongerAvailable));
                };
                let mut losing =
                    pending_ids(&Offer::for_ride_tx(&mut tx, ride.ride_id).await?, Some(offer_id));
                losing.extend(
                    Offer::pending_for_driver_tx(&mut tx, driver_id, ride.ride_id, from, to)
                        .await?,
                );
                let superseded =
                    Offer::resolve_many_tx(&mut tx, &losing, OfferState::Superseded, now).await?;
                RideRequest::update_status_tx(&mut tx, ride.ride_id, RideStatus::Assigned, now)
                    .await?;
                ride.status = RideStatus::Assigned;
                ride.updated_at = now;
                let assignment =
                    Assignment::insert_or_get_tx(&mut tx, &assignment_for(&accepted, &ride, now))
                        .await?;
                tx.commit().await?;
                Ok(AcceptOutcome::Claimed {
                    offer: accepted,
                    assignment,
                    superseded,
                    ride,
                })
            }
            AcceptDecision::AlreadyAccepted => {
                let assignment =
                    Assignment::insert_or_get_tx(&mut tx, &assignment_for(&offer, &ride, now))
                        .await?;
                tx.commit().await?;
                Ok(AcceptOutcome::AlreadyAccepted { offer, assignment })
            }
            AcceptDecision::ExpireAndReject => {
                Offer::resolve_many_tx(&mut tx, &[offer_id], OfferState::Expired, now).await?;
                tx.commit().await?;
                Ok(AcceptOutcome::Rejected(Rejection::Expired))
            }
            AcceptDecision::Reject(rejection) => Ok(AcceptOutcome::Rejected(rejection)),
        }
    }

    async fn decline_once(
        &self,
        offer_id: Uuid,
        driver_id: Uuid,
        reason: Option<&str>,
        now: PrimitiveDateTime,
    ) -> Result<DeclineOutcome, StoreError> {
        let mut tx = self.db.pool.begin().await?;
        let Some(unlocked) = Offer::get_tx(&mut tx, offer_id).await? else {
            return Ok(DeclineOutcome::OfferNotFound);
        };
        let Some(ride) = RideRequest::lock_tx(&mut tx, unlocked.ride_id).await? else {
            return Err(missing_ride(&unlocked));
        };
        let Some(offer) = Offer::get_tx(&mut tx, offer_id).await? else {
            return Ok(DeclineOutcome::OfferNotFound);
        };
        let driver_online = DriverSession::is_open_tx(&mut tx, driver_id).await?;
        let decision = decide_decline(&OfferContext {
            offer: &offer,
            ride_status: ride.status,
            driver_id,
            driver_online,
            schedule_conflict: false,
            now,
        });

        match decision {
            DeclineDecision::Decline => {
                let Some(mut declined) =
                    Offer::resolve_many_tx(&mut tx, &[offer_id], OfferState::Declined, now)
                        .await?
                        .pop()
                else {
                    return Ok(DeclineOutcome::Rejected(Rejection::NoLongerAvailable));
                };
                Offer::record_decline_reason_tx(&mut tx, offer_id, reason).await?;
                declined.decline_reason = reason.map(str::to_owned);
                let live_remaining = Offer::for_ride_tx(&mut tx, ride.ride_id)
                    .await?
                    .iter()
                    .filter(|o| o.is_live(now))
                    .count();
                tx.commit().await?;
                Ok(DeclineOutcome::Declined {
                    offer: declined,
                    live_remaining,
                    ride_status: ride.status,
                })
            }
            DeclineDecision::AlreadyDeclined => Ok(DeclineOutcome::AlreadyDeclined(offer)),
            DeclineDecision::ExpireAndReject => {
                Offer::resolve_many_tx(&mut tx, &[offer_id], OfferState::Expired, now).await?;
                tx.commit().await?;
                Ok(DeclineOutcome::Rejected(Rejection::Expired))
            }
            DeclineDecision::Reject(rejection) => Ok(DeclineOutcome::Rejected(rejection)),
        }
    }

    async fn ensure_assignment_once(
        &self,
        offer: &Offer,
        now: PrimitiveDateTime,
    ) -> Result<EnsureOutcome, StoreError> {
        let mut tx = self.db.pool.begin().await?;
        let Some(ride) = RideRequest::lock_tx(&mut tx, offer.ride_id).await? else {
            return Err(missing_ride(offer));
        };
        if let Some(existing) = Assignment::for_ride_tx(&mut tx, ride.ride_id).await? {
            return Ok(EnsureOutcome::Existing(existing));
        }
        let won = Offer::get_tx(&mut tx, offer.offer_id)
            .await?
            .is_some_and(|o| o.state == OfferState::Accepted);
        if ride.status != RideStatus::Assigned || !won {
            return Ok(EnsureOutcome::RideNotAssigned(ride.status));
        }
        let assignment =
            Assignment::insert_or_get_tx(&mut tx, &assignment_for(offer, &ride, now)).await?;
        tx.commit().await?;
        Ok(EnsureOutcome::Created(assignment))
    }
}

fn pending_ids(offers: &[Offer], except: Option<Uuid>) -> Vec<Uuid> {
    offers
        .iter()
        .filter(|o| o.state == OfferState::Pending && Some(o.offer_id) != except)
        .map(|o| o.offer_id)
        .collect()
}

#[async_trait]
impl MatchStore for PgMatchStore {
    async fn open_session(
        &self,
        driver_id: Uuid,
        location: Option<GeoPoint>,
        now: PrimitiveDateTime,
    ) -> Result<SessionOpen, StoreError> {
        // The open session may close between the failed insert and the read.
        for _ in 0..MAX_UNIT_ATTEMPTS {
            if let Some(open) = self.open_session_once(driver_id, location, now).await? {
                return Ok(open);
            }
        }
        Err(StoreError::RetriesExhausted {
            unit: "open_session",
            attempts: MAX_UNIT_ATTEMPTS,
        })
    }

    async fn close_session(
        &self,
        driver_id: Uuid,
        reason: SessionEndReason,
        now: PrimitiveDateTime,
    ) -> Result<Option<DriverSession>, StoreError> {
        Ok(self
            .db
            .process(CloseDriverSession {
                driver_id,
                reason,
                now,
            })
            .await?)
    }

    async fn touch_session(
        &self,
        driver_id: Uuid,
        location: Option<GeoPoint>,
        now: PrimitiveDateTime,
    ) -> Result<Option<DriverSession>, StoreError> {
        Ok(self
            .db
            .process(TouchDriverSession {
                driver_id,
                location,
                now,
            })
            .await?)
    }

    async fn open_session_for(&self, driver_id: Uuid) -> Result<Option<DriverSession>, StoreError> {
        Ok(self.db.process(GetOpenDriverSession { driver_id }).await?)
    }

    async fn open_sessions(&self) -> Result<Vec<DriverSession>, StoreError> {
        Ok(self.db.process(GetOpenDriverSessions).await?)
    }

    async fn close_stale_sessions(
        &self,
        cutoff: PrimitiveDateTime,
        now: PrimitiveDateTime,
    ) -> Result<Vec<DriverSession>, StoreError> {
        Ok(self
            .db
            .process(CloseStaleDriverSessions { cutoff, now })
            .await?)
    }

    async fn upsert_driver_profile(
        &self,
        profile: DriverProfile,
    ) -> Result<DriverProfile, StoreError> {
        Ok(self.db.process(UpsertDriverProfile { profile }).await?)
    }

    async fn driver_profiles(&self, driver_ids: &[Uuid]) -> Result<Vec<DriverProfile>, StoreError> {
        Ok(self
            .db
            .process(GetDriverProfiles {
                driver_ids: driver_ids.to_vec(),
            })
            .await?)
    }

    async fn active_assignments(
        &self,
        driver_ids: &[Uuid],
        from: PrimitiveDateTime,
        to: PrimitiveDateTime,
    ) -> Result<Vec<Assignment>, StoreError> {
        Ok(self
            .db
            .process(GetActiveAssignmentsForDrivers {
                driver_ids: driver_ids.to_vec(),
                from,
                to,
            })
            .await?)
    }

    async fn insert_ride(&self, ride: RideRequest) -> Result<(), StoreError> {
        Ok(self.db.process(InsertRideRequest { ride }).await?)
    }

    async fn ride(&self, ride_id: Uuid) -> Result<Option<RideRequest>, StoreError> {
        Ok(self.db.process(GetRideRequest { ride_id }).await?)
    }

    async fn rides_by_status(
        &self,
        status: RideStatus,
        limit: usize,
    ) -> Result<Vec<RideRequest>, StoreError> {
        Ok(self
            .db
            .process(ListRideRequestsByStatus {
                status,
                limit: to_limit(limit),
            })
            .await?)
    }

    async fn rides_needing_attention(
        &self,
        now: PrimitiveDateTime,
        prebook_horizon: PrimitiveDateTime,
        limit: usize,
    ) -> Result<Vec<RideRequest>, StoreError> {
        Ok(self
            .db
            .process(GetRidesNeedingAttention {
                now,
                prebook_horizon,
                limit: to_limit(limit),
            })
            .await?)
    }

    async fn cancel_ride(
        &self,
        ride_id: Uuid,
        now: PrimitiveDateTime,
    ) -> Result<CancelOutcome, StoreError> {
        atomic_unit!("cancel_ride", self.cancel_once(ride_id, now))
    }

    async fn expire_ride(
        &self,
        ride_id: Uuid,
        now: PrimitiveDateTime,
    ) -> Result<ExpireOutcome, StoreError> {
        atomic_unit!("expire_ride", self.expire_once(ride_id, now))
    }

    async fn reopen_ride(
        &self,
        ride_id: Uuid,
        match_deadline: PrimitiveDateTime,
        now: PrimitiveDateTime,
    ) -> Result<ReopenOutcome, StoreError> {
        atomic_unit!("reopen_ride", self.reopen_once(ride_id, match_deadline, now))
    }

    async fn offer(&self, offer_id: Uuid) -> Result<Option<Offer>, StoreError> {
        Ok(self.db.process(GetOffer { offer_id }).await?)
    }

    async fn offers_for_ride(&self, ride_id: Uuid) -> Result<Vec<Offer>, StoreError> {
        Ok(self.db.process(GetOffersForRide { ride_id }).await?)
    }

    async fn live_offers_for_driver(
        &self,
        driver_id: Uuid,
        now: PrimitiveDateTime,
    ) -> Result<Vec<Offer>, StoreError> {
        Ok(self
            .db
            .process(GetLiveOffersForDriver { driver_id, now })
            .await?)
    }

    async fn apply_dispatch_round(&self, round: DispatchRound) -> Result<RoundOutcome, StoreError> {
        atomic_unit!("apply_dispatch_round", self.apply_round_once(&round))
    }

    async fn accept_offer(
        &self,
        offer_id: Uuid,
        driver_id: Uuid,
        schedule_buffer: Duration,
        now: PrimitiveDateTime,
    ) -> Result<AcceptOutcome, StoreError> {
        atomic_unit!(
            "accept_offer",
            self.accept_once(offer_id, driver_id, schedule_buffer, now)
        )
    }

    async fn decline_offer(
        &self,
        offer_id: Uuid,
        driver_id: Uuid,
        reason: Option<String>,
        now: PrimitiveDateTime,
    ) -> Result<DeclineOutcome, StoreError> {
        atomic_unit!(
            "decline_offer",
            self.decline_once(offer_id, driver_id, reason.as_deref(), now)
        )
    }

    async fn expire_due_offers(&self, now: PrimitiveDateTime) -> Result<Vec<Offer>, StoreError> {
        atomic_unit!("expire_due_offers", async {
            self.db
                .process(ExpireDueOffers { now })
                .await
                .map_err(StoreError::from)
        })
    }

    async fn assignment_for_ride(&self, ride_id: Uuid) -> Result<Option<Assignment>, StoreError> {
        Ok(self.db.process(GetAssignmentForRide { ride_id }).await?)
    }

    async fn ensure_assignment(
        &self,
        offer: &Offer,
        now: PrimitiveDateTime,
    ) -> Result<EnsureOutcome, StoreError> {
        atomic_unit!("ensure_assignment", self.ensure_assignment_once(offer, now))
    }

    async fn claim_calendar_write(
        &self,
        assignment_id: Uuid,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError> {
        Ok(self
            .db
            .process(ClaimCalendarWrite { assignment_id, now })
            .await?)
    }

    async fn record_calendar_attempt(
        &self,
        assignment_id: Uuid,
        entry_id: Option<String>,
        now: PrimitiveDateTime,
    ) -> Result<(), StoreError> {
        self.db
            .process(RecordCalendarAttempt {
                assignment_id,
                entry_id,
                now,
            })
            .await?;
        Ok(())
    }

    async fn assignments_missing_calendar(
        &self,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<Assignment>, StoreError> {
        Ok(self
            .db
            .process(GetAssignmentsMissingCalendar {
                max_attempts: i32::try_from(max_attempts).unwrap_or(i32::MAX),
                limit: to_limit(limit),
            })
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_database_conflicts_are_retried() {
        assert!(!is_retryable(&StoreError::Database(sqlx::Error::RowNotFound)));
        assert!(!is_retryable(&StoreError::Corrupt("x".into())));
        assert!(!is_retryable(&StoreError::RetriesExhausted {
            unit: "accept_offer",
            attempts: MAX_UNIT_ATTEMPTS,
        }));
    }

    #[test]
    fn pending_ids_skip_resolved_and_excluded() {
        use time::macros::datetime;
        let base = Offer {
            offer_id: Uuid::from_u128(1),
            ride_id: Uuid::from_u128(9),
            driver_id: Uuid::from_u128(5),
            state: OfferState::Pending,
            round: 1,
            rank: 0,
            created_at: datetime!(2025-03-03 10:00:00),
            expires_at: datetime!(2025-03-03 10:00:30),
            responded_at: None,
            decline_reason: None,
        };
        let offers = vec![
            base.clone(),
            Offer {
                offer_id: Uuid::from_u128(2),
                ..base.clone()
            },
            Offer {
                offer_id: Uuid::from_u128(3),
                state: OfferState::Declined,
                ..base
            },
        ];
        assert_eq!(pending_ids(&offers, Some(Uuid::from_u128(1))), vec![Uuid::from_u128(2)]);
    }
}
