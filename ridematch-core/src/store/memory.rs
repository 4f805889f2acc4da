//! In-process [`MatchStore`] backend.
//!
//! All state sits behind one `tokio::sync::Mutex` and every trait method
//! takes it exactly once, which is what makes each method atomic.

use super::{
    AcceptOutcome, CancelOutcome, DeclineOutcome, DispatchRound, EnsureOutcome, ExpireOutcome,
    MatchStore, ReopenOutcome, RoundOutcome, RoundReport, SessionOpen, StoreError, assignment_for,
};
use crate::entities::{
    Assignment, DriverProfile, DriverSession, Offer, OfferState, RideRequest, RideStatus,
    SessionEndReason,
};
use crate::matching::rules::{
    AcceptDecision, DeclineDecision, OfferContext, Rejection, decide_accept, decide_decline,
    new_offers, plan_round, windows_conflict,
};
use async_trait::async_trait;
use ridematch_sdk::objects::GeoPoint;
use std::collections::HashMap;
use time::{Duration, PrimitiveDateTime};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    next_session_id: i64,
    /// Full session history; `open` indexes the open ones.
    sessions: Vec<DriverSession>,
    open: HashMap<Uuid, usize>,
    profiles: HashMap<Uuid, DriverProfile>,
    rides: HashMap<Uuid, RideRequest>,
    offers: HashMap<Uuid, Offer>,
    ride_offers: HashMap<Uuid, Vec<Uuid>>,
    /// Keyed by ride id: one assignment per ride.
    assignments: HashMap<Uuid, Assignment>,
}

impl State {
    fn is_online(&self, driver_id: Uuid) -> bool {
        self.open.contains_key(&driver_id)
    }

    fn open_session_of(&self, driver_id: Uuid) -> Option<&DriverSession> {
        self.open.get(&driver_id).and_then(|&i| self.sessions.get(i))
    }

    fn close(
        &mut self,
        driver_id: Uuid,
        reason: SessionEndReason,
        now: PrimitiveDateTime,
    ) -> Option<DriverSession> {
        let index = self.open.remove(&driver_id)?;
        let session = self.sessions.get_mut(index)?;
        session.ended_at = Some(now);
        session.end_reason = Some(reason);
        Some(session.clone())
    }

    fn offers_of(&self, ride_id: Uuid) -> Vec<Offer> {
        let mut offers: Vec<Offer> = self
            .ride_offers
            .get(&ride_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.offers.get(id).cloned())
            .collect();
        offers.sort_by_key(|o| (o.round, o.rank, o.driver_id));
        offers
    }

    /// Move the given offers out of `pending`; offers already resolved are skipped.
    fn resolve(
        &mut self,
        offer_ids: &[Uuid],
        state: OfferState,
        now: PrimitiveDateTime,
    ) -> Vec<Offer> {
        let mut resolved = Vec::new();
        for id in offer_ids {
            if let Some(offer) = self
                .offers
                .get_mut(id)
                .filter(|o| o.state == OfferState::Pending)
            {
                offer.state = state;
                offer.responded_at = Some(now);
                resolved.push(offer.clone());
            }
        }
        resolved
    }

    fn pending_ids_of(&self, ride_id: Uuid, except: Option<Uuid>) -> Vec<Uuid> {
        self.ride_offers
            .get(&ride_id)
            .into_iter()
            .flatten()
            .filter(|id| Some(**id) != except)
            .filter(|id| {
                self.offers
                    .get(id)
                    .is_some_and(|o| o.state == OfferState::Pending)
            })
            .copied()
            .collect()
    }

    /// Whether the driver holds an active assignment on another ride within
    /// `buffer` of `ride`'s window.
    fn has_schedule_conflict(&self, driver_id: Uuid, ride: &RideRequest, buffer: Duration) -> bool {
        self.assignments.values().any(|a| {
            a.driver_id == driver_id
                && a.is_active()
                && a.ride_id != ride.ride_id
                && windows_conflict(
                    (a.window_start, a.window_end),
                    (ride.window_start, ride.window_end),
                    buffer,
                )
        })
    }

    /// Pending offers of the driver on other rides that conflict with `ride`.
    fn overlapping_pending_ids(
        &self,
        driver_id: Uuid,
        ride: &RideRequest,
        buffer: Duration,
    ) -> Vec<Uuid> {
        self.offers
            .values()
            .filter(|o| {
                o.driver_id == driver_id
                    && o.state == OfferState::Pending
                    && o.ride_id != ride.ride_id
            })
            .filter(|o| {
                self.rides.get(&o.ride_id).is_some_and(|other| {
                    windows_conflict(
                        (other.window_start, other.window_end),
                        (ride.window_start, ride.window_end),
                        buffer,
                    )
                })
            })
            .map(|o| o.offer_id)
            .collect()
    }

    fn set_ride_status(
        &mut self,
        ride_id: Uuid,
        status: RideStatus,
        now: PrimitiveDateTime,
    ) -> Option<RideRequest> {
        let ride = self.rides.get_mut(&ride_id)?;
        ride.status = status;
        ride.updated_at = now;
        Some(ride.clone())
    }

    fn needs_attention(&self, ride: &RideRequest, now: PrimitiveDateTime) -> bool {
        if !ride.status.is_dispatchable() {
            return false;
        }
        if ride.match_deadline <= now {
            return true;
        }
        match ride.status {
            RideStatus::Unmatched => true,
            RideStatus::Offering => !self.offers_of(ride.ride_id).iter().any(|o| o.is_live(now)),
            _ => false,
        }
    }

    fn ride_of(&self, offer: &Offer) -> Result<RideRequest, StoreError> {
        self.rides
            .get(&offer.ride_id)
            .cloned()
            .ok_or_else(|| StoreError::Corrupt(format!("offer {} has no ride", offer.offer_id)))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MatchStore for InMemoryStore {
    async fn open_session(
        &self,
        driver_id: Uuid,
        location: Option<GeoPoint>,
        now: PrimitiveDateTime,
    ) -> Result<SessionOpen, StoreError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if let Some(existing) = state.open_session_of(driver_id) {
            return Ok(SessionOpen::AlreadyOpen(existing.clone()));
        }
        state.next_session_id += 1;
        let session = DriverSession {
            session_id: state.next_session_id,
            driver_id,
            started_at: now,
            ended_at: None,
            last_heartbeat_at: now,
            location_lat: location.map(|l| l.lat),
            location_lng: location.map(|l| l.lng),
            end_reason: None,
        };
        state.open.insert(driver_id, state.sessions.len());
        state.sessions.push(session.clone());
        Ok(SessionOpen::Opened(session))
    }

    async fn close_session(
        &self,
        driver_id: Uuid,
        reason: SessionEndReason,
        now: PrimitiveDateTime,
    ) -> Result<Option<DriverSession>, StoreError> {
        Ok(self.state.lock().await.close(driver_id, reason, now))
    }

    async fn touch_session(
        &self,
        driver_id: Uuid,
        location: Option<GeoPoint>,
        now: PrimitiveDateTime,
    ) -> Result<Option<DriverSession>, StoreError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(session) = state
            .open
            .get(&driver_id)
            .copied()
            .and_then(|i| state.sessions.get_mut(i))
        else {
            return Ok(None);
        };
        session.last_heartbeat_at = now;
        if let Some(location) = location {
            session.location_lat = Some(location.lat);
            session.location_lng = Some(location.lng);
        }
        Ok(Some(session.clone()))
    }

    async fn open_session_for(&self, driver_id: Uuid) -> Result<Option<DriverSession>, StoreError> {
        Ok(self.state.lock().await.open_session_of(driver_id).cloned())
    }

    async fn open_sessions(&self) -> Result<Vec<DriverSession>, StoreError> {
        let state = self.state.lock().await;
        let mut sessions: Vec<DriverSession> = state
            .open
            .values()
            .filter_map(|&i| state.sessions.get(i).cloned())
            .collect();
        sessions.sort_by_key(|s| s.driver_id);
        Ok(sessions)
    }

    async fn close_stale_sessions(
        &self,
        cutoff: PrimitiveDateTime,
        now: PrimitiveDateTime,
    ) -> Result<Vec<DriverSession>, StoreError> {
        let mut state = self.state.lock().await;
        let mut stale: Vec<Uuid> = state
            .open
            .iter()
            .filter(|(_, i)| {
                state
                    .sessions
                    .get(**i)
                    .is_some_and(|s| s.last_heartbeat_at < cutoff)
            })
            .map(|(driver_id, _)| *driver_id)
            .collect();
        stale.sort();
        Ok(stale
            .into_iter()
            .filter_map(|driver_id| state.close(driver_id, SessionEndReason::HeartbeatTimeout, now))
            .collect())
    }

    async fn upsert_driver_profile(
        &self,
        profile: DriverProfile,
    ) -> Result<DriverProfile, StoreError> {
        let mut state = self.state.lock().await;
        state.profiles.insert(profile.driver_id, profile.clone());
        Ok(profile)
    }

    async fn driver_profiles(&self, driver_ids: &[Uuid]) -> Result<Vec<DriverProfile>, StoreError> {
        let state = self.state.lock().await;
        let mut profiles: Vec<DriverProfile> = driver_ids
            .iter()
            .filter_map(|id| state.profiles.get(id).cloned())
            .collect();
        profiles.sort_by_key(|p| p.driver_id);
        profiles.dedup_by_key(|p| p.driver_id);
        Ok(profiles)
    }

    async fn active_assignments(
        &self,
        driver_ids: &[Uuid],
        from: PrimitiveDateTime,
        to: PrimitiveDateTime,
    ) -> Result<Vec<Assignment>, StoreError> {
        let state = self.state.lock().await;
        let mut assignments: Vec<Assignment> = state
            .assignments
            .values()
            .filter(|a| a.is_active() && driver_ids.contains(&a.driver_id))
            .filter(|a| a.window_start < to && a.window_end > from)
            .cloned()
            .collect();
        assignments.sort_by_key(|a| (a.driver_id, a.window_start));
        Ok(assignments)
    }

    async fn insert_ride(&self, ride: RideRequest) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.rides.insert(ride.ride_id, ride);
        Ok(())
    }

    async fn ride(&self, ride_id: Uuid) -> Result<Option<RideRequest>, StoreError> {
        Ok(self.state.lock().await.rides.get(&ride_id).cloned())
    }

    async fn rides_by_status(
        &self,
        status: RideStatus,
        limit: usize,
    ) -> Result<Vec<RideRequest>, StoreError> {
        let state = self.state.lock().await;
        let mut rides: Vec<RideRequest> = state
            .rides
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        rides.sort_by_key(|r| (r.created_at, r.ride_id));
        rides.truncate(limit);
        Ok(rides)
    }

    async fn rides_needing_attention(
        &self,
        now: PrimitiveDateTime,
        prebook_horizon: PrimitiveDateTime,
        limit: usize,
    ) -> Result<Vec<RideRequest>, StoreError> {
        let state = self.state.lock().await;
        let mut rides: Vec<RideRequest> = state
            .rides
            .values()
            .filter(|r| state.needs_attention(r, now))
            .cloned()
            .collect();
        rides.sort_by_key(|r| (!r.is_urgent(prebook_horizon), r.created_at, r.ride_id));
        rides.truncate(limit);
        Ok(rides)
    }

    async fn cancel_ride(
        &self,
        ride_id: Uuid,
        now: PrimitiveDateTime,
    ) -> Result<CancelOutcome, StoreError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(ride) = state.rides.get(&ride_id).cloned() else {
            return Ok(CancelOutcome::RideNotFound);
        };
        if ride.status == RideStatus::Cancelled {
            return Ok(CancelOutcome::AlreadyCancelled(ride));
        }
        let pending = state.pending_ids_of(ride_id, None);
        let withdrawn = state.resolve(&pending, OfferState::Superseded, now);
        let released = state
            .assignments
            .get_mut(&ride_id)
            .filter(|a| a.is_active())
            .map(|a| {
                a.released_at = Some(now);
                a.clone()
            });
        let ride = state
            .set_ride_status(ride_id, RideStatus::Cancelled, now)
            .unwrap_or(ride);
        Ok(CancelOutcome::Cancelled {
            ride,
            withdrawn,
            released,
        })
    }

    async fn expire_ride(
        &self,
        ride_id: Uuid,
        now: PrimitiveDateTime,
    ) -> Result<ExpireOutcome, StoreError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(ride) = state.rides.get(&ride_id).cloned() else {
            return Ok(ExpireOutcome::RideNotFound);
        };
        if !ride.status.is_dispatchable() || now < ride.match_deadline {
            return Ok(ExpireOutcome::Unchanged(ride.status));
        }
        let pending = state.pending_ids_of(ride_id, None);
        let withdrawn = state.resolve(&pending, OfferState::Superseded, now);
        let ride = state
            .set_ride_status(ride_id, RideStatus::Expired, now)
            .unwrap_or(ride);
        Ok(ExpireOutcome::Expired { ride, withdrawn })
    }

    async fn reopen_ride(
        &self,
        ride_id: Uuid,
        match_deadline: PrimitiveDateTime,
        now: PrimitiveDateTime,
    ) -> Result<ReopenOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let Some(ride) = state.rides.get_mut(&ride_id) else {
            return Ok(ReopenOutcome::RideNotFound);
        };
        if ride.status != RideStatus::Expired {
            return Ok(ReopenOutcome::Unchanged(ride.status));
        }
        ride.status = RideStatus::Unmatched;
        ride.match_deadline = match_deadline;
        ride.updated_at = now;
        Ok(ReopenOutcome::Reopened(ride.clone()))
    }

    async fn offer(&self, offer_id: Uuid) -> Result<Option<Offer>, StoreError> {
        Ok(self.state.lock().await.offers.get(&offer_id).cloned())
    }

    async fn offers_for_ride(&self, ride_id: Uuid) -> Result<Vec<Offer>, StoreError> {
        Ok(self.state.lock().await.offers_of(ride_id))
    }

    async fn live_offers_for_driver(
        &self,
        driver_id: Uuid,
        now: PrimitiveDateTime,
    ) -> Result<Vec<Offer>, StoreError> {
        let state = self.state.lock().await;
        let mut offers: Vec<Offer> = state
            .offers
            .values()
            .filter(|o| o.driver_id == driver_id && o.is_live(now))
            .cloned()
            .collect();
        offers.sort_by_key(|o| (o.expires_at, o.offer_id));
        Ok(offers)
    }

    async fn apply_dispatch_round(&self, round: DispatchRound) -> Result<RoundOutcome, StoreError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(ride) = state.rides.get(&round.ride_id).cloned() else {
            return Ok(RoundOutcome::RideNotFound);
        };
        if !ride.status.is_dispatchable() {
            return Ok(RoundOutcome::NotDispatchable(ride.status));
        }

        let existing = state.offers_of(ride.ride_id);
        let plan = plan_round(&existing, &round.candidates, round.now);
        let expired = state.resolve(&plan.expire, OfferState::Expired, round.now);
        let superseded = state.resolve(&plan.supersede, OfferState::Superseded, round.now);
        let kept: Vec<Offer> = plan
            .keep
            .iter()
            .filter_map(|id| state.offers.get(id).cloned())
            .collect();
        let created = new_offers(
            ride.ride_id,
            &plan.create,
            ride.dispatch_rounds + 1,
            round.now,
            round.expires_at,
        );
        let ride_offers = state.ride_offers.entry(ride.ride_id).or_default();
        for offer in &created {
            ride_offers.push(offer.offer_id);
        }
        for offer in &created {
            state.offers.insert(offer.offer_id, offer.clone());
        }

        let previous_status = ride.status;
        let updated = match state.rides.get_mut(&ride.ride_id) {
            Some(stored) => {
                stored.status = plan.resulting_status();
                stored.dispatch_rounds += 1;
                stored.first_dispatched_at.get_or_insert(round.now);
                stored.updated_at = round.now;
                stored.clone()
            }
            None => ride,
        };

        Ok(RoundOutcome::Applied(RoundReport {
            ride: updated,
            created,
            kept,
            superseded,
            expired,
            previous_status,
        }))
    }

    async fn accept_offer(
        &self,
        offer_id: Uuid,
        driver_id: Uuid,
        schedule_buffer: Duration,
        now: PrimitiveDateTime,
    ) -> Result<AcceptOutcome, StoreError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(offer) = state.offers.get(&offer_id).cloned() else {
            return Ok(AcceptOutcome::OfferNotFound);
        };
        let ride = state.ride_of(&offer)?;
        let decision = decide_accept(&OfferContext {
            offer: &offer,
            ride_status: ride.status,
            driver_id,
            driver_online: state.is_online(driver_id),
            schedule_conflict: state.has_schedule_conflict(driver_id, &ride, schedule_buffer),
            now,
        });

        match decision {
            AcceptDecision::Claim => {
                let Some(accepted) = state.resolve(&[offer_id], OfferState::Accepted, now).pop()
                else {
                    return Ok(AcceptOutcome::Rejected(Rejection::NoLongerAvailable));
                };
                let mut losing = state.pending_ids_of(ride.ride_id, Some(offer_id));
                losing.extend(state.overlapping_pending_ids(driver_id, &ride, schedule_buffer));
                let superseded = state.resolve(&losing, OfferState::Superseded, now);
                let ride = state
                    .set_ride_status(ride.ride_id, RideStatus::Assigned, now)
                    .unwrap_or(ride);
                let assignment = state
                    .assignments
                    .entry(ride.ride_id)
                    .or_insert_with(|| assignment_for(&accepted, &ride, now))
                    .clone();
                Ok(AcceptOutcome::Claimed {
                    offer: accepted,
                    assignment,
                    superseded,
                    ride,
                })
            }
            AcceptDecision::AlreadyAccepted => {
                let assignment = state
                    .assignments
                    .entry(ride.ride_id)
                    .or_insert_with(|| assignment_for(&offer, &ride, now))
                    .clone();
                Ok(AcceptOutcome::AlreadyAccepted { offer, assignment })
            }
            AcceptDecision::ExpireAndReject => {
                state.resolve(&[offer_id], OfferState::Expired, now);
                Ok(AcceptOutcome::Rejected(Rejection::Expired))
            }
            AcceptDecision::Reject(rejection) => Ok(AcceptOutcome::Rejected(rejection)),
        }
    }

    async fn decline_offer(
        &self,
        offer_id: Uuid,
        driver_id: Uuid,
        reason: Option<String>,
        now: PrimitiveDateTime,
    ) -> Result<DeclineOutcome, StoreError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(offer) = state.offers.get(&offer_id).cloned() else {
            return Ok(DeclineOutcome::OfferNotFound);
        };
        let ride = state.ride_of(&offer)?;
        let decision = decide_decline(&OfferContext {
            offer: &offer,
            ride_status: ride.status,
            driver_id,
            driver_online: state.is_online(driver_id),
            schedule_conflict: false,
            now,
        });

        match decision {
            DeclineDecision::Decline => {
                let Some(mut declined) = state.resolve(&[offer_id], OfferState::Declined, now).pop()
                else {
                    return Ok(DeclineOutcome::Rejected(Rejection::NoLongerAvailable));
                };
                if let Some(stored) = state.offers.get_mut(&offer_id) {
                    stored.decline_reason = reason;
                    declined = stored.clone();
                }
                let live_remaining = state
                    .offers_of(ride.ride_id)
                    .iter()
                    .filter(|o| o.is_live(now))
                    .count();
                Ok(DeclineOutcome::Declined {
                    offer: declined,
                    live_remaining,
                    ride_status: ride.status,
                })
            }
            DeclineDecision::AlreadyDeclined => Ok(DeclineOutcome::AlreadyDeclined(offer)),
            DeclineDecision::ExpireAndReject => {
                state.resolve(&[offer_id], OfferState::Expired, now);
                Ok(DeclineOutcome::Rejected(Rejection::Expired))
            }
            DeclineDecision::Reject(rejection) => Ok(DeclineOutcome::Rejected(rejection)),
        }
    }

    async fn expire_due_offers(&self, now: PrimitiveDateTime) -> Result<Vec<Offer>, StoreError> {
        let mut state = self.state.lock().await;
        let due: Vec<Uuid> = state
            .offers
            .values()
            .filter(|o| o.is_due(now))
            .map(|o| o.offer_id)
            .collect();
        let mut expired = state.resolve(&due, OfferState::Expired, now);
        expired.sort_by_key(|o| (o.expires_at, o.offer_id));
        Ok(expired)
    }

    async fn assignment_for_ride(&self, ride_id: Uuid) -> Result<Option<Assignment>, StoreError> {
        Ok(self.state.lock().await.assignments.get(&ride_id).cloned())
    }

    async fn ensure_assignment(
        &self,
        offer: &Offer,
        now: PrimitiveDateTime,
    ) -> Result<EnsureOutcome, StoreError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if let Some(existing) = state.assignments.get(&offer.ride_id) {
            return Ok(EnsureOutcome::Existing(existing.clone()));
        }
        let ride = state.ride_of(offer)?;
        let won = state
            .offers
            .get(&offer.offer_id)
            .is_some_and(|o| o.state == OfferState::Accepted);
        if ride.status != RideStatus::Assigned || !won {
            return Ok(EnsureOutcome::RideNotAssigned(ride.status));
        }
        let assignment = assignment_for(offer, &ride, now);
        state.assignments.insert(ride.ride_id, assignment.clone());
        Ok(EnsureOutcome::Created(assignment))
    }

    async fn claim_calendar_write(
        &self,
        assignment_id: Uuid,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let Some(assignment) = state
            .assignments
            .values_mut()
            .find(|a| a.assignment_id == assignment_id)
        else {
            return Ok(false);
        };
        let unclaimed = assignment.is_active()
            && assignment.calendar_entry_id.is_none()
            && assignment.calendar_attempts == 0
            && assignment.calendar_last_tried_at.is_none();
        if unclaimed {
            assignment.calendar_last_tried_at = Some(now);
        }
        Ok(unclaimed)
    }

    async fn record_calendar_attempt(
        &self,
        assignment_id: Uuid,
        entry_id: Option<String>,
        now: PrimitiveDateTime,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(assignment) = state
            .assignments
            .values_mut()
            .find(|a| a.assignment_id == assignment_id)
        {
            if assignment.calendar_entry_id.is_none() {
                assignment.calendar_entry_id = entry_id;
            }
            assignment.calendar_attempts += 1;
            assignment.calendar_last_tried_at = Some(now);
        }
        Ok(())
    }

    async fn assignments_missing_calendar(
        &self,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<Assignment>, StoreError> {
        let state = self.state.lock().await;
        let mut pending: Vec<Assignment> = state
            .assignments
            .values()
            .filter(|a| a.is_active() && a.calendar_entry_id.is_none())
            .filter(|a| a.calendar_attempts() < max_attempts)
            .cloned()
            .collect();
        pending.sort_by_key(|a| (a.assigned_at, a.assignment_id));
        pending.truncate(limit);
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const NOW: PrimitiveDateTime = datetime!(2025-03-03 10:00:00);

    fn session_id(open: &Option<SessionOpen>) -> Option<i64> {
        match open {
            Some(SessionOpen::Opened(s) | SessionOpen::AlreadyOpen(s)) => Some(s.session_id),
            None => None,
        }
    }

    #[tokio::test]
    async fn at_most_one_open_session_per_driver() {
        let store = InMemoryStore::new();
        let driver = Uuid::from_u128(1);

        let first = store.open_session(driver, None, NOW).await.ok();
        let second = store.open_session(driver, None, NOW).await.ok();
        assert!(matches!(first, Some(SessionOpen::Opened(_))));
        assert!(matches!(second, Some(SessionOpen::AlreadyOpen(_))));
        let first_id = session_id(&first);
        assert_eq!(first_id, session_id(&second));

        let closed = store
            .close_session(driver, SessionEndReason::Offline, NOW)
            .await
            .ok()
            .flatten();
        assert_eq!(
            closed.map(|s| s.end_reason),
            Some(Some(SessionEndReason::Offline))
        );
        assert!(matches!(
            store.open_session(driver, None, NOW).await,
            Ok(SessionOpen::Opened(s)) if Some(s.session_id) == first_id.map(|id| id + 1)
        ));
    }

    #[tokio::test]
    async fn stale_sessions_close_with_timeout_reason() {
        let store = InMemoryStore::new();
        let fresh = Uuid::from_u128(1);
        let stale = Uuid::from_u128(2);
        store.open_session(stale, None, NOW).await.ok();
        store
            .open_session(fresh, None, NOW + Duration::seconds(60))
            .await
            .ok();

        let closed = store
            .close_stale_sessions(NOW + Duration::seconds(30), NOW + Duration::seconds(95))
            .await
            .unwrap_or_default();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].driver_id, stale);
        assert_eq!(closed[0].end_reason, Some(SessionEndReason::HeartbeatTimeout));
        let open = store.open_sessions().await.unwrap_or_default();
        assert_eq!(open.iter().map(|s| s.driver_id).collect::<Vec<_>>(), vec![fresh]);
    }
}
