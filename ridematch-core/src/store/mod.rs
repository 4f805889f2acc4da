//! Storage seam of the matching engine.
//!
//! Every state-changing method of [`MatchStore`] is one atomic unit: either
//! all of its writes become visible or none do, and two units touching the
//! same ride never interleave. The transition decisions themselves live in
//! [`crate::matching::rules`], so both backends agree on them.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgMatchStore;

use crate::entities::{
    Assignment, DriverProfile, DriverSession, Offer, RideRequest, RideStatus, SessionEndReason,
};
use crate::matching::rules::{RankedDriver, Rejection};
use async_trait::async_trait;
use ridematch_sdk::objects::GeoPoint;
use std::sync::Arc;
use thiserror::Error;
use time::{Duration, PrimitiveDateTime};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The unit kept hitting serialization failures or deadlocks.
    #[error("atomic unit {unit} failed after {attempts} attempts")]
    RetriesExhausted { unit: &'static str, attempts: u32 },

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type SharedStore = Arc<dyn MatchStore>;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOpen {
    Opened(DriverSession),
    AlreadyOpen(DriverSession),
}

/// Input of [`MatchStore::apply_dispatch_round`].
#[derive(Debug, Clone)]
pub struct DispatchRound {
    pub ride_id: Uuid,
    /// Eligible drivers, best first, already cut to the per-round limit.
    pub candidates: Vec<RankedDriver>,
    pub expires_at: PrimitiveDateTime,
    pub now: PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundReport {
    /// The ride after the round.
    pub ride: RideRequest,
    pub created: Vec<Offer>,
    pub kept: Vec<Offer>,
    pub superseded: Vec<Offer>,
    pub expired: Vec<Offer>,
    /// Status before the round.
    pub previous_status: RideStatus,
}

impl RoundReport {
    pub fn live_offers(&self) -> usize {
        self.created.len() + self.kept.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    Applied(RoundReport),
    NotDispatchable(RideStatus),
    RideNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    Claimed {
        offer: Offer,
        assignment: Assignment,
        /// Sibling offers on the ride plus the winner's pending offers on
        /// overlapping rides.
        superseded: Vec<Offer>,
        ride: RideRequest,
    },
    AlreadyAccepted {
        offer: Offer,
        assignment: Assignment,
    },
    Rejected(Rejection),
    OfferNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclineOutcome {
    Declined {
        offer: Offer,
        /// Live pending offers the ride still has after this decline.
        live_remaining: usize,
        ride_status: RideStatus,
    },
    AlreadyDeclined(Offer),
    Rejected(Rejection),
    OfferNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled {
        ride: RideRequest,
        withdrawn: Vec<Offer>,
        released: Option<Assignment>,
    },
    AlreadyCancelled(RideRequest),
    RideNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpireOutcome {
    Expired {
        ride: RideRequest,
        withdrawn: Vec<Offer>,
    },
    /// Not searching any more, or the deadline has not passed.
    Unchanged(RideStatus),
    RideNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReopenOutcome {
    Reopened(RideRequest),
    Unchanged(RideStatus),
    RideNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    Existing(Assignment),
    Created(Assignment),
    /// No assignment, and the ride is not assigned to the offer's driver.
    RideNotAssigned(RideStatus),
}

#[async_trait]
pub trait MatchStore: Send + Sync {
    // Presence.

    /// Open a session unless the driver already has one open.
    async fn open_session(
        &self,
        driver_id: Uuid,
        location: Option<GeoPoint>,
        now: PrimitiveDateTime,
    ) -> Result<SessionOpen, StoreError>;

    async fn close_session(
        &self,
        driver_id: Uuid,
        reason: SessionEndReason,
        now: PrimitiveDateTime,
    ) -> Result<Option<DriverSession>, StoreError>;

    async fn touch_session(
        &self,
        driver_id: Uuid,
        location: Option<GeoPoint>,
        now: PrimitiveDateTime,
    ) -> Result<Option<DriverSession>, StoreError>;

    async fn open_session_for(&self, driver_id: Uuid) -> Result<Option<DriverSession>, StoreError>;

    /// Every open session, ordered by driver id.
    async fn open_sessions(&self) -> Result<Vec<DriverSession>, StoreError>;

    /// Close sessions whose last heartbeat is older than `cutoff`.
    async fn close_stale_sessions(
        &self,
        cutoff: PrimitiveDateTime,
        now: PrimitiveDateTime,
    ) -> Result<Vec<DriverSession>, StoreError>;

    // Profiles and schedules.

    async fn upsert_driver_profile(&self, profile: DriverProfile)
    -> Result<DriverProfile, StoreError>;

    async fn driver_profiles(&self, driver_ids: &[Uuid]) -> Result<Vec<DriverProfile>, StoreError>;

    /// Active assignments of `driver_ids` overlapping `[from, to)`.
    async fn active_assignments(
        &self,
        driver_ids: &[Uuid],
        from: PrimitiveDateTime,
        to: PrimitiveDateTime,
    ) -> Result<Vec<Assignment>, StoreError>;

    // Rides.

    async fn insert_ride(&self, ride: RideRequest) -> Result<(), StoreError>;

    async fn ride(&self, ride_id: Uuid) -> Result<Option<RideRequest>, StoreError>;

    /// Oldest first.
    async fn rides_by_status(
        &self,
        status: RideStatus,
        limit: usize,
    ) -> Result<Vec<RideRequest>, StoreError>;

    /// Searching rides that are past their deadline, unmatched, or offering
    /// without a live offer. Rides that are
    /// [urgent](RideRequest::is_urgent) by `prebook_horizon` come first,
    /// then oldest first.
    async fn rides_needing_attention(
        &self,
        now: PrimitiveDateTime,
        prebook_horizon: PrimitiveDateTime,
        limit: usize,
    ) -> Result<Vec<RideRequest>, StoreError>;

    /// Rider cancellation: ride `→ cancelled`, pending offers `→ superseded`,
    /// active assignment released.
    async fn cancel_ride(
        &self,
        ride_id: Uuid,
        now: PrimitiveDateTime,
    ) -> Result<CancelOutcome, StoreError>;

    /// Outer deadline: a searching ride past its deadline `→ expired`,
    /// pending offers `→ superseded`.
    async fn expire_ride(
        &self,
        ride_id: Uuid,
        now: PrimitiveDateTime,
    ) -> Result<ExpireOutcome, StoreError>;

    /// Put an expired ride back into search with a new deadline.
    async fn reopen_ride(
        &self,
        ride_id: Uuid,
        match_deadline: PrimitiveDateTime,
        now: PrimitiveDateTime,
    ) -> Result<ReopenOutcome, StoreError>;

    // Offers.

    async fn offer(&self, offer_id: Uuid) -> Result<Option<Offer>, StoreError>;

    async fn offers_for_ride(&self, ride_id: Uuid) -> Result<Vec<Offer>, StoreError>;

    async fn live_offers_for_driver(
        &self,
        driver_id: Uuid,
        now: PrimitiveDateTime,
    ) -> Result<Vec<Offer>, StoreError>;

    /// Reconcile the ride's offers with a new candidate list and record the
    /// round, see [`crate::matching::rules::plan_round`].
    async fn apply_dispatch_round(&self, round: DispatchRound) -> Result<RoundOutcome, StoreError>;

    /// The winning driver must not hold another active assignment within
    /// `schedule_buffer` of the ride. A claim also supersedes their pending
    /// offers on rides in that range.
    async fn accept_offer(
        &self,
        offer_id: Uuid,
        driver_id: Uuid,
        schedule_buffer: Duration,
        now: PrimitiveDateTime,
    ) -> Result<AcceptOutcome, StoreError>;

    async fn decline_offer(
        &self,
        offer_id: Uuid,
        driver_id: Uuid,
        reason: Option<String>,
        now: PrimitiveDateTime,
    ) -> Result<DeclineOutcome, StoreError>;

    /// Expire every pending offer past its expiry.
    async fn expire_due_offers(&self, now: PrimitiveDateTime) -> Result<Vec<Offer>, StoreError>;

    // Assignments.

    async fn assignment_for_ride(&self, ride_id: Uuid) -> Result<Option<Assignment>, StoreError>;

    /// Return the ride's assignment, creating it from the accepted offer if
    /// the ride is assigned but has none.
    async fn ensure_assignment(
        &self,
        offer: &Offer,
        now: PrimitiveDateTime,
    ) -> Result<EnsureOutcome, StoreError>;

    /// Take the first calendar write of an assignment. Only one caller ever
    /// gets `true`; it marks the attempt as started, so later writes go
    /// through the retry backoff.
    async fn claim_calendar_write(
        &self,
        assignment_id: Uuid,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError>;

    /// Record one calendar write. `entry_id = None` is a failed attempt.
    async fn record_calendar_attempt(
        &self,
        assignment_id: Uuid,
        entry_id: Option<String>,
        now: PrimitiveDateTime,
    ) -> Result<(), StoreError>;

    /// Active assignments without a calendar entry and with fewer than
    /// `max_attempts` failed writes.
    async fn assignments_missing_calendar(
        &self,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<Assignment>, StoreError>;
}

/// Build the assignment a winning offer creates.
pub(crate) fn assignment_for(
    offer: &Offer,
    ride: &RideRequest,
    now: PrimitiveDateTime,
) -> Assignment {
    Assignment {
        assignment_id: Uuid::now_v7(),
        ride_id: ride.ride_id,
        driver_id: offer.driver_id,
        offer_id: offer.offer_id,
        window_start: ride.window_start,
        window_end: ride.window_end,
        assigned_at: now,
        calendar_entry_id: None,
        calendar_attempts: 0,
        calendar_last_tried_at: None,
        released_at: None,
    }
}
