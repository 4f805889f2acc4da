//! Transition rules shared by every [`MatchStore`](crate::store::MatchStore)
//! backend.
//!
//! A store loads the rows an atomic unit touches, asks these functions what
//! to do, and applies the answer before releasing its lock or committing.

use crate::entities::{Offer, OfferState, RideStatus};
use std::collections::HashSet;
use time::{Duration, PrimitiveDateTime};
use uuid::Uuid;

/// Why a driver's answer to an offer was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("ride no longer available")]
    NoLongerAvailable,
    #[error("offer expired")]
    Expired,
    #[error("offer withdrawn: ride cancelled")]
    RideCancelled,
    #[error("offer was made to another driver")]
    NotRecipient,
    #[error("driver is not online")]
    DriverOffline,
    #[error("driver already has an overlapping assignment")]
    ScheduleConflict,
}

/// State an accept or decline is judged against, read under the ride lock.
#[derive(Debug, Clone, Copy)]
pub struct OfferContext<'a> {
    pub offer: &'a Offer,
    pub ride_status: RideStatus,
    pub driver_id: Uuid,
    pub driver_online: bool,
    /// The driver holds another active assignment within the schedule
    /// buffer of this ride's window.
    pub schedule_conflict: bool,
    pub now: PrimitiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptDecision {
    /// Claim the ride: ride `offering → assigned`, offer `pending → accepted`,
    /// every sibling pending offer `→ superseded`, assignment inserted.
    /// The driver's pending offers on overlapping rides are superseded too.
    Claim,
    /// Duplicate delivery of an acceptance that already won.
    AlreadyAccepted,
    /// The offer outlived its expiry; mark it expired and refuse.
    ExpireAndReject,
    Reject(Rejection),
}

/// Decide an accept.
///
/// Cancellation is checked before anything else the driver could retry on,
/// so no accept ever succeeds on a cancelled ride, duplicates included.
pub fn decide_accept(ctx: &OfferContext<'_>) -> AcceptDecision {
    let offer = ctx.offer;
    if offer.driver_id != ctx.driver_id {
        return AcceptDecision::Reject(Rejection::NotRecipient);
    }
    if ctx.ride_status == RideStatus::Cancelled {
        return AcceptDecision::Reject(Rejection::RideCancelled);
    }
    match offer.state {
        OfferState::Accepted => return AcceptDecision::AlreadyAccepted,
        OfferState::Pending => {}
        _ => return AcceptDecision::Reject(Rejection::NoLongerAvailable),
    }
    if offer.is_due(ctx.now) {
        return AcceptDecision::ExpireAndReject;
    }
    if ctx.ride_status != RideStatus::Offering {
        return AcceptDecision::Reject(Rejection::NoLongerAvailable);
    }
    if !ctx.driver_online {
        return AcceptDecision::Reject(Rejection::DriverOffline);
    }
    if ctx.schedule_conflict {
        return AcceptDecision::Reject(Rejection::ScheduleConflict);
    }
    AcceptDecision::Claim
}

/// Whether two ride windows come closer to each other than `buffer`.
pub fn windows_conflict(
    (a_start, a_end): (PrimitiveDateTime, PrimitiveDateTime),
    (b_start, b_end): (PrimitiveDateTime, PrimitiveDateTime),
    buffer: Duration,
) -> bool {
    a_start < b_end + buffer && b_start < a_end + buffer
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineDecision {
    Decline,
    AlreadyDeclined,
    ExpireAndReject,
    Reject(Rejection),
}

/// Decide a decline. Declining never depends on the driver being online.
pub fn decide_decline(ctx: &OfferContext<'_>) -> DeclineDecision {
    let offer = ctx.offer;
    if offer.driver_id != ctx.driver_id {
        return DeclineDecision::Reject(Rejection::NotRecipient);
    }
    match offer.state {
        OfferState::Declined => return DeclineDecision::AlreadyDeclined,
        OfferState::Pending => {}
        _ if ctx.ride_status == RideStatus::Cancelled => {
            return DeclineDecision::Reject(Rejection::RideCancelled);
        }
        _ => return DeclineDecision::Reject(Rejection::NoLongerAvailable),
    }
    if offer.is_due(ctx.now) {
        return DeclineDecision::ExpireAndReject;
    }
    DeclineDecision::Decline
}

/// An eligible driver picked for a dispatch round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankedDriver {
    pub driver_id: Uuid,
    pub rank: u32,
}

/// What one dispatch round does to a ride's offers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundPlan {
    /// Pending offers already past their expiry.
    pub expire: Vec<Uuid>,
    /// Live offers of drivers that did not make this round's candidate list.
    pub supersede: Vec<Uuid>,
    /// Live offers left alone.
    pub keep: Vec<Uuid>,
    /// Drivers that get a new offer.
    pub create: Vec<RankedDriver>,
}

impl RoundPlan {
    pub fn live_after(&self) -> usize {
        self.keep.len() + self.create.len()
    }

    /// Ride status once the round is applied.
    pub fn resulting_status(&self) -> RideStatus {
        if self.live_after() == 0 {
            RideStatus::Unmatched
        } else {
            RideStatus::Offering
        }
    }
}

/// Reconcile a ride's existing offers with this round's candidates.
///
/// Re-running with the same candidates creates nothing new. Drivers who
/// declined the ride in any earlier round are never offered it again;
/// drivers whose earlier offer merely expired are.
pub fn plan_round(
    existing: &[Offer],
    candidates: &[RankedDriver],
    now: PrimitiveDateTime,
) -> RoundPlan {
    let wanted: HashSet<Uuid> = candidates.iter().map(|c| c.driver_id).collect();
    let declined: HashSet<Uuid> = existing
        .iter()
        .filter(|o| o.state == OfferState::Declined)
        .map(|o| o.driver_id)
        .collect();

    let mut plan = RoundPlan::default();
    let mut has_live: HashSet<Uuid> = HashSet::new();
    for offer in existing.iter().filter(|o| o.state == OfferState::Pending) {
        if offer.is_due(now) {
            plan.expire.push(offer.offer_id);
        } else if wanted.contains(&offer.driver_id) {
            plan.keep.push(offer.offer_id);
            has_live.insert(offer.driver_id);
        } else {
            plan.supersede.push(offer.offer_id);
        }
    }

    plan.create = candidates
        .iter()
        .filter(|c| !has_live.contains(&c.driver_id) && !declined.contains(&c.driver_id))
        .copied()
        .collect();
    plan
}

/// Materialise the offers a plan creates.
pub fn new_offers(
    ride_id: Uuid,
    drivers: &[RankedDriver],
    round: i32,
    now: PrimitiveDateTime,
    expires_at: PrimitiveDateTime,
) -> Vec<Offer> {
    drivers
        .iter()
        .map(|d| Offer {
            offer_id: Uuid::now_v7(),
            ride_id,
            driver_id: d.driver_id,
            state: OfferState::Pending,
            round,
            rank: i32::try_from(d.rank).unwrap_or(i32::MAX),
            created_at: now,
            expires_at,
            responded_at: None,
            decline_reason: None,
        })
        .collect()
}
