use crate::config::{ConfigStore, MatchingConfig};
use crate::entities::{Assignment, Offer, RideStatus};
use crate::events::{EventSenders, NotificationEvent, RideStatusUpdate};
use crate::matching::MatchError;
use crate::store::{AcceptOutcome, DeclineOutcome, SharedStore};
use crate::utils::SharedClock;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedOffer {
    pub offer: Offer,
    pub assignment: Assignment,
    /// `false` when this accept repeated an earlier winning one.
    pub newly_claimed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclinedOffer {
    pub offer: Offer,
    /// The ride is still searching but has no live offer left.
    pub ride_left_without_offers: bool,
}

/// Resolves driver answers to offers.
///
/// The claim itself happens inside one store unit, so of several drivers
/// accepting the same ride exactly one wins and the rest get
/// [`MatchError::OfferNoLongerAvailable`]. The same unit refuses a driver
/// who already holds an assignment overlapping the ride.
#[derive(Clone)]
pub struct OfferStateMachine {
    store: SharedStore,
    clock: SharedClock,
    config: ConfigStore<MatchingConfig>,
    events: EventSenders,
}

impl OfferStateMachine {
    pub fn new(
        store: SharedStore,
        clock: SharedClock,
        config: ConfigStore<MatchingConfig>,
        events: EventSenders,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            events,
        }
    }

    pub async fn accept(
        &self,
        offer_id: Uuid,
        driver_id: Uuid,
    ) -> Result<AcceptedOffer, MatchError> {
        let schedule_buffer = self.config.snapshot().await.schedule_buffer;
        match self
            .store
            .accept_offer(offer_id, driver_id, schedule_buffer, self.clock.now())
            .await?
        {
            AcceptOutcome::Claimed {
                offer,
                assignment,
                superseded,
                ride,
            } => {
                info!(
                    ride_id = %ride.ride_id,
                    %driver_id,
                    %offer_id,
                    superseded = superseded.len(),
                    "Offer accepted, ride assigned"
                );
                self.events.publish_status(RideStatusUpdate {
                    ride_id: ride.ride_id,
                    status: RideStatus::Assigned,
                });
                for lost in &superseded {
                    self.events.notify(NotificationEvent::OfferWithdrawn {
                        driver_id: lost.driver_id,
                        offer_id: lost.offer_id,
                        ride_id: lost.ride_id,
                    });
                }
                Ok(AcceptedOffer {
                    offer,
                    assignment,
                    newly_claimed: true,
                })
            }
            AcceptOutcome::AlreadyAccepted { offer, assignment } => {
                debug!(%offer_id, %driver_id, "Repeated accept of a winning offer");
                Ok(AcceptedOffer {
                    offer,
                    assignment,
                    newly_claimed: false,
                })
            }
            AcceptOutcome::Rejected(rejection) => {
                debug!(%offer_id, %driver_id, %rejection, "Accept rejected");
                Err(rejection.into())
            }
            AcceptOutcome::OfferNotFound => Err(MatchError::OfferNotFound(offer_id)),
        }
    }

    pub async fn decline(
        &self,
        offer_id: Uuid,
        driver_id: Uuid,
        reason: Option<String>,
    ) -> Result<DeclinedOffer, MatchError> {
        match self
            .store
            .decline_offer(offer_id, driver_id, reason, self.clock.now())
            .await?
        {
            DeclineOutcome::Declined {
                offer,
                live_remaining,
                ride_status,
            } => {
                info!(
                    ride_id = %offer.ride_id,
                    %driver_id,
                    %offer_id,
                    live_remaining,
                    "Offer declined"
                );
                Ok(DeclinedOffer {
                    offer,
                    ride_left_without_offers: live_remaining == 0 && ride_status.is_dispatchable(),
                })
            }
            DeclineOutcome::AlreadyDeclined(offer) => Ok(DeclinedOffer {
                offer,
                ride_left_without_offers: false,
            }),
            DeclineOutcome::Rejected(rejection) => {
                debug!(%offer_id, %driver_id, %rejection, "Decline rejected");
                Err(rejection.into())
            }
            DeclineOutcome::OfferNotFound => Err(MatchError::OfferNotFound(offer_id)),
        }
    }

    /// Move every pending offer past its expiry to `expired`.
    pub async fn sweep_expired(&self) -> Result<Vec<Offer>, MatchError> {
        let expired = self.store.expire_due_offers(self.clock.now()).await?;
        if !expired.is_empty() {
            debug!(count = expired.len(), "Expired offers");
        }
        Ok(expired)
    }
}
