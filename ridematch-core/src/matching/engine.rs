use crate::collaborators::SharedCalendar;
use crate::config::{ConfigStore, MatchingConfig};
use crate::entities::{Assignment, DriverProfile, Offer, RideKind, RideRequest, RideStatus};
use crate::events::{EventSenders, NotificationEvent, RideStatusUpdate};
use crate::matching::coordinator::AssignmentCoordinator;
use crate::matching::dispatcher::{DispatchOutcome, OfferDispatcher};
use crate::matching::offers::{AcceptedOffer, OfferStateMachine};
use crate::matching::presence::DriverPresenceRegistry;
use crate::matching::MatchError;
use crate::store::{CancelOutcome, ReopenOutcome, SharedStore};
use crate::utils::SharedClock;
use ridematch_sdk::objects::{AccessibilityFeature, VehicleClass};
use std::collections::BTreeSet;
use time::{Duration, PrimitiveDateTime};
use tracing::{error, info, warn};
use uuid::Uuid;

/// A ride as submitted by the booking side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRide {
    pub rider_id: Uuid,
    pub pickup: String,
    pub dropoff: String,
    pub kind: RideKind,
    /// Required for pre-booked rides. Immediate rides start at creation.
    pub window_start: Option<PrimitiveDateTime>,
    pub duration: Duration,
    pub accessibility: BTreeSet<AccessibilityFeature>,
    pub required_vehicle: Option<VehicleClass>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRide {
    pub ride: RideRequest,
    pub dispatch: DispatchOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelledRide {
    pub ride: RideRequest,
    /// `false` when the ride had been cancelled before.
    pub changed: bool,
    pub withdrawn: Vec<Offer>,
    pub released: Option<Assignment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclineResult {
    pub offer: Offer,
    /// Set when the decline left the ride without live offers and a new
    /// round ran.
    pub redispatched: Option<DispatchOutcome>,
}

/// Entry point of the matching engine.
///
/// Cheap to clone; every part shares the same store, clock, config and
/// event channels.
#[derive(Clone)]
pub struct MatchingEngine {
    store: SharedStore,
    clock: SharedClock,
    config: ConfigStore<MatchingConfig>,
    events: EventSenders,
    registry: DriverPresenceRegistry,
    dispatcher: OfferDispatcher,
    offers: OfferStateMachine,
    coordinator: AssignmentCoordinator,
}

impl MatchingEngine {
    pub fn new(
        store: SharedStore,
        clock: SharedClock,
        config: ConfigStore<MatchingConfig>,
        calendar: SharedCalendar,
        events: EventSenders,
    ) -> Self {
        let registry = DriverPresenceRegistry::new(store.clone(), clock.clone());
        let dispatcher = OfferDispatcher::new(
            store.clone(),
            clock.clone(),
            config.clone(),
            registry.clone(),
            events.clone(),
        );
        let offers = OfferStateMachine::new(
            store.clone(),
            clock.clone(),
            config.clone(),
            events.clone(),
        );
        let coordinator = AssignmentCoordinator::new(
            store.clone(),
            clock.clone(),
            config.clone(),
            calendar,
            events.clone(),
        );
        Self {
            store,
            clock,
            config,
            events,
            registry,
            dispatcher,
            offers,
            coordinator,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn config(&self) -> &ConfigStore<MatchingConfig> {
        &self.config
    }

    pub fn events(&self) -> &EventSenders {
        &self.events
    }

    pub fn registry(&self) -> &DriverPresenceRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &OfferDispatcher {
        &self.dispatcher
    }

    pub fn offers(&self) -> &OfferStateMachine {
        &self.offers
    }

    pub fn coordinator(&self) -> &AssignmentCoordinator {
        &self.coordinator
    }

    /// Store a new ride and run its first dispatch round right away.
    pub async fn create_ride(&self, new: NewRide) -> Result<CreatedRide, MatchError> {
        let config = self.config.snapshot().await;
        let now = self.clock.now();
        if new.duration <= Duration::ZERO {
            return Err(MatchError::InvalidRide("duration must be positive".to_string()));
        }
        let window_start = match (new.kind, new.window_start) {
            (RideKind::Immediate, _) => now,
            (RideKind::PreBooked, Some(start)) if start > now => start,
            (RideKind::PreBooked, Some(_)) => {
                return Err(MatchError::InvalidRide(
                    "pre-booked window must start in the future".to_string(),
                ));
            }
            (RideKind::PreBooked, None) => {
                return Err(MatchError::InvalidRide(
                    "pre-booked ride needs a window start".to_string(),
                ));
            }
        };
        let ride = RideRequest {
            ride_id: Uuid::now_v7(),
            rider_id: new.rider_id,
            pickup: new.pickup,
            dropoff: new.dropoff,
            kind: new.kind,
            window_start,
            window_end: window_start + new.duration,
            accessibility: new.accessibility,
            required_vehicle: new.required_vehicle,
            status: RideStatus::Unmatched,
            match_deadline: config.match_deadline(new.kind, now, window_start),
            dispatch_rounds: 0,
            first_dispatched_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_ride(ride.clone()).await?;
        info!(
            ride_id = %ride.ride_id,
            rider_id = %ride.rider_id,
            kind = ?ride.kind,
            match_deadline = %ride.match_deadline,
            "Ride created"
        );

        let dispatch = self.dispatcher.dispatch(ride.ride_id).await?;
        let ride = self
            .store
            .ride(ride.ride_id)
            .await?
            .ok_or(MatchError::RideNotFound(ride.ride_id))?;
        Ok(CreatedRide { ride, dispatch })
    }

    /// Accept an offer and complete the assignment.
    pub async fn accept_offer(
        &self,
        offer_id: Uuid,
        driver_id: Uuid,
    ) -> Result<AcceptedOffer, MatchError> {
        let mut accepted = self.offers.accept(offer_id, driver_id).await?;
        match self.coordinator.on_offer_accepted(&accepted.offer).await {
            Ok(assignment) => accepted.assignment = assignment,
            Err(e) => {
                error!(
                    %offer_id,
                    ride_id = %accepted.offer.ride_id,
                    error = %e,
                    "Failed to complete assignment after accept"
                );
            }
        }
        Ok(accepted)
    }

    pub async fn decline_offer(
        &self,
        offer_id: Uuid,
        driver_id: Uuid,
        reason: Option<String>,
    ) -> Result<DeclineResult, MatchError> {
        let declined = self.offers.decline(offer_id, driver_id, reason).await?;
        let redispatched = if declined.ride_left_without_offers {
            match self.dispatcher.dispatch(declined.offer.ride_id).await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    // The next sweep picks the ride up again.
                    warn!(
                        ride_id = %declined.offer.ride_id,
                        error = %e,
                        "Re-dispatch after decline failed"
                    );
                    None
                }
            }
        } else {
            None
        };
        Ok(DeclineResult {
            offer: declined.offer,
            redispatched,
        })
    }

    pub async fn cancel_ride(&self, ride_id: Uuid) -> Result<CancelledRide, MatchError> {
        match self.store.cancel_ride(ride_id, self.clock.now()).await? {
            CancelOutcome::Cancelled {
                ride,
                withdrawn,
                released,
            } => {
                info!(
                    %ride_id,
                    withdrawn = withdrawn.len(),
                    released = released.is_some(),
                    "Ride cancelled"
                );
                self.events.publish_status(RideStatusUpdate {
                    ride_id,
                    status: RideStatus::Cancelled,
                });
                for offer in &withdrawn {
                    self.events.notify(NotificationEvent::OfferWithdrawn {
                        driver_id: offer.driver_id,
                        offer_id: offer.offer_id,
                        ride_id,
                    });
                }
                if let Some(assignment) = &released {
                    self.events.notify(NotificationEvent::OfferWithdrawn {
                        driver_id: assignment.driver_id,
                        offer_id: assignment.offer_id,
                        ride_id,
                    });
                }
                Ok(CancelledRide {
                    ride,
                    changed: true,
                    withdrawn,
                    released,
                })
            }
            CancelOutcome::AlreadyCancelled(ride) => Ok(CancelledRide {
                ride,
                changed: false,
                withdrawn: Vec::new(),
                released: None,
            }),
            CancelOutcome::RideNotFound => Err(MatchError::RideNotFound(ride_id)),
        }
    }

    /// Admin re-dispatch. An expired ride is put back into search with a
    /// fresh deadline first.
    pub async fn manual_dispatch(&self, ride_id: Uuid) -> Result<DispatchOutcome, MatchError> {
        let ride = self
            .store
            .ride(ride_id)
            .await?
            .ok_or(MatchError::RideNotFound(ride_id))?;
        match ride.status {
            RideStatus::Unmatched | RideStatus::Offering => {}
            RideStatus::Expired => self.reopen(&ride).await?,
            status @ (RideStatus::Assigned | RideStatus::Cancelled) => {
                return Err(MatchError::RideNotDispatchable(status));
            }
        }
        info!(%ride_id, "Manual dispatch requested");
        self.dispatcher.dispatch(ride_id).await
    }

    async fn reopen(&self, ride: &RideRequest) -> Result<(), MatchError> {
        let config = self.config.snapshot().await;
        let now = self.clock.now();
        if ride.kind == RideKind::PreBooked && ride.window_start <= now {
            return Err(MatchError::RideNotDispatchable(RideStatus::Expired));
        }
        let deadline = config.match_deadline(ride.kind, now, ride.window_start);
        match self.store.reopen_ride(ride.ride_id, deadline, now).await? {
            ReopenOutcome::Reopened(reopened) => {
                info!(ride_id = %ride.ride_id, match_deadline = %deadline, "Expired ride reopened");
                self.events.publish_status(RideStatusUpdate {
                    ride_id: ride.ride_id,
                    status: reopened.status,
                });
                Ok(())
            }
            ReopenOutcome::Unchanged(status) if status.is_dispatchable() => Ok(()),
            ReopenOutcome::Unchanged(status) => Err(MatchError::RideNotDispatchable(status)),
            ReopenOutcome::RideNotFound => Err(MatchError::RideNotFound(ride.ride_id)),
        }
    }

    /// The ride and the driver it is assigned to, if any.
    pub async fn ride_view(
        &self,
        ride_id: Uuid,
    ) -> Result<(RideRequest, Option<Assignment>), MatchError> {
        let ride = self
            .store
            .ride(ride_id)
            .await?
            .ok_or(MatchError::RideNotFound(ride_id))?;
        let assignment = self
            .store
            .assignment_for_ride(ride_id)
            .await?
            .filter(Assignment::is_active);
        Ok((ride, assignment))
    }

    pub async fn rides_by_status(
        &self,
        status: RideStatus,
        limit: usize,
    ) -> Result<Vec<RideRequest>, MatchError> {
        Ok(self.store.rides_by_status(status, limit).await?)
    }

    pub async fn upsert_profile(
        &self,
        profile: DriverProfile,
    ) -> Result<DriverProfile, MatchError> {
        Ok(self.store.upsert_driver_profile(profile).await?)
    }

    pub async fn live_offers_for_driver(&self, driver_id: Uuid) -> Result<Vec<Offer>, MatchError> {
        Ok(self
            .store
            .live_offers_for_driver(driver_id, self.clock.now())
            .await?)
    }
}
