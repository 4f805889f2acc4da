use crate::config::{ConfigStore, MatchingConfig};
use crate::entities::{Offer, OfferState, RideRequest, RideStatus};
use crate::events::{EventSenders, NotificationEvent, RideStatusUpdate};
use crate::matching::eligibility::{DriverCandidate, EligibilityEvaluator, Evaluation};
use crate::matching::presence::DriverPresenceRegistry;
use crate::matching::rules::RankedDriver;
use crate::matching::MatchError;
use crate::store::{DispatchRound, ExpireOutcome, RoundOutcome, SharedStore};
use crate::utils::SharedClock;
use itertools::Itertools;
use ridematch_sdk::objects::DispatchSummary;
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

/// What one dispatch pass did for a ride.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// At least one offer is live. `created` are the offers sent this round.
    Offered { created: Vec<Offer>, live: usize },
    /// The ride stays `unmatched` until a later round finds someone.
    NoEligibleDrivers,
    /// The ride was not searching, or just expired.
    Skipped(RideStatus),
}

impl From<&DispatchOutcome> for DispatchSummary {
    fn from(value: &DispatchOutcome) -> Self {
        match value {
            DispatchOutcome::Offered { created, live } => DispatchSummary::Offered {
                offers_created: created.len() as u32,
                offers_live: *live as u32,
            },
            DispatchOutcome::NoEligibleDrivers => DispatchSummary::NoEligibleDrivers,
            DispatchOutcome::Skipped(status) => DispatchSummary::Skipped {
                status: (*status).into(),
            },
        }
    }
}

/// Runs dispatch rounds: finds eligible online drivers for a ride and sends
/// them offers.
///
/// Safe to call again for the same ride at any time. Drivers who still hold
/// a live offer keep it, drivers who fell out of the candidate list lose
/// theirs, and drivers who declined are never asked again.
#[derive(Clone)]
pub struct OfferDispatcher {
    store: SharedStore,
    clock: SharedClock,
    config: ConfigStore<MatchingConfig>,
    registry: DriverPresenceRegistry,
    events: EventSenders,
}

impl OfferDispatcher {
    pub fn new(
        store: SharedStore,
        clock: SharedClock,
        config: ConfigStore<MatchingConfig>,
        registry: DriverPresenceRegistry,
        events: EventSenders,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            registry,
            events,
        }
    }

    pub async fn dispatch(&self, ride_id: Uuid) -> Result<DispatchOutcome, MatchError> {
        let config = self.config.snapshot().await;
        let ride = self
            .store
            .ride(ride_id)
            .await?
            .ok_or(MatchError::RideNotFound(ride_id))?;
        if !ride.status.is_dispatchable() {
            debug!(%ride_id, status = %ride.status, "Ride not dispatchable, skipping");
            return Ok(DispatchOutcome::Skipped(ride.status));
        }
        let now = self.clock.now();
        if now >= ride.match_deadline {
            let status = match self.expire_overdue(ride_id).await? {
                Some(expired) => expired.status,
                None => self
                    .store
                    .ride(ride_id)
                    .await?
                    .map_or(RideStatus::Expired, |r| r.status),
            };
            return Ok(DispatchOutcome::Skipped(status));
        }

        let candidates = self.rank_candidates(&ride, &config).await?;
        let expires_at = (now + config.offer_window(ride.kind)).min(ride.match_deadline);
        let round = DispatchRound {
            ride_id,
            candidates,
            expires_at,
            now,
        };
        let report = match self.store.apply_dispatch_round(round).await? {
            RoundOutcome::Applied(report) => report,
            RoundOutcome::NotDispatchable(status) => {
                debug!(%ride_id, %status, "Ride left search during the round");
                return Ok(DispatchOutcome::Skipped(status));
            }
            RoundOutcome::RideNotFound => return Err(MatchError::RideNotFound(ride_id)),
        };

        for offer in &report.created {
            self.events.notify(NotificationEvent::OfferCreated {
                driver_id: offer.driver_id,
                offer_id: offer.offer_id,
                ride_id,
                expires_at: offer.expires_at,
            });
        }
        self.withdraw(&report.superseded);
        if report.ride.status != report.previous_status {
            self.events.publish_status(RideStatusUpdate {
                ride_id,
                status: report.ride.status,
            });
        }

        let live = report.live_offers();
        if live == 0 {
            info!(%ride_id, round = report.ride.dispatch_rounds, "No eligible drivers for ride");
            return Ok(DispatchOutcome::NoEligibleDrivers);
        }
        info!(
            %ride_id,
            round = report.ride.dispatch_rounds,
            created = report.created.len(),
            kept = report.kept.len(),
            superseded = report.superseded.len(),
            "Dispatch round applied"
        );
        Ok(DispatchOutcome::Offered {
            created: report.created,
            live,
        })
    }

    /// Expire a searching ride whose outer deadline has passed.
    ///
    /// `None` when the ride was not expired, because it already left search
    /// or its deadline is still ahead.
    pub async fn expire_overdue(&self, ride_id: Uuid) -> Result<Option<RideRequest>, MatchError> {
        match self.store.expire_ride(ride_id, self.clock.now()).await? {
            ExpireOutcome::Expired { ride, withdrawn } => {
                info!(%ride_id, rounds = ride.dispatch_rounds, "Ride expired without a driver");
                self.withdraw(&withdrawn);
                self.events.publish_status(RideStatusUpdate {
                    ride_id,
                    status: ride.status,
                });
                self.events.notify(NotificationEvent::RideUnmatched {
                    ride_id,
                    rider_id: ride.rider_id,
                });
                Ok(Some(ride))
            }
            ExpireOutcome::Unchanged(_) => Ok(None),
            ExpireOutcome::RideNotFound => Err(MatchError::RideNotFound(ride_id)),
        }
    }

    /// Eligible online drivers for the ride, best first, cut to the
    /// per-round limit.
    async fn rank_candidates(
        &self,
        ride: &RideRequest,
        config: &MatchingConfig,
    ) -> Result<Vec<RankedDriver>, MatchError> {
        let declined: HashSet<Uuid> = self
            .store
            .offers_for_ride(ride.ride_id)
            .await?
            .into_iter()
            .filter(|o| o.state == OfferState::Declined)
            .map(|o| o.driver_id)
            .collect();
        let online: Vec<Uuid> = self
            .registry
            .snapshot_online_drivers()
            .await?
            .into_iter()
            .filter(|d| !declined.contains(d))
            .collect();
        if online.is_empty() {
            return Ok(Vec::new());
        }

        let profiles = self.store.driver_profiles(&online).await?;
        if profiles.len() < online.len() {
            debug!(
                ride_id = %ride.ride_id,
                missing = online.len() - profiles.len(),
                "Online drivers without a profile are skipped"
            );
        }
        let evaluator = EligibilityEvaluator::new(config.schedule_buffer);
        let (from, to) = evaluator.assignment_horizon(ride);
        let driver_ids: Vec<Uuid> = profiles.iter().map(|p| p.driver_id).collect();
        let schedules = self
            .store
            .active_assignments(&driver_ids, from, to)
            .await?
            .into_iter()
            .into_group_map_by(|a| a.driver_id);

        let ranked = profiles
            .iter()
            .filter_map(|profile| {
                let assignments = schedules
                    .get(&profile.driver_id)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let candidate = DriverCandidate {
                    profile,
                    assignments,
                };
                match evaluator.evaluate(ride, &candidate) {
                    Evaluation::Eligible { rank } => Some(RankedDriver {
                        driver_id: profile.driver_id,
                        rank,
                    }),
                    Evaluation::Ineligible(reason) => {
                        debug!(
                            ride_id = %ride.ride_id,
                            driver_id = %profile.driver_id,
                            reason = reason.code(),
                            "Driver not eligible: {reason}"
                        );
                        None
                    }
                }
            })
            .sorted_by_key(|d| (d.rank, d.driver_id));
        Ok(match config.max_offers_per_round {
            Some(limit) => ranked.take(limit).collect(),
            None => ranked.collect(),
        })
    }

    fn withdraw(&self, offers: &[Offer]) {
        for offer in offers {
            self.events.notify(NotificationEvent::OfferWithdrawn {
                driver_id: offer.driver_id,
                offer_id: offer.offer_id,
                ride_id: offer.ride_id,
            });
        }
    }
}
