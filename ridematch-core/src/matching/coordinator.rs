use crate::collaborators::{CalendarBooking, CollaboratorError, SharedCalendar};
use crate::config::{ConfigStore, MatchingConfig};
use crate::entities::{Assignment, Offer, OfferState, RideStatus};
use crate::events::{EventSenders, NotificationEvent};
use crate::matching::MatchError;
use crate::store::{EnsureOutcome, SharedStore};
use crate::utils::SharedClock;
use crate::utils::backoff::is_retry_due;
use tracing::{error, info, warn};

/// Finishes an assignment once its offer has won: books the ride into the
/// driver's calendar and tells the rider.
///
/// Calendar failures never undo the assignment. The attempt is recorded and
/// [`retry_missing_calendar_entries`](Self::retry_missing_calendar_entries)
/// tries again with backoff.
#[derive(Clone)]
pub struct AssignmentCoordinator {
    store: SharedStore,
    clock: SharedClock,
    config: ConfigStore<MatchingConfig>,
    calendar: SharedCalendar,
    events: EventSenders,
}

impl AssignmentCoordinator {
    pub fn new(
        store: SharedStore,
        clock: SharedClock,
        config: ConfigStore<MatchingConfig>,
        calendar: SharedCalendar,
        events: EventSenders,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            calendar,
            events,
        }
    }

    /// Handle an accepted offer. Running it again for the same offer, even
    /// concurrently, returns the same assignment without a second calendar
    /// write or rider notification: only the caller that claims the first
    /// write goes on.
    pub async fn on_offer_accepted(&self, offer: &Offer) -> Result<Assignment, MatchError> {
        if offer.state != OfferState::Accepted {
            return Err(MatchError::OfferNoLongerAvailable);
        }
        let assignment = match self.store.ensure_assignment(offer, self.clock.now()).await? {
            EnsureOutcome::Existing(assignment) | EnsureOutcome::Created(assignment) => assignment,
            EnsureOutcome::RideNotAssigned(RideStatus::Cancelled) => {
                return Err(MatchError::RideCancelled);
            }
            EnsureOutcome::RideNotAssigned(_) => return Err(MatchError::OfferNoLongerAvailable),
        };
        let ride = self
            .store
            .ride(offer.ride_id)
            .await?
            .ok_or(MatchError::RideNotFound(offer.ride_id))?;
        if !self
            .store
            .claim_calendar_write(assignment.assignment_id, self.clock.now())
            .await?
        {
            return Ok(assignment);
        }
        let assignment = self.write_calendar_entry(assignment).await;
        self.events.notify(NotificationEvent::RideAssigned {
            ride_id: ride.ride_id,
            rider_id: ride.rider_id,
            driver_id: assignment.driver_id,
        });
        Ok(assignment)
    }

    /// Retry calendar writes that failed earlier and whose backoff is over.
    /// Returns how many were tried.
    pub async fn retry_missing_calendar_entries(&self) -> Result<usize, MatchError> {
        let config = self.config.snapshot().await;
        let now = self.clock.now();
        let pending = self
            .store
            .assignments_missing_calendar(config.calendar_max_attempts, config.sweep_batch_size)
            .await?;
        let mut tried = 0;
        for assignment in pending {
            let due = match assignment.calendar_attempts() {
                // First write claimed by an accept and still in flight.
                0 => assignment
                    .calendar_last_tried_at
                    .is_none_or(|claimed| now >= claimed + config.calendar_timeout),
                attempts => is_retry_due(attempts, assignment.calendar_last_tried_at, now),
            };
            if !due {
                continue;
            }
            self.write_calendar_entry(assignment).await;
            tried += 1;
        }
        Ok(tried)
    }

    async fn write_calendar_entry(&self, mut assignment: Assignment) -> Assignment {
        let config = self.config.snapshot().await;
        let booking = CalendarBooking::from(&assignment);
        let timeout = std::time::Duration::try_from(config.calendar_timeout)
            .unwrap_or(std::time::Duration::from_secs(10));
        let result =
            match tokio::time::timeout(timeout, self.calendar.add_booking_to_calendar(&booking))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(CollaboratorError::Unavailable(
                    "calendar call timed out".to_string(),
                )),
            };
        let attempt = assignment.calendar_attempts() + 1;
        let entry_id = match result {
            Ok(entry_id) => {
                info!(
                    assignment_id = %assignment.assignment_id,
                    ride_id = %assignment.ride_id,
                    %entry_id,
                    "Calendar entry created"
                );
                Some(entry_id)
            }
            Err(e) => {
                if attempt >= config.calendar_max_attempts {
                    error!(
                        assignment_id = %assignment.assignment_id,
                        attempt,
                        error = %e,
                        "Calendar entry failed, giving up"
                    );
                } else {
                    warn!(
                        assignment_id = %assignment.assignment_id,
                        attempt,
                        error = %e,
                        "Calendar entry failed, will retry"
                    );
                }
                None
            }
        };

        let now = self.clock.now();
        if let Err(e) = self
            .store
            .record_calendar_attempt(assignment.assignment_id, entry_id.clone(), now)
            .await
        {
            error!(
                assignment_id = %assignment.assignment_id,
                error = %e,
                "Failed to record calendar attempt"
            );
        }
        assignment.calendar_attempts += 1;
        assignment.calendar_last_tried_at = Some(now);
        if assignment.calendar_entry_id.is_none() {
            assignment.calendar_entry_id = entry_id;
        }
        assignment
    }
}
