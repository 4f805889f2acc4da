use super::{CalendarBooking, CalendarCollaborator, CollaboratorError, NotificationCollaborator};
use async_trait::async_trait;
use time::PrimitiveDateTime;
use tracing::info;
use uuid::Uuid;

/// Collaborator that only writes what it would have sent to the log.
///
/// Calendar bookings get a local entry id derived from the assignment, so
/// they are not retried.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingCollaborator;

#[async_trait]
impl CalendarCollaborator for LoggingCollaborator {
    async fn add_booking_to_calendar(
        &self,
        booking: &CalendarBooking,
    ) -> Result<String, CollaboratorError> {
        info!(
            driver_id = %booking.driver_id,
            ride_id = %booking.ride_id,
            window_start = %booking.window_start,
            window_end = %booking.window_end,
            "Calendar booking (not sent, no calendar configured)"
        );
        Ok(format!("local-{}", booking.assignment_id))
    }
}

#[async_trait]
impl NotificationCollaborator for LoggingCollaborator {
    async fn notify_driver_of_offer(
        &self,
        driver_id: Uuid,
        offer_id: Uuid,
        ride_id: Uuid,
        expires_at: PrimitiveDateTime,
    ) -> Result<(), CollaboratorError> {
        info!(%driver_id, %offer_id, %ride_id, %expires_at, "Notify driver of offer");
        Ok(())
    }

    async fn notify_rider_of_assignment(
        &self,
        ride_id: Uuid,
        rider_id: Uuid,
        driver_id: Uuid,
    ) -> Result<(), CollaboratorError> {
        info!(%ride_id, %rider_id, %driver_id, "Notify rider of assignment");
        Ok(())
    }

    async fn notify_rider_unmatched(
        &self,
        ride_id: Uuid,
        rider_id: Uuid,
    ) -> Result<(), CollaboratorError> {
        info!(%ride_id, %rider_id, "Notify rider that no driver was found");
        Ok(())
    }

    async fn notify_driver_offer_withdrawn(
        &self,
        driver_id: Uuid,
        offer_id: Uuid,
        ride_id: Uuid,
    ) -> Result<(), CollaboratorError> {
        info!(%driver_id, %offer_id, %ride_id, "Notify driver of withdrawn offer");
        Ok(())
    }
}
