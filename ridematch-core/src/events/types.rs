//! Event type definitions.

use crate::entities::RideStatus;
use time::PrimitiveDateTime;
use uuid::Uuid;

/// Something a driver or rider should hear about.
///
/// Emitted after the state change it describes has been committed; the
/// [`NotificationSender`](crate::processors::NotificationSender) delivers
/// it and only logs failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    OfferCreated {
        driver_id: Uuid,
        offer_id: Uuid,
        ride_id: Uuid,
        expires_at: PrimitiveDateTime,
    },
    RideAssigned {
        ride_id: Uuid,
        rider_id: Uuid,
        driver_id: Uuid,
    },
    /// The ride hit its outer deadline without a driver.
    RideUnmatched { ride_id: Uuid, rider_id: Uuid },
    /// A pending offer, or an assignment, was taken back from the driver.
    OfferWithdrawn {
        driver_id: Uuid,
        offer_id: Uuid,
        ride_id: Uuid,
    },
}

/// A ride changed match status. Broadcast to rider status streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RideStatusUpdate {
    pub ride_id: Uuid,
    pub status: RideStatus,
}
