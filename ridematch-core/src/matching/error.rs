use crate::entities::RideStatus;
use crate::matching::rules::Rejection;
use crate::store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the matching engine's operations.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("ride not found: {0}")]
    RideNotFound(Uuid),

    #[error("offer not found: {0}")]
    OfferNotFound(Uuid),

    /// A losing driver's accept, or an answer to an offer that is already
    /// resolved.
    #[error("ride no longer available")]
    OfferNoLongerAvailable,

    #[error("offer expired")]
    OfferExpired,

    /// Surfaced to drivers as "offer withdrawn".
    #[error("ride cancelled")]
    RideCancelled,

    #[error("offer was made to another driver")]
    NotOfferRecipient,

    #[error("driver is not online")]
    DriverOffline,

    /// The driver won another ride overlapping this one.
    #[error("driver already has an overlapping assignment")]
    ScheduleConflict,

    #[error("ride cannot be dispatched in status {0}")]
    RideNotDispatchable(RideStatus),

    #[error("invalid ride request: {0}")]
    InvalidRide(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<Rejection> for MatchError {
    fn from(value: Rejection) -> Self {
        match value {
            Rejection::NoLongerAvailable => MatchError::OfferNoLongerAvailable,
            Rejection::Expired => MatchError::OfferExpired,
            Rejection::RideCancelled => MatchError::RideCancelled,
            Rejection::NotRecipient => MatchError::NotOfferRecipient,
            Rejection::DriverOffline => MatchError::DriverOffline,
            Rejection::ScheduleConflict => MatchError::ScheduleConflict,
        }
    }
}
