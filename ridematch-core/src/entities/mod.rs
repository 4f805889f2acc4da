pub mod assignment;
pub mod driver_profile;
pub mod driver_session;
pub mod offer;
pub mod ride_request;

pub use assignment::Assignment;
pub use driver_profile::DriverProfile;
pub use driver_session::DriverSession;
pub use offer::Offer;
pub use ride_request::RideRequest;

use ridematch_sdk::objects::{
    OfferState as SdkOfferState, RideKind as SdkRideKind, RideStatus as SdkRideStatus,
};

/// Match status of a ride.
///
/// This is the sqlx::Type version. For API/DTO use, see `ridematch_sdk::objects::RideStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "ride_status")]
pub enum RideStatus {
    Unmatched,
    Offering,
    Assigned,
    Expired,
    Cancelled,
}

impl RideStatus {
    /// Whether a dispatch round may run on a ride in this status.
    pub fn is_dispatchable(self) -> bool {
        matches!(self, RideStatus::Unmatched | RideStatus::Offering)
    }
}

impl std::fmt::Display for RideStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        SdkRideStatus::from(*self).fmt(f)
    }
}

impl From<RideStatus> for SdkRideStatus {
    fn from(value: RideStatus) -> Self {
        match value {
            RideStatus::Unmatched => SdkRideStatus::Unmatched,
            RideStatus::Offering => SdkRideStatus::Offering,
            RideStatus::Assigned => SdkRideStatus::Assigned,
            RideStatus::Expired => SdkRideStatus::Expired,
            RideStatus::Cancelled => SdkRideStatus::Cancelled,
        }
    }
}

impl From<SdkRideStatus> for RideStatus {
    fn from(value: SdkRideStatus) -> Self {
        match value {
            SdkRideStatus::Unmatched => RideStatus::Unmatched,
            SdkRideStatus::Offering => RideStatus::Offering,
            SdkRideStatus::Assigned => RideStatus::Assigned,
            SdkRideStatus::Expired => RideStatus::Expired,
            SdkRideStatus::Cancelled => RideStatus::Cancelled,
        }
    }
}

/// Offer lifecycle state. Everything but `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "offer_state")]
pub enum OfferState {
    Pending,
    Accepted,
    Declined,
    Expired,
    Superseded,
}

impl std::fmt::Display for OfferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        SdkOfferState::from(*self).fmt(f)
    }
}

impl From<OfferState> for SdkOfferState {
    fn from(value: OfferState) -> Self {
        match value {
            OfferState::Pending => SdkOfferState::Pending,
            OfferState::Accepted => SdkOfferState::Accepted,
            OfferState::Declined => SdkOfferState::Declined,
            OfferState::Expired => SdkOfferState::Expired,
            OfferState::Superseded => SdkOfferState::Superseded,
        }
    }
}

impl From<SdkOfferState> for OfferState {
    fn from(value: SdkOfferState) -> Self {
        match value {
            SdkOfferState::Pending => OfferState::Pending,
            SdkOfferState::Accepted => OfferState::Accepted,
            SdkOfferState::Declined => OfferState::Declined,
            SdkOfferState::Expired => OfferState::Expired,
            SdkOfferState::Superseded => OfferState::Superseded,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "ride_kind")]
pub enum RideKind {
    Immediate,
    PreBooked,
}

impl From<RideKind> for SdkRideKind {
    fn from(value: RideKind) -> Self {
        match value {
            RideKind::Immediate => SdkRideKind::Immediate,
            RideKind::PreBooked => SdkRideKind::PreBooked,
        }
    }
}

impl From<SdkRideKind> for RideKind {
    fn from(value: SdkRideKind) -> Self {
        match value {
            SdkRideKind::Immediate => RideKind::Immediate,
            SdkRideKind::PreBooked => RideKind::PreBooked,
        }
    }
}

/// Why a driver session was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "session_end_reason")]
pub enum SessionEndReason {
    Offline,
    HeartbeatTimeout,
}

/// Clamp a non-negative counter column into the unsigned wire type.
pub(crate) fn counter(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}
