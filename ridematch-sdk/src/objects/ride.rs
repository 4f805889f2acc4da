//! Rider-facing ride types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::driver::{AccessibilityFeature, VehicleClass};

/// Whether a ride should be fulfilled now or at a scheduled time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideKind {
    Immediate,
    PreBooked,
}

/// Match status of a ride for API responses.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `ridematch-core::entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    Unmatched,
    Offering,
    Assigned,
    Expired,
    Cancelled,
}

impl RideStatus {
    /// Matching is over for a ride in this status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RideStatus::Assigned | RideStatus::Expired | RideStatus::Cancelled
        )
    }
}

impl std::fmt::Display for RideStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RideStatus::Unmatched => write!(f, "unmatched"),
            RideStatus::Offering => write!(f, "offering"),
            RideStatus::Assigned => write!(f, "assigned"),
            RideStatus::Expired => write!(f, "expired"),
            RideStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Request body for `POST /rides`.
///
/// `window_start` is a unix timestamp. It is ignored for immediate rides,
/// which start "now"; pre-booked rides must carry it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRideRequest {
    pub rider_id: Uuid,
    pub pickup: String,
    pub dropoff: String,
    pub kind: RideKind,
    #[serde(default)]
    pub window_start: Option<i64>,
    pub duration_minutes: u32,
    #[serde(default)]
    pub accessibility: Vec<AccessibilityFeature>,
    #[serde(default)]
    pub required_vehicle: Option<VehicleClass>,
}

/// A ride as seen by riders and admins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideResponse {
    pub ride_id: Uuid,
    pub rider_id: Uuid,
    pub pickup: String,
    pub dropoff: String,
    pub kind: RideKind,
    pub status: RideStatus,
    pub window_start: i64,
    pub window_end: i64,
    pub accessibility: Vec<AccessibilityFeature>,
    pub required_vehicle: Option<VehicleClass>,
    pub match_deadline: i64,
    pub dispatch_rounds: u32,
    pub created_at: i64,
    pub assigned_driver: Option<Uuid>,
}

/// What the first dispatch round did for a freshly created ride.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DispatchSummary {
    /// Offers are out; the rider sees "searching for driver".
    Offered { offers_created: u32, offers_live: u32 },
    /// Nobody can take the ride right now; the scheduler keeps retrying.
    NoEligibleDrivers,
    /// The ride was not in a dispatchable state.
    Skipped { status: RideStatus },
}

/// Response body for `POST /rides`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRideResponse {
    pub ride: RideResponse,
    pub dispatch: DispatchSummary,
}

/// Response body for `POST /rides/{ride_id}/cancel`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelRideResponse {
    pub ride: RideResponse,
    /// `false` when the ride had already been cancelled.
    pub changed: bool,
    pub offers_withdrawn: u32,
}
