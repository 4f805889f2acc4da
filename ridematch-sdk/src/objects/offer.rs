//! Offer and assignment types returned to drivers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Offer lifecycle state for API responses.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `ridematch-core::entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferState {
    Pending,
    Accepted,
    Declined,
    Expired,
    Superseded,
}

impl std::fmt::Display for OfferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OfferState::Pending => write!(f, "pending"),
            OfferState::Accepted => write!(f, "accepted"),
            OfferState::Declined => write!(f, "declined"),
            OfferState::Expired => write!(f, "expired"),
            OfferState::Superseded => write!(f, "superseded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferResponse {
    pub offer_id: Uuid,
    pub ride_id: Uuid,
    pub driver_id: Uuid,
    pub state: OfferState,
    pub round: u32,
    pub rank: u32,
    pub created_at: i64,
    pub expires_at: i64,
    pub responded_at: Option<i64>,
}

/// Request body for `POST /drivers/{driver_id}/offers/{offer_id}/decline`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclineOfferRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclineOfferResponse {
    pub offer: OfferResponse,
    /// `true` when the decline left the ride without live offers and a new
    /// dispatch round was started.
    pub redispatched: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentResponse {
    pub assignment_id: Uuid,
    pub ride_id: Uuid,
    pub driver_id: Uuid,
    pub offer_id: Uuid,
    pub window_start: i64,
    pub window_end: i64,
    pub assigned_at: i64,
    pub calendar_entry_id: Option<String>,
}

/// Response body for a successful accept.
///
/// Repeating the accept for the same offer returns the same assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptOfferResponse {
    pub offer: OfferResponse,
    pub assignment: AssignmentResponse,
}
