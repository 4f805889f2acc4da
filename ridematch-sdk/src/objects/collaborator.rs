//! Payloads exchanged with the external calendar and notification services.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body posted to the calendar service when a ride is assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEntryRequest {
    pub driver_id: Uuid,
    pub ride_id: Uuid,
    pub assignment_id: Uuid,
    pub window_start: i64,
    pub window_end: i64,
}

/// Expected response from the calendar service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEntryResponse {
    pub entry_id: String,
}

/// Notification events delivered to the notification service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum NotificationPayload {
    OfferCreated {
        driver_id: Uuid,
        offer_id: Uuid,
        ride_id: Uuid,
        expires_at: i64,
    },
    RideAssigned {
        ride_id: Uuid,
        rider_id: Uuid,
        driver_id: Uuid,
    },
    RideUnmatched {
        ride_id: Uuid,
        rider_id: Uuid,
    },
    OfferWithdrawn {
        driver_id: Uuid,
        offer_id: Uuid,
        ride_id: Uuid,
    },
}

/// A notification payload stamped with its send time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    pub timestamp: i64,
    #[serde(flatten)]
    pub payload: NotificationPayload,
}
