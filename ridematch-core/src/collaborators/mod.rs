//! Narrow interfaces to the services the engine talks to but does not own.
//!
//! Calls happen after the state change they belong to has committed. A
//! failure is logged (and, for the calendar, retried later) but never
//! rolls anything back.

mod http;
mod logging;

pub use http::HttpCollaborator;
pub use logging::LoggingCollaborator;

use crate::entities::Assignment;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use time::PrimitiveDateTime;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("collaborator rejected the call with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

/// What the calendar needs to book a ride into a driver's schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarBooking {
    pub driver_id: Uuid,
    pub ride_id: Uuid,
    pub assignment_id: Uuid,
    pub window_start: PrimitiveDateTime,
    pub window_end: PrimitiveDateTime,
}

impl From<&Assignment> for CalendarBooking {
    fn from(value: &Assignment) -> Self {
        Self {
            driver_id: value.driver_id,
            ride_id: value.ride_id,
            assignment_id: value.assignment_id,
            window_start: value.window_start,
            window_end: value.window_end,
        }
    }
}

#[async_trait]
pub trait CalendarCollaborator: Send + Sync {
    /// Book the ride and return the calendar's entry id.
    async fn add_booking_to_calendar(
        &self,
        booking: &CalendarBooking,
    ) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait NotificationCollaborator: Send + Sync {
    async fn notify_driver_of_offer(
        &self,
        driver_id: Uuid,
        offer_id: Uuid,
        ride_id: Uuid,
        expires_at: PrimitiveDateTime,
    ) -> Result<(), CollaboratorError>;

    async fn notify_rider_of_assignment(
        &self,
        ride_id: Uuid,
        rider_id: Uuid,
        driver_id: Uuid,
    ) -> Result<(), CollaboratorError>;

    async fn notify_rider_unmatched(
        &self,
        ride_id: Uuid,
        rider_id: Uuid,
    ) -> Result<(), CollaboratorError>;

    async fn notify_driver_offer_withdrawn(
        &self,
        driver_id: Uuid,
        offer_id: Uuid,
        ride_id: Uuid,
    ) -> Result<(), CollaboratorError>;
}

pub type SharedCalendar = Arc<dyn CalendarCollaborator>;
pub type SharedNotifier = Arc<dyn NotificationCollaborator>;
