//! HTTP API.
//!
//! - rider endpoints: create, view and cancel rides, plus the status stream
//! - driver endpoints: presence, profile and offer answers
//! - `/admin`: operator views and manual re-dispatch
//!
//! Identity is taken from the path. Authentication sits in front of this
//! service.

use axum::{Router, http::StatusCode, response::IntoResponse};
use ridematch_core::matching::MatchError;

use crate::state::AppState;

mod admin;
mod driver;
mod rider;

/// Build the API router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(rider::router())
        .merge(driver::router())
        .nest("/admin", admin::router())
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

/// Errors that can occur in API handlers.
#[derive(Debug)]
enum ApiError {
    /// The matching engine refused or failed the operation.
    Match(MatchError),
    /// The request was well-formed JSON but not a valid command.
    BadRequest(String),
}

impl From<MatchError> for ApiError {
    fn from(value: MatchError) -> Self {
        ApiError::Match(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let e = match self {
            ApiError::BadRequest(reason) => {
                return (StatusCode::BAD_REQUEST, reason).into_response();
            }
            ApiError::Match(e) => e,
        };
        match e {
            MatchError::RideNotFound(_) => {
                (StatusCode::NOT_FOUND, "ride not found").into_response()
            }
            MatchError::OfferNotFound(_) => {
                (StatusCode::NOT_FOUND, "offer not found").into_response()
            }
            MatchError::OfferNoLongerAvailable => {
                (StatusCode::CONFLICT, "ride no longer available").into_response()
            }
            MatchError::OfferExpired => (StatusCode::CONFLICT, "offer expired").into_response(),
            MatchError::RideCancelled => (StatusCode::CONFLICT, "offer withdrawn").into_response(),
            MatchError::NotOfferRecipient => {
                (StatusCode::FORBIDDEN, "offer was made to another driver").into_response()
            }
            MatchError::DriverOffline => {
                (StatusCode::CONFLICT, "driver is not online").into_response()
            }
            MatchError::ScheduleConflict => {
                (StatusCode::CONFLICT, "schedule conflict").into_response()
            }
            MatchError::RideNotDispatchable(status) => (
                StatusCode::CONFLICT,
                format!("ride cannot be dispatched while {status}"),
            )
                .into_response(),
            MatchError::InvalidRide(reason) => (StatusCode::BAD_REQUEST, reason).into_response(),
            MatchError::Store(e) => {
                tracing::error!(error = %e, "API store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}
