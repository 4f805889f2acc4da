//! Admin API handlers.
//!
//! # Endpoints
//!
//! - `GET  /rides?status=…&limit=…`    – list rides by status (default `expired`)
//! - `POST /rides/{ride_id}/dispatch` – run a dispatch round now, reopening an expired ride
//! - `GET  /drivers/online`           – currently online drivers

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

mod dispatch_ride;
mod list_rides;
mod online_drivers;

/// Build the Admin API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rides", get(list_rides::list_rides))
        .route(
            "/rides/{ride_id}/dispatch",
            post(dispatch_ride::dispatch_ride),
        )
        .route("/drivers/online", get(online_drivers::online_drivers))
}
