//! Rider API handlers.
//!
//! # Endpoints
//!
//! - `POST /rides`                  – submit a ride request and run the first dispatch round
//! - `GET  /rides/{ride_id}`        – current match status
//! - `POST /rides/{ride_id}/cancel` – cancel the ride
//! - `GET  /rides/{ride_id}/ws`     – WebSocket ride status stream

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

mod cancel_ride;
mod create_ride;
mod get_ride;
mod ws;

/// Build the Rider API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rides", post(create_ride::create_ride))
        .route("/rides/{ride_id}", get(get_ride::get_ride))
        .route("/rides/{ride_id}/cancel", post(cancel_ride::cancel_ride))
        .route("/rides/{ride_id}/ws", get(ws::ride_status_ws))
}
