//! Driver API handlers.
//!
//! # Endpoints
//!
//! - `POST /drivers/{driver_id}/online`    – open a session
//! - `POST /drivers/{driver_id}/offline`   – close the open session
//! - `POST /drivers/{driver_id}/heartbeat` – keep the session alive
//! - `PUT  /drivers/{driver_id}/profile`   – vehicle, features and working hours
//! - `GET  /drivers/{driver_id}/offers`    – live offers
//! - `POST /drivers/{driver_id}/offers/{offer_id}/accept`
//! - `POST /drivers/{driver_id}/offers/{offer_id}/decline`

use axum::{
    Router,
    routing::{get, post, put},
};
use ridematch_core::matching::PresenceChange;
use ridematch_core::utils::to_unix;
use ridematch_sdk::objects::PresenceResponse;
use uuid::Uuid;

use crate::state::AppState;

mod offers;
mod presence;
mod profile;

/// Build the Driver API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/drivers/{driver_id}/online", post(presence::go_online))
        .route("/drivers/{driver_id}/offline", post(presence::go_offline))
        .route("/drivers/{driver_id}/heartbeat", post(presence::heartbeat))
        .route("/drivers/{driver_id}/profile", put(profile::put_profile))
        .route("/drivers/{driver_id}/offers", get(offers::list_offers))
        .route(
            "/drivers/{driver_id}/offers/{offer_id}/accept",
            post(offers::accept_offer),
        )
        .route(
            "/drivers/{driver_id}/offers/{offer_id}/decline",
            post(offers::decline_offer),
        )
}

fn presence_response(driver_id: Uuid, change: &PresenceChange) -> PresenceResponse {
    let session = change.open_session();
    PresenceResponse {
        driver_id,
        online: session.is_some(),
        changed: change.changed(),
        session_id: session.map(|s| s.session_id),
        started_at: session.map(|s| to_unix(s.started_at)),
    }
}
