use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use ridematch_sdk::objects::CancelRideResponse;
use uuid::Uuid;

use crate::api::ApiError;
use crate::state::AppState;

/// `POST /rides/{ride_id}/cancel`: Cancel a ride.
///
/// Withdraws every live offer and releases the driver of an assigned ride.
/// Cancelling twice answers `changed: false`.
pub(super) async fn cancel_ride(
    state: State<AppState>,
    Path(ride_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let cancelled = state.engine.cancel_ride(ride_id).await?;
    Ok(Json(CancelRideResponse {
        ride: cancelled.ride.to_response(None),
        changed: cancelled.changed,
        offers_withdrawn: u32::try_from(cancelled.withdrawn.len()).unwrap_or(u32::MAX),
    }))
}
