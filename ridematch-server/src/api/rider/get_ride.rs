use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use crate::api::ApiError;
use crate::state::AppState;

/// `GET /rides/{ride_id}`: Current match status of a ride.
pub(super) async fn get_ride(
    state: State<AppState>,
    Path(ride_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let (ride, assignment) = state.engine.ride_view(ride_id).await?;
    Ok(Json(ride.to_response(assignment.map(|a| a.driver_id))))
}
