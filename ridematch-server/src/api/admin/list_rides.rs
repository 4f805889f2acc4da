use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use ridematch_core::entities::RideStatus;
use ridematch_sdk::objects::RideResponse;
use ridematch_sdk::objects::admin::ListRidesQuery;

use crate::api::ApiError;
use crate::state::AppState;

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 200;

/// `GET /admin/rides`: Rides in one status, oldest first.
///
/// Without a `status` filter this lists expired rides, the ones waiting for
/// manual handling.
pub(super) async fn list_rides(
    state: State<AppState>,
    Query(query): Query<ListRidesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status: RideStatus = query
        .status
        .map(Into::into)
        .unwrap_or(RideStatus::Expired);
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT) as usize;

    let rides = state.engine.rides_by_status(status, limit).await?;

    let mut response: Vec<RideResponse> = Vec::with_capacity(rides.len());
    for ride in rides {
        let assigned_driver = if status == RideStatus::Assigned {
            state
                .engine
                .ride_view(ride.ride_id)
                .await?
                .1
                .map(|a| a.driver_id)
        } else {
            None
        };
        response.push(ride.to_response(assigned_driver));
    }
    Ok(Json(response))
}
