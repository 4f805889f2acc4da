use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use ridematch_core::matching::NewRide;
use ridematch_core::utils::from_unix;
use ridematch_sdk::objects::{CreateRideRequest, CreateRideResponse, DispatchSummary};

use crate::api::ApiError;
use crate::state::AppState;

/// `POST /rides`: Submit a ride request.
///
/// The first dispatch round runs before the response is sent, so the
/// response already says how many drivers were offered the ride.
pub(super) async fn create_ride(
    state: State<AppState>,
    Json(request): Json<CreateRideRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let window_start = request
        .window_start
        .map(|secs| {
            from_unix(secs)
                .ok_or_else(|| ApiError::BadRequest("window_start is out of range".to_string()))
        })
        .transpose()?;

    let new_ride = NewRide {
        rider_id: request.rider_id,
        pickup: request.pickup,
        dropoff: request.dropoff,
        kind: request.kind.into(),
        window_start,
        duration: time::Duration::minutes(i64::from(request.duration_minutes)),
        accessibility: request.accessibility.into_iter().collect(),
        required_vehicle: request.required_vehicle,
    };

    let created = state.engine.create_ride(new_ride).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateRideResponse {
            ride: created.ride.to_response(None),
            dispatch: DispatchSummary::from(&created.dispatch),
        }),
    ))
}
