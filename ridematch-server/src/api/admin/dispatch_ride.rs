use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use ridematch_sdk::objects::DispatchSummary;
use uuid::Uuid;

use crate::api::ApiError;
use crate::state::AppState;

/// `POST /admin/rides/{ride_id}/dispatch`: Run a dispatch round now.
///
/// An expired ride gets a fresh deadline first. Assigned and cancelled
/// rides answer `409`.
pub(super) async fn dispatch_ride(
    state: State<AppState>,
    Path(ride_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.engine.manual_dispatch(ride_id).await?;
    Ok(Json(DispatchSummary::from(&outcome)))
}
