use axum::{Json, extract::State, response::IntoResponse};
use ridematch_sdk::objects::admin::OnlineDriversResponse;

use crate::api::ApiError;
use crate::state::AppState;

/// `GET /admin/drivers/online`
pub(super) async fn online_drivers(state: State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let drivers = state.engine.registry().snapshot_online_drivers().await?;
    Ok(Json(OnlineDriversResponse {
        drivers: drivers.into_iter().collect(),
    }))
}
