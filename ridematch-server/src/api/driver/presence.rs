use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use ridematch_sdk::objects::{GoOnlineRequest, HeartbeatRequest};
use uuid::Uuid;

use super::presence_response;
use crate::api::ApiError;
use crate::state::AppState;

/// `POST /drivers/{driver_id}/online`: Going online twice answers
/// `changed: false` with the existing session.
pub(super) async fn go_online(
    state: State<AppState>,
    Path(driver_id): Path<Uuid>,
    body: Option<Json<GoOnlineRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let location = body.and_then(|Json(request)| request.location);
    let change = state.engine.registry().online(driver_id, location).await?;
    Ok(Json(presence_response(driver_id, &change)))
}

/// `POST /drivers/{driver_id}/offline`
pub(super) async fn go_offline(
    state: State<AppState>,
    Path(driver_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let change = state.engine.registry().offline(driver_id).await?;
    Ok(Json(presence_response(driver_id, &change)))
}

/// `POST /drivers/{driver_id}/heartbeat`: A heartbeat without an open
/// session answers `online: false`; the driver has to go online again.
pub(super) async fn heartbeat(
    state: State<AppState>,
    Path(driver_id): Path<Uuid>,
    body: Option<Json<HeartbeatRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let location = body.and_then(|Json(request)| request.location);
    let change = state.engine.registry().heartbeat(driver_id, location).await?;
    Ok(Json(presence_response(driver_id, &change)))
}
