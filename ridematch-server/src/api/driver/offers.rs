use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use ridematch_sdk::objects::{
    AcceptOfferResponse, DeclineOfferRequest, DeclineOfferResponse, OfferResponse,
};
use uuid::Uuid;

use crate::api::ApiError;
use crate::state::AppState;

/// `GET /drivers/{driver_id}/offers`: Offers the driver can still answer.
pub(super) async fn list_offers(
    state: State<AppState>,
    Path(driver_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let offers = state.engine.live_offers_for_driver(driver_id).await?;
    let response: Vec<OfferResponse> = offers.into_iter().map(Into::into).collect();
    Ok(Json(response))
}

/// `POST /drivers/{driver_id}/offers/{offer_id}/accept`
///
/// Of several drivers accepting offers for the same ride, exactly one gets
/// the assignment; the rest get `409 ride no longer available`. Repeating a
/// winning accept returns the same assignment.
pub(super) async fn accept_offer(
    state: State<AppState>,
    Path((driver_id, offer_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let accepted = state.engine.accept_offer(offer_id, driver_id).await?;
    Ok(Json(AcceptOfferResponse {
        offer: accepted.offer.into(),
        assignment: accepted.assignment.into(),
    }))
}

/// `POST /drivers/{driver_id}/offers/{offer_id}/decline`
pub(super) async fn decline_offer(
    state: State<AppState>,
    Path((driver_id, offer_id)): Path<(Uuid, Uuid)>,
    body: Option<Json<DeclineOfferRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let reason = body.and_then(|Json(request)| request.reason);
    let declined = state
        .engine
        .decline_offer(offer_id, driver_id, reason)
        .await?;
    Ok(Json(DeclineOfferResponse {
        offer: declined.offer.into(),
        redispatched: declined.redispatched.is_some(),
    }))
}
