use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use ridematch_core::entities::DriverProfile;
use ridematch_core::utils::Clock;
use ridematch_sdk::objects::{DriverProfileRequest, DriverProfileResponse, WorkingSlot};
use uuid::Uuid;

use crate::api::ApiError;
use crate::state::AppState;

const MINUTES_PER_DAY: u16 = 24 * 60;

/// `PUT /drivers/{driver_id}/profile`: Replace the driver's profile.
pub(super) async fn put_profile(
    state: State<AppState>,
    Path(driver_id): Path<Uuid>,
    Json(request): Json<DriverProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(slot) = request.working_hours.iter().find(|s| !is_valid_slot(s)) {
        return Err(ApiError::BadRequest(format!(
            "invalid working slot on {:?}: {}..{}",
            slot.day, slot.start_minute, slot.end_minute
        )));
    }

    let profile = DriverProfile {
        driver_id,
        vehicle: request.vehicle,
        features: request.features.into_iter().collect(),
        working_hours: request.working_hours,
        updated_at: state.engine.clock().now(),
    };
    let stored = state.engine.upsert_profile(profile).await?;
    Ok(Json(DriverProfileResponse::from(stored)))
}

fn is_valid_slot(slot: &WorkingSlot) -> bool {
    slot.start_minute < slot.end_minute && slot.end_minute <= MINUTES_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridematch_sdk::objects::DayOfWeek;

    #[test]
    fn test_slot_bounds() {
        let slot = |start_minute, end_minute| WorkingSlot {
            day: DayOfWeek::Monday,
            start_minute,
            end_minute,
        };
        assert!(is_valid_slot(&slot(0, 1440)));
        assert!(is_valid_slot(&slot(480, 1020)));
        assert!(!is_valid_slot(&slot(600, 600)));
        assert!(!is_valid_slot(&slot(900, 600)));
        assert!(!is_valid_slot(&slot(0, 1441)));
    }
}
