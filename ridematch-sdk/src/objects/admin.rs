//! Admin API request and response types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ride::RideStatus;

/// Query string for `GET /admin/rides`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRidesQuery {
    /// Defaults to `expired`, the rides waiting for manual handling.
    pub status: Option<RideStatus>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineDriversResponse {
    pub drivers: Vec<Uuid>,
}
