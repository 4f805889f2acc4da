//! Driver-facing presence and capability types.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Error returned when a textual enum value stored outside serde
/// (e.g. a `TEXT[]` column) is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Accessibility equipment or training a vehicle/driver can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessibilityFeature {
    WheelchairRamp,
    WheelchairLift,
    ServiceAnimal,
    AssistanceTrained,
}

impl AccessibilityFeature {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessibilityFeature::WheelchairRamp => "wheelchair_ramp",
            AccessibilityFeature::WheelchairLift => "wheelchair_lift",
            AccessibilityFeature::ServiceAnimal => "service_animal",
            AccessibilityFeature::AssistanceTrained => "assistance_trained",
        }
    }
}

impl FromStr for AccessibilityFeature {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wheelchair_ramp" => Ok(AccessibilityFeature::WheelchairRamp),
            "wheelchair_lift" => Ok(AccessibilityFeature::WheelchairLift),
            "service_animal" => Ok(AccessibilityFeature::ServiceAnimal),
            "assistance_trained" => Ok(AccessibilityFeature::AssistanceTrained),
            other => Err(ParseEnumError {
                kind: "accessibility feature",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for AccessibilityFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vehicle class registered for a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleClass {
    Standard,
    AccessibleVan,
    Minivan,
}

impl VehicleClass {
    pub fn as_str(self) -> &'static str {
        match self {
            VehicleClass::Standard => "standard",
            VehicleClass::AccessibleVan => "accessible_van",
            VehicleClass::Minivan => "minivan",
        }
    }
}

impl FromStr for VehicleClass {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(VehicleClass::Standard),
            "accessible_van" => Ok(VehicleClass::AccessibleVan),
            "minivan" => Ok(VehicleClass::Minivan),
            other => Err(ParseEnumError {
                kind: "vehicle class",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Day of the week for working-hour declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

/// A weekly slot during which the driver accepts rides.
///
/// Minutes are counted from midnight UTC; `end_minute` is exclusive and
/// may be `1440` to mean "until midnight".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkingSlot {
    pub day: DayOfWeek,
    pub start_minute: u16,
    pub end_minute: u16,
}

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Request body for `POST /drivers/{driver_id}/online`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoOnlineRequest {
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

/// Request body for `POST /drivers/{driver_id}/heartbeat`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

/// Presence state returned by the online/offline/heartbeat endpoints.
///
/// `changed` is `false` for the idempotent no-op cases (going online twice,
/// going offline while offline).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceResponse {
    pub driver_id: Uuid,
    pub online: bool,
    pub changed: bool,
    pub session_id: Option<i64>,
    pub started_at: Option<i64>,
}

/// Request body for `PUT /drivers/{driver_id}/profile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverProfileRequest {
    pub vehicle: VehicleClass,
    #[serde(default)]
    pub features: Vec<AccessibilityFeature>,
    #[serde(default)]
    pub working_hours: Vec<WorkingSlot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverProfileResponse {
    pub driver_id: Uuid,
    pub vehicle: VehicleClass,
    pub features: Vec<AccessibilityFeature>,
    pub working_hours: Vec<WorkingSlot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_text_matches_serde() {
        for feature in [
            AccessibilityFeature::WheelchairRamp,
            AccessibilityFeature::WheelchairLift,
            AccessibilityFeature::ServiceAnimal,
            AccessibilityFeature::AssistanceTrained,
        ] {
            let json = serde_json::to_string(&feature).unwrap();
            assert_eq!(json, format!("\"{}\"", feature.as_str()));
            assert_eq!(feature.as_str().parse::<AccessibilityFeature>(), Ok(feature));
        }
    }

    #[test]
    fn test_unknown_vehicle_class() {
        let err = "hovercraft".parse::<VehicleClass>().unwrap_err();
        assert_eq!(err.kind, "vehicle class");
        assert_eq!(err.value, "hovercraft");
    }
}
