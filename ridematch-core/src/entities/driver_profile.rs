use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use ridematch_sdk::objects::{
    AccessibilityFeature, DriverProfileResponse, ParseEnumError, VehicleClass, WorkingSlot,
};
use sqlx::types::Json;
use std::collections::BTreeSet;
use time::PrimitiveDateTime;
use uuid::Uuid;

/// Capabilities of a driver and their vehicle, as registered by the
/// onboarding subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverProfile {
    pub driver_id: Uuid,
    pub vehicle: VehicleClass,
    pub features: BTreeSet<AccessibilityFeature>,
    pub working_hours: Vec<WorkingSlot>,
    pub updated_at: PrimitiveDateTime,
}

impl From<DriverProfile> for DriverProfileResponse {
    fn from(value: DriverProfile) -> Self {
        Self {
            driver_id: value.driver_id,
            vehicle: value.vehicle,
            features: value.features.into_iter().collect(),
            working_hours: value.working_hours,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct DriverProfileRow {
    driver_id: Uuid,
    vehicle: String,
    features: Vec<String>,
    working_hours: Json<Vec<WorkingSlot>>,
    updated_at: PrimitiveDateTime,
}

impl TryFrom<DriverProfileRow> for DriverProfile {
    type Error = ParseEnumError;

    fn try_from(row: DriverProfileRow) -> Result<Self, Self::Error> {
        Ok(Self {
            driver_id: row.driver_id,
            vehicle: row.vehicle.parse()?,
            features: row
                .features
                .iter()
                .map(|f| f.parse())
                .collect::<Result<_, _>>()?,
            working_hours: row.working_hours.0,
            updated_at: row.updated_at,
        })
    }
}

fn decode_rows(rows: Vec<DriverProfileRow>) -> Result<Vec<DriverProfile>, sqlx::Error> {
    rows.into_iter()
        .map(|row| DriverProfile::try_from(row).map_err(|e| sqlx::Error::Decode(Box::new(e))))
        .collect()
}

#[derive(Debug, Clone)]
pub struct UpsertDriverProfile {
    pub profile: DriverProfile,
}

impl Processor<UpsertDriverProfile> for DatabaseProcessor {
    type Output = DriverProfile;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertDriverProfile")]
    async fn process(&self, upsert: UpsertDriverProfile) -> Result<DriverProfile, sqlx::Error> {
        let profile = upsert.profile;
        let features: Vec<String> = profile
            .features
            .iter()
            .map(|f| f.as_str().to_owned())
            .collect();
        sqlx::query(
            r#"
            INSERT INTO driver_profiles (driver_id, vehicle, features, working_hours, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (driver_id) DO UPDATE
            SET vehicle = EXCLUDED.vehicle,
                features = EXCLUDED.features,
                working_hours = EXCLUDED.working_hours,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(profile.driver_id)
        .bind(profile.vehicle.as_str())
        .bind(features)
        .bind(Json(profile.working_hours.clone()))
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(profile)
    }
}

#[derive(Debug, Clone)]
/// Profiles of the given drivers. Drivers without a profile are left out.
pub struct GetDriverProfiles {
    pub driver_ids: Vec<Uuid>,
}

impl Processor<GetDriverProfiles> for DatabaseProcessor {
    type Output = Vec<DriverProfile>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetDriverProfiles")]
    async fn process(&self, query: GetDriverProfiles) -> Result<Vec<DriverProfile>, sqlx::Error> {
        if query.driver_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, DriverProfileRow>(
            r#"
            SELECT driver_id, vehicle, features, working_hours, updated_at
            FROM driver_profiles
            WHERE driver_id = ANY($1)
            ORDER BY driver_id
            "#,
        )
        .bind(&query.driver_ids)
        .fetch_all(&self.pool)
        .await?;
        decode_rows(rows)
    }
}
