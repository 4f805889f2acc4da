use crate::entities::{RideKind, RideStatus, counter};
use crate::framework::DatabaseProcessor;
use crate::utils::to_unix;
use kanau::processor::Processor;
use ridematch_sdk::objects::{AccessibilityFeature, ParseEnumError, RideResponse, VehicleClass};
use std::collections::BTreeSet;
use time::PrimitiveDateTime;
use uuid::Uuid;

/// A trip a rider wants fulfilled.
///
/// The booking side owns everything but `status` and the dispatch
/// bookkeeping columns, which only the matching engine writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RideRequest {
    pub ride_id: Uuid,
    pub rider_id: Uuid,
    pub pickup: String,
    pub dropoff: String,
    pub kind: RideKind,
    pub window_start: PrimitiveDateTime,
    pub window_end: PrimitiveDateTime,
    pub accessibility: BTreeSet<AccessibilityFeature>,
    pub required_vehicle: Option<VehicleClass>,
    pub status: RideStatus,
    pub match_deadline: PrimitiveDateTime,
    pub dispatch_rounds: i32,
    pub first_dispatched_at: Option<PrimitiveDateTime>,
    pub created_at: PrimitiveDateTime,
    pub updated_at: PrimitiveDateTime,
}

impl RideRequest {
    pub fn to_response(&self, assigned_driver: Option<Uuid>) -> RideResponse {
        RideResponse {
            ride_id: self.ride_id,
            rider_id: self.rider_id,
            pickup: self.pickup.clone(),
            dropoff: self.dropoff.clone(),
            kind: self.kind.into(),
            status: self.status.into(),
            window_start: to_unix(self.window_start),
            window_end: to_unix(self.window_end),
            accessibility: self.accessibility.iter().copied().collect(),
            required_vehicle: self.required_vehicle,
            match_deadline: to_unix(self.match_deadline),
            dispatch_rounds: counter(self.dispatch_rounds),
            created_at: to_unix(self.created_at),
            assigned_driver,
        }
    }

    /// Immediate, or pre-booked to start by `horizon`.
    pub fn is_urgent(&self, horizon: PrimitiveDateTime) -> bool {
        self.kind == RideKind::Immediate || self.window_start <= horizon
    }

    /// Lock the ride row for the rest of the transaction.
    ///
    /// Every atomic unit that changes a ride or its offers starts here, which
    /// serializes competing units on the same ride.
    pub async fn lock_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        ride_id: Uuid,
    ) -> Result<Option<RideRequest>, sqlx::Error> {
        let sql = format!("SELECT {RIDE_COLUMNS} FROM ride_requests WHERE ride_id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, RideRequestRow>(&sql)
            .bind(ride_id)
            .fetch_optional(&mut **tx)
            .await?;
        row.map(decode_row).transpose()
    }

    pub async fn update_status_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        ride_id: Uuid,
        status: RideStatus,
        now: PrimitiveDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE ride_requests SET status = $2, updated_at = $3 WHERE ride_id = $1")
            .bind(ride_id)
            .bind(status)
            .bind(now)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Record a finished dispatch round.
    pub async fn record_round_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        ride_id: Uuid,
        status: RideStatus,
        now: PrimitiveDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE ride_requests
            SET status = $2,
                dispatch_rounds = dispatch_rounds + 1,
                first_dispatched_at = COALESCE(first_dispatched_at, $3),
                updated_at = $3
            WHERE ride_id = $1
            "#,
        )
        .bind(ride_id)
        .bind(status)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn reopen_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        ride_id: Uuid,
        match_deadline: PrimitiveDateTime,
        now: PrimitiveDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE ride_requests
            SET status = 'unmatched', match_deadline = $2, updated_at = $3
            WHERE ride_id = $1
            "#,
        )
        .bind(ride_id)
        .bind(match_deadline)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

const RIDE_COLUMNS: &str = "ride_id, rider_id, pickup, dropoff, kind, window_start, window_end, \
    accessibility, required_vehicle, status, match_deadline, dispatch_rounds, \
    first_dispatched_at, created_at, updated_at";

#[derive(Debug, Clone, sqlx::FromRow)]
struct RideRequestRow {
    ride_id: Uuid,
    rider_id: Uuid,
    pickup: String,
    dropoff: String,
    kind: RideKind,
    window_start: PrimitiveDateTime,
    window_end: PrimitiveDateTime,
    accessibility: Vec<String>,
    required_vehicle: Option<String>,
    status: RideStatus,
    match_deadline: PrimitiveDateTime,
    dispatch_rounds: i32,
    first_dispatched_at: Option<PrimitiveDateTime>,
    created_at: PrimitiveDateTime,
    updated_at: PrimitiveDateTime,
}

impl TryFrom<RideRequestRow> for RideRequest {
    type Error = ParseEnumError;

    fn try_from(row: RideRequestRow) -> Result<Self, Self::Error> {
        Ok(Self {
            ride_id: row.ride_id,
            rider_id: row.rider_id,
            pickup: row.pickup,
            dropoff: row.dropoff,
            kind: row.kind,
            window_start: row.window_start,
            window_end: row.window_end,
            accessibility: row
                .accessibility
                .iter()
                .map(|f| f.parse())
                .collect::<Result<_, _>>()?,
            required_vehicle: row.required_vehicle.map(|v| v.parse()).transpose()?,
            status: row.status,
            match_deadline: row.match_deadline,
            dispatch_rounds: row.dispatch_rounds,
            first_dispatched_at: row.first_dispatched_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn decode_row(row: RideRequestRow) -> Result<RideRequest, sqlx::Error> {
    RideRequest::try_from(row).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

#[derive(Debug, Clone)]
pub struct InsertRideRequest {
    pub ride: RideRequest,
}

impl Processor<InsertRideRequest> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertRideRequest")]
    async fn process(&self, insert: InsertRideRequest) -> Result<(), sqlx::Error> {
        let ride = insert.ride;
        let accessibility: Vec<String> = ride
            .accessibility
            .iter()
            .map(|f| f.as_str().to_owned())
            .collect();
        let sql = format!(
            "INSERT INTO ride_requests ({RIDE_COLUMNS}) \
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        );
        sqlx::query(&sql)
            .bind(ride.ride_id)
            .bind(ride.rider_id)
            .bind(ride.pickup)
            .bind(ride.dropoff)
            .bind(ride.kind)
            .bind(ride.window_start)
            .bind(ride.window_end)
            .bind(accessibility)
            .bind(ride.required_vehicle.map(|v| v.as_str()))
            .bind(ride.status)
            .bind(ride.match_deadline)
            .bind(ride.dispatch_rounds)
            .bind(ride.first_dispatched_at)
            .bind(ride.created_at)
            .bind(ride.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GetRideRequest {
    pub ride_id: Uuid,
}

impl Processor<GetRideRequest> for DatabaseProcessor {
    type Output = Option<RideRequest>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetRideRequest")]
    async fn process(&self, query: GetRideRequest) -> Result<Option<RideRequest>, sqlx::Error> {
        let sql = format!("SELECT {RIDE_COLUMNS} FROM ride_requests WHERE ride_id = $1");
        let row = sqlx::query_as::<_, RideRequestRow>(&sql)
            .bind(query.ride_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(decode_row).transpose()
    }
}

#[derive(Debug, Clone)]
pub struct ListRideRequestsByStatus {
    pub status: RideStatus,
    pub limit: i64,
}

impl Processor<ListRideRequestsByStatus> for DatabaseProcessor {
    type Output = Vec<RideRequest>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListRideRequestsByStatus")]
    async fn process(
        &self,
        query: ListRideRequestsByStatus,
    ) -> Result<Vec<RideRequest>, sqlx::Error> {
        let sql = format!(
            "SELECT {RIDE_COLUMNS} FROM ride_requests WHERE status = $1 \
            ORDER BY created_at, ride_id LIMIT $2"
        );
        let rows = sqlx::query_as::<_, RideRequestRow>(&sql)
            .bind(query.status)
            .bind(query.limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(decode_row).collect()
    }
}

#[derive(Debug, Clone)]
/// Rides the periodic sweep has to look at.
///
/// Still searching and either past their outer deadline, unmatched, or
/// offering without a single live offer left. Immediate rides and pre-booked
/// rides starting by `prebook_horizon` come first.
pub struct GetRidesNeedingAttention {
    pub now: PrimitiveDateTime,
    pub prebook_horizon: PrimitiveDateTime,
    pub limit: i64,
}

impl Processor<GetRidesNeedingAttention> for DatabaseProcessor {
    type Output = Vec<RideRequest>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetRidesNeedingAttention")]
    async fn process(
        &self,
        query: GetRidesNeedingAttention,
    ) -> Result<Vec<RideRequest>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {RIDE_COLUMNS} FROM ride_requests r
            WHERE r.status IN ('unmatched', 'offering')
              AND (
                r.match_deadline <= $1
                OR r.status = 'unmatched'
                OR (r.status = 'offering' AND NOT EXISTS (
                    SELECT 1 FROM ride_offers o
                    WHERE o.ride_id = r.ride_id AND o.state = 'pending' AND o.expires_at > $1
                ))
              )
            ORDER BY (r.kind = 'immediate' OR r.window_start <= $2) DESC,
                     r.created_at, r.ride_id
            LIMIT $3
            "#
        );
        let rows = sqlx::query_as::<_, RideRequestRow>(&sql)
            .bind(query.now)
            .bind(query.prebook_horizon)
            .bind(query.limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(decode_row).collect()
    }
}
