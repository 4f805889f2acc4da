use crate::entities::counter;
use crate::framework::DatabaseProcessor;
use crate::utils::to_unix;
use kanau::processor::Processor;
use ridematch_sdk::objects::AssignmentResponse;
use time::PrimitiveDateTime;
use uuid::Uuid;

/// The binding between a ride and the driver whose offer won.
///
/// There is at most one per ride (unique on `ride_id`). A rider cancelling
/// an assigned ride sets `released_at`, which frees the driver's schedule
/// but keeps the row.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Assignment {
    pub assignment_id: Uuid,
    pub ride_id: Uuid,
    pub driver_id: Uuid,
    pub offer_id: Uuid,
    pub window_start: PrimitiveDateTime,
    pub window_end: PrimitiveDateTime,
    pub assigned_at: PrimitiveDateTime,
    pub calendar_entry_id: Option<String>,
    pub calendar_attempts: i32,
    pub calendar_last_tried_at: Option<PrimitiveDateTime>,
    pub released_at: Option<PrimitiveDateTime>,
}

impl Assignment {
    pub fn is_active(&self) -> bool {
        self.released_at.is_none()
    }

    pub fn calendar_attempts(&self) -> u32 {
        counter(self.calendar_attempts)
    }

    /// Insert unless the ride already has an assignment; either way return
    /// the ride's assignment.
    pub async fn insert_or_get_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        assignment: &Assignment,
    ) -> Result<Assignment, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO assignments ({ASSIGNMENT_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (ride_id) DO NOTHING
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        );
        let inserted = sqlx::query_as::<_, Assignment>(&sql)
            .bind(assignment.assignment_id)
            .bind(assignment.ride_id)
            .bind(assignment.driver_id)
            .bind(assignment.offer_id)
            .bind(assignment.window_start)
            .bind(assignment.window_end)
            .bind(assignment.assigned_at)
            .bind(assignment.calendar_entry_id.clone())
            .bind(assignment.calendar_attempts)
            .bind(assignment.calendar_last_tried_at)
            .bind(assignment.released_at)
            .fetch_optional(&mut **tx)
            .await?;
        match inserted {
            Some(assignment) => Ok(assignment),
            None => {
                let sql =
                    format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE ride_id = $1");
                sqlx::query_as::<_, Assignment>(&sql)
                    .bind(assignment.ride_id)
                    .fetch_one(&mut **tx)
                    .await
            }
        }
    }

    pub async fn for_ride_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        ride_id: Uuid,
    ) -> Result<Option<Assignment>, sqlx::Error> {
        let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE ride_id = $1");
        sqlx::query_as::<_, Assignment>(&sql)
            .bind(ride_id)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Active assignments of the driver on other rides whose window overlaps
    /// `[from, to)`.
    pub async fn active_for_driver_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        driver_id: Uuid,
        except_ride: Uuid,
        from: PrimitiveDateTime,
        to: PrimitiveDateTime,
    ) -> Result<Vec<Assignment>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS} FROM assignments
            WHERE driver_id = $1
              AND ride_id <> $2
              AND released_at IS NULL
              AND window_start < $4
              AND window_end > $3
            "#
        );
        sqlx::query_as::<_, Assignment>(&sql)
            .bind(driver_id)
            .bind(except_ride)
            .bind(from)
            .bind(to)
            .fetch_all(&mut **tx)
            .await
    }

    /// Release the ride's active assignment, returning it if there was one.
    pub async fn release_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        ride_id: Uuid,
        now: PrimitiveDateTime,
    ) -> Result<Option<Assignment>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE assignments SET released_at = $2
            WHERE ride_id = $1 AND released_at IS NULL
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Assignment>(&sql)
            .bind(ride_id)
            .bind(now)
            .fetch_optional(&mut **tx)
            .await
    }
}

impl From<Assignment> for AssignmentResponse {
    fn from(value: Assignment) -> Self {
        Self {
            assignment_id: value.assignment_id,
            ride_id: value.ride_id,
            driver_id: value.driver_id,
            offer_id: value.offer_id,
            window_start: to_unix(value.window_start),
            window_end: to_unix(value.window_end),
            assigned_at: to_unix(value.assigned_at),
            calendar_entry_id: value.calendar_entry_id,
        }
    }
}

const ASSIGNMENT_COLUMNS: &str = "assignment_id, ride_id, driver_id, offer_id, window_start, \
    window_end, assigned_at, calendar_entry_id, calendar_attempts, calendar_last_tried_at, \
    released_at";

#[derive(Debug, Clone)]
pub struct GetAssignmentForRide {
    pub ride_id: Uuid,
}

impl Processor<GetAssignmentForRide> for DatabaseProcessor {
    type Output = Option<Assignment>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetAssignmentForRide")]
    async fn process(
        &self,
        query: GetAssignmentForRide,
    ) -> Result<Option<Assignment>, sqlx::Error> {
        let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE ride_id = $1");
        sqlx::query_as::<_, Assignment>(&sql)
            .bind(query.ride_id)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Active assignments of the given drivers whose window overlaps `[from, to)`.
pub struct GetActiveAssignmentsForDrivers {
    pub driver_ids: Vec<Uuid>,
    pub from: PrimitiveDateTime,
    pub to: PrimitiveDateTime,
}

impl Processor<GetActiveAssignmentsForDrivers> for DatabaseProcessor {
    type Output = Vec<Assignment>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetActiveAssignmentsForDrivers")]
    async fn process(
        &self,
        query: GetActiveAssignmentsForDrivers,
    ) -> Result<Vec<Assignment>, sqlx::Error> {
        if query.driver_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS} FROM assignments
            WHERE driver_id = ANY($1)
              AND released_at IS NULL
              AND window_start < $3
              AND window_end > $2
            ORDER BY driver_id, window_start
            "#
        );
        sqlx::query_as::<_, Assignment>(&sql)
            .bind(&query.driver_ids)
            .bind(query.from)
            .bind(query.to)
            .fetch_all(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Store the outcome of one calendar write.
///
/// `entry_id = None` records a failed attempt.
pub struct RecordCalendarAttempt {
    pub assignment_id: Uuid,
    pub entry_id: Option<String>,
    pub now: PrimitiveDateTime,
}

impl Processor<RecordCalendarAttempt> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:RecordCalendarAttempt")]
    async fn process(&self, update: RecordCalendarAttempt) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE assignments
            SET calendar_entry_id = COALESCE(calendar_entry_id, $2),
                calendar_attempts = calendar_attempts + 1,
                calendar_last_tried_at = $3
            WHERE assignment_id = $1
            "#,
        )
        .bind(update.assignment_id)
        .bind(update.entry_id)
        .bind(update.now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
/// Mark the first calendar write of an assignment as started.
///
/// Affects one row only for the first caller on an untouched assignment.
pub struct ClaimCalendarWrite {
    pub assignment_id: Uuid,
    pub now: PrimitiveDateTime,
}

impl Processor<ClaimCalendarWrite> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ClaimCalendarWrite")]
    async fn process(&self, claim: ClaimCalendarWrite) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE assignments
            SET calendar_last_tried_at = $2
            WHERE assignment_id = $1
              AND released_at IS NULL
              AND calendar_entry_id IS NULL
              AND calendar_attempts = 0
              AND calendar_last_tried_at IS NULL
            "#,
        )
        .bind(claim.assignment_id)
        .bind(claim.now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Debug, Clone)]
/// Active assignments still waiting for a calendar entry.
pub struct GetAssignmentsMissingCalendar {
    pub max_attempts: i32,
    pub limit: i64,
}

impl Processor<GetAssignmentsMissingCalendar> for DatabaseProcessor {
    type Output = Vec<Assignment>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetAssignmentsMissingCalendar")]
    async fn process(
        &self,
        query: GetAssignmentsMissingCalendar,
    ) -> Result<Vec<Assignment>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS} FROM assignments
            WHERE calendar_entry_id IS NULL
              AND released_at IS NULL
              AND calendar_attempts < $1
            ORDER BY assigned_at
            LIMIT $2
            "#
        );
        sqlx::query_as::<_, Assignment>(&sql)
            .bind(query.max_attempts)
            .bind(query.limit)
            .fetch_all(&self.pool)
            .await
    }
}
