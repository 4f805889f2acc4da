use crate::entities::SessionEndReason;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use ridematch_sdk::objects::GeoPoint;
use time::PrimitiveDateTime;
use uuid::Uuid;

/// One continuous online period of a driver. Closed, never deleted.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DriverSession {
    pub session_id: i64,
    pub driver_id: Uuid,
    pub started_at: PrimitiveDateTime,
    pub ended_at: Option<PrimitiveDateTime>,
    pub last_heartbeat_at: PrimitiveDateTime,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    pub end_reason: Option<SessionEndReason>,
}

impl DriverSession {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    pub fn location(&self) -> Option<GeoPoint> {
        match (self.location_lat, self.location_lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        }
    }

    /// Whether the driver has an open session, read inside a transaction.
    pub async fn is_open_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        driver_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let open: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM driver_sessions
                WHERE driver_id = $1 AND ended_at IS NULL
            )
            "#,
        )
        .bind(driver_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(open)
    }

    /// Take the driver's transaction-scoped advisory lock.
    ///
    /// Accepts for different rides lock different ride rows, so this is what
    /// serializes two accepts of the same driver.
    pub async fn lock_driver_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        driver_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(driver_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

const SESSION_COLUMNS: &str = "session_id, driver_id, started_at, ended_at, last_heartbeat_at, \
    location_lat, location_lng, end_reason";

#[derive(Debug, Clone)]
/// Open a session unless one is already open.
///
/// Returns `None` when the partial unique index on open sessions rejected the
/// insert, i.e. the driver was already online.
pub struct OpenDriverSession {
    pub driver_id: Uuid,
    pub location: Option<GeoPoint>,
    pub now: PrimitiveDateTime,
}

impl Processor<OpenDriverSession> for DatabaseProcessor {
    type Output = Option<DriverSession>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:OpenDriverSession")]
    async fn process(
        &self,
        insert: OpenDriverSession,
    ) -> Result<Option<DriverSession>, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO driver_sessions
                (driver_id, started_at, last_heartbeat_at, location_lat, location_lng)
            VALUES ($1, $2, $2, $3, $4)
            ON CONFLICT (driver_id) WHERE ended_at IS NULL DO NOTHING
            RETURNING {SESSION_COLUMNS}
            "#
        );
        sqlx::query_as::<_, DriverSession>(&sql)
            .bind(insert.driver_id)
            .bind(insert.now)
            .bind(insert.location.map(|l| l.lat))
            .bind(insert.location.map(|l| l.lng))
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct GetOpenDriverSession {
    pub driver_id: Uuid,
}

impl Processor<GetOpenDriverSession> for DatabaseProcessor {
    type Output = Option<DriverSession>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetOpenDriverSession")]
    async fn process(
        &self,
        query: GetOpenDriverSession,
    ) -> Result<Option<DriverSession>, sqlx::Error> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM driver_sessions \
             WHERE driver_id = $1 AND ended_at IS NULL"
        );
        sqlx::query_as::<_, DriverSession>(&sql)
            .bind(query.driver_id)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct GetOpenDriverSessions;

impl Processor<GetOpenDriverSessions> for DatabaseProcessor {
    type Output = Vec<DriverSession>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetOpenDriverSessions")]
    async fn process(&self, _: GetOpenDriverSessions) -> Result<Vec<DriverSession>, sqlx::Error> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM driver_sessions \
             WHERE ended_at IS NULL ORDER BY driver_id"
        );
        sqlx::query_as::<_, DriverSession>(&sql)
            .fetch_all(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct CloseDriverSession {
    pub driver_id: Uuid,
    pub reason: SessionEndReason,
    pub now: PrimitiveDateTime,
}

impl Processor<CloseDriverSession> for DatabaseProcessor {
    type Output = Option<DriverSession>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CloseDriverSession")]
    async fn process(
        &self,
        update: CloseDriverSession,
    ) -> Result<Option<DriverSession>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE driver_sessions
            SET ended_at = $2, end_reason = $3
            WHERE driver_id = $1 AND ended_at IS NULL
            RETURNING {SESSION_COLUMNS}
            "#
        );
        sqlx::query_as::<_, DriverSession>(&sql)
            .bind(update.driver_id)
            .bind(update.now)
            .bind(update.reason)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Refresh the heartbeat of an open session, keeping the last known
/// location when none is given.
pub struct TouchDriverSession {
    pub driver_id: Uuid,
    pub location: Option<GeoPoint>,
    pub now: PrimitiveDateTime,
}

impl Processor<TouchDriverSession> for DatabaseProcessor {
    type Output = Option<DriverSession>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:TouchDriverSession")]
    async fn process(
        &self,
        update: TouchDriverSession,
    ) -> Result<Option<DriverSession>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE driver_sessions
            SET last_heartbeat_at = $2,
                location_lat = COALESCE($3, location_lat),
                location_lng = COALESCE($4, location_lng)
            WHERE driver_id = $1 AND ended_at IS NULL
            RETURNING {SESSION_COLUMNS}
            "#
        );
        sqlx::query_as::<_, DriverSession>(&sql)
            .bind(update.driver_id)
            .bind(update.now)
            .bind(update.location.map(|l| l.lat))
            .bind(update.location.map(|l| l.lng))
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Close every open session whose last heartbeat is older than `cutoff`.
pub struct CloseStaleDriverSessions {
    pub cutoff: PrimitiveDateTime,
    pub now: PrimitiveDateTime,
}

impl Processor<CloseStaleDriverSessions> for DatabaseProcessor {
    type Output = Vec<DriverSession>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CloseStaleDriverSessions")]
    async fn process(
        &self,
        update: CloseStaleDriverSessions,
    ) -> Result<Vec<DriverSession>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE driver_sessions
            SET ended_at = $2, end_reason = 'heartbeat_timeout'
            WHERE ended_at IS NULL AND last_heartbeat_at < $1
            RETURNING {SESSION_COLUMNS}
            "#
        );
        sqlx::query_as::<_, DriverSession>(&sql)
            .bind(update.cutoff)
            .bind(update.now)
            .fetch_all(&self.pool)
            .await
    }
}
