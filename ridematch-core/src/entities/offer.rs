use crate::entities::{OfferState, counter};
use crate::framework::DatabaseProcessor;
use crate::utils::to_unix;
use kanau::processor::Processor;
use ridematch_sdk::objects::OfferResponse;
use time::PrimitiveDateTime;
use uuid::Uuid;

/// One proposal of a ride to one driver.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Offer {
    pub offer_id: Uuid,
    pub ride_id: Uuid,
    pub driver_id: Uuid,
    pub state: OfferState,
    /// Dispatch round that created the offer, starting at 1.
    pub round: i32,
    pub rank: i32,
    pub created_at: PrimitiveDateTime,
    pub expires_at: PrimitiveDateTime,
    pub responded_at: Option<PrimitiveDateTime>,
    pub decline_reason: Option<String>,
}

impl Offer {
    /// Pending and not yet past its expiry.
    pub fn is_live(&self, now: PrimitiveDateTime) -> bool {
        self.state == OfferState::Pending && now < self.expires_at
    }

    /// Pending but past its expiry; the next access or sweep expires it.
    pub fn is_due(&self, now: PrimitiveDateTime) -> bool {
        self.state == OfferState::Pending && now >= self.expires_at
    }

    pub async fn for_ride_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        ride_id: Uuid,
    ) -> Result<Vec<Offer>, sqlx::Error> {
        let sql = format!(
            "SELECT {OFFER_COLUMNS} FROM ride_offers \
             WHERE ride_id = $1 ORDER BY round, rank, driver_id"
        );
        sqlx::query_as::<_, Offer>(&sql)
            .bind(ride_id)
            .fetch_all(&mut **tx)
            .await
    }

    pub async fn insert_many_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        offers: &[Offer],
    ) -> Result<u64, sqlx::Error> {
        if offers.is_empty() {
            return Ok(0);
        }

        let mut query_builder = sqlx::QueryBuilder::new(format!(
            "INSERT INTO ride_offers ({OFFER_COLUMNS}) "
        ));

        query_builder.push_values(offers, |mut b, offer| {
            b.push_bind(offer.offer_id)
                .push_bind(offer.ride_id)
                .push_bind(offer.driver_id)
                .push_bind(offer.state)
                .push_bind(offer.round)
                .push_bind(offer.rank)
                .push_bind(offer.created_at)
                .push_bind(offer.expires_at)
                .push_bind(offer.responded_at)
                .push_bind(offer.decline_reason.clone());
        });

        let result = query_builder.build().execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }

    /// Move still pending offers into a terminal state.
    ///
    /// The `state = 'pending'` guard makes this a compare-and-swap: only the
    /// offers it actually moved come back.
    pub async fn resolve_many_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        offer_ids: &[Uuid],
        state: OfferState,
        now: PrimitiveDateTime,
    ) -> Result<Vec<Offer>, sqlx::Error> {
        if offer_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            UPDATE ride_offers
            SET state = $2, responded_at = $3
            WHERE offer_id = ANY($1) AND state = 'pending'
            RETURNING {OFFER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Offer>(&sql)
            .bind(offer_ids)
            .bind(state)
            .bind(now)
            .fetch_all(&mut **tx)
            .await
    }

    /// Pending offers of the driver on other rides whose window overlaps
    /// `[from, to)`.
    pub async fn pending_for_driver_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        driver_id: Uuid,
        except_ride: Uuid,
        from: PrimitiveDateTime,
        to: PrimitiveDateTime,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT o.offer_id FROM ride_offers o
            JOIN ride_requests r ON r.ride_id = o.ride_id
            WHERE o.driver_id = $1
              AND o.ride_id <> $2
              AND o.state = 'pending'
              AND r.window_start < $4
              AND r.window_end > $3
            "#,
        )
        .bind(driver_id)
        .bind(except_ride)
        .bind(from)
        .bind(to)
        .fetch_all(&mut **tx)
        .await
    }

    pub async fn get_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        offer_id: Uuid,
    ) -> Result<Option<Offer>, sqlx::Error> {
        let sql = format!("SELECT {OFFER_COLUMNS} FROM ride_offers WHERE offer_id = $1");
        sqlx::query_as::<_, Offer>(&sql)
            .bind(offer_id)
            .fetch_optional(&mut **tx)
            .await
    }

    pub async fn record_decline_reason_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        offer_id: Uuid,
        reason: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE ride_offers SET decline_reason = $2 WHERE offer_id = $1")
            .bind(offer_id)
            .bind(reason)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

impl From<Offer> for OfferResponse {
    fn from(value: Offer) -> Self {
        Self {
            offer_id: value.offer_id,
            ride_id: value.ride_id,
            driver_id: value.driver_id,
            state: value.state.into(),
            round: counter(value.round),
            rank: counter(value.rank),
            created_at: to_unix(value.created_at),
            expires_at: to_unix(value.expires_at),
            responded_at: value.responded_at.map(to_unix),
        }
    }
}

pub(crate) const OFFER_COLUMNS: &str = "offer_id, ride_id, driver_id, state, round, rank, \
    created_at, expires_at, responded_at, decline_reason";

#[derive(Debug, Clone)]
pub struct GetOffer {
    pub offer_id: Uuid,
}

impl Processor<GetOffer> for DatabaseProcessor {
    type Output = Option<Offer>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetOffer")]
    async fn process(&self, query: GetOffer) -> Result<Option<Offer>, sqlx::Error> {
        let sql = format!("SELECT {OFFER_COLUMNS} FROM ride_offers WHERE offer_id = $1");
        sqlx::query_as::<_, Offer>(&sql)
            .bind(query.offer_id)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct GetOffersForRide {
    pub ride_id: Uuid,
}

impl Processor<GetOffersForRide> for DatabaseProcessor {
    type Output = Vec<Offer>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetOffersForRide")]
    async fn process(&self, query: GetOffersForRide) -> Result<Vec<Offer>, sqlx::Error> {
        let sql = format!(
            "SELECT {OFFER_COLUMNS} FROM ride_offers \
             WHERE ride_id = $1 ORDER BY round, rank, driver_id"
        );
        sqlx::query_as::<_, Offer>(&sql)
            .bind(query.ride_id)
            .fetch_all(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Offers a driver can still answer.
pub struct GetLiveOffersForDriver {
    pub driver_id: Uuid,
    pub now: PrimitiveDateTime,
}

impl Processor<GetLiveOffersForDriver> for DatabaseProcessor {
    type Output = Vec<Offer>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetLiveOffersForDriver")]
    async fn process(&self, query: GetLiveOffersForDriver) -> Result<Vec<Offer>, sqlx::Error> {
        let sql = format!(
            "SELECT {OFFER_COLUMNS} FROM ride_offers \
            WHERE driver_id = $1 AND state = 'pending' AND expires_at > $2 \
            ORDER BY expires_at, offer_id"
        );
        sqlx::query_as::<_, Offer>(&sql)
            .bind(query.driver_id)
            .bind(query.now)
            .fetch_all(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Expire every pending offer whose expiry has passed.
pub struct ExpireDueOffers {
    pub now: PrimitiveDateTime,
}

impl Processor<ExpireDueOffers> for DatabaseProcessor {
    type Output = Vec<Offer>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ExpireDueOffers")]
    async fn process(&self, update: ExpireDueOffers) -> Result<Vec<Offer>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE ride_offers
            SET state = 'expired', responded_at = $1
            WHERE state = 'pending' AND expires_at <= $1
            RETURNING {OFFER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Offer>(&sql)
            .bind(update.now)
            .fetch_all(&self.pool)
            .await
    }
}
