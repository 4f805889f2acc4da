//! JSON-over-HTTP collaborators.

use super::{
    CalendarBooking, CalendarCollaborator, CollaboratorError, LoggingCollaborator,
    NotificationCollaborator,
};
use crate::config::CollaboratorConfig;
use crate::utils::{SharedClock, to_unix};
use async_trait::async_trait;
use ridematch_sdk::objects::{
    CalendarEntryRequest, CalendarEntryResponse, NotificationEnvelope, NotificationPayload,
};
use time::PrimitiveDateTime;
use tracing::debug;
use url::Url;
use uuid::Uuid;

/// Posts JSON payloads to the configured calendar and notification URLs.
///
/// A call whose URL is not configured goes to a [`LoggingCollaborator`]
/// instead.
pub struct HttpCollaborator {
    http_client: reqwest::Client,
    calendar_url: Option<Url>,
    notification_url: Option<Url>,
    clock: SharedClock,
    fallback: LoggingCollaborator,
}

impl HttpCollaborator {
    pub fn new(config: &CollaboratorConfig, clock: SharedClock) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(config.request_timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            calendar_url: config.calendar_url.clone(),
            notification_url: config.notification_url.clone(),
            clock,
            fallback: LoggingCollaborator,
        }
    }

    async fn post_notification(
        &self,
        url: &Url,
        payload: NotificationPayload,
    ) -> Result<(), CollaboratorError> {
        let envelope = NotificationEnvelope {
            timestamp: to_unix(self.clock.now()),
            payload,
        };
        let response = self
            .http_client
            .post(url.clone())
            .json(&envelope)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CollaboratorError::Rejected {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl CalendarCollaborator for HttpCollaborator {
    async fn add_booking_to_calendar(
        &self,
        booking: &CalendarBooking,
    ) -> Result<String, CollaboratorError> {
        let Some(url) = &self.calendar_url else {
            return self.fallback.add_booking_to_calendar(booking).await;
        };
        let request = CalendarEntryRequest {
            driver_id: booking.driver_id,
            ride_id: booking.ride_id,
            assignment_id: booking.assignment_id,
            window_start: to_unix(booking.window_start),
            window_end: to_unix(booking.window_end),
        };
        let response = self
            .http_client
            .post(url.clone())
            .json(&request)
            .send()
            .await?;
        let entry: CalendarEntryResponse = check_status(response).await?.json().await?;
        debug!(
            assignment_id = %booking.assignment_id,
            entry_id = %entry.entry_id,
            "Calendar entry created"
        );
        Ok(entry.entry_id)
    }
}

#[async_trait]
impl NotificationCollaborator for HttpCollaborator {
    async fn notify_driver_of_offer(
        &self,
        driver_id: Uuid,
        offer_id: Uuid,
        ride_id: Uuid,
        expires_at: PrimitiveDateTime,
    ) -> Result<(), CollaboratorError> {
        let Some(url) = &self.notification_url else {
            return self
                .fallback
                .notify_driver_of_offer(driver_id, offer_id, ride_id, expires_at)
                .await;
        };
        self.post_notification(
            url,
            NotificationPayload::OfferCreated {
                driver_id,
                offer_id,
                ride_id,
                expires_at: to_unix(expires_at),
            },
        )
        .await
    }

    async fn notify_rider_of_assignment(
        &self,
        ride_id: Uuid,
        rider_id: Uuid,
        driver_id: Uuid,
    ) -> Result<(), CollaboratorError> {
        let Some(url) = &self.notification_url else {
            return self
                .fallback
                .notify_rider_of_assignment(ride_id, rider_id, driver_id)
                .await;
        };
        self.post_notification(
            url,
            NotificationPayload::RideAssigned {
                ride_id,
                rider_id,
                driver_id,
            },
        )
        .await
    }

    async fn notify_rider_unmatched(
        &self,
        ride_id: Uuid,
        rider_id: Uuid,
    ) -> Result<(), CollaboratorError> {
        let Some(url) = &self.notification_url else {
            return self.fallback.notify_rider_unmatched(ride_id, rider_id).await;
        };
        self.post_notification(url, NotificationPayload::RideUnmatched { ride_id, rider_id })
            .await
    }

    async fn notify_driver_offer_withdrawn(
        &self,
        driver_id: Uuid,
        offer_id: Uuid,
        ride_id: Uuid,
    ) -> Result<(), CollaboratorError> {
        let Some(url) = &self.notification_url else {
            return self
                .fallback
                .notify_driver_offer_withdrawn(driver_id, offer_id, ride_id)
                .await;
        };
        self.post_notification(
            url,
            NotificationPayload::OfferWithdrawn {
                driver_id,
                offer_id,
                ride_id,
            },
        )
        .await
    }
}
