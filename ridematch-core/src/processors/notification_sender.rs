//! NotificationSender processor.
//!
//! Drains [`NotificationEvent`]s and hands each one to the notification
//! collaborator. Delivery is fire-and-forget: failures are logged and the
//! event is dropped.

use crate::collaborators::{CollaboratorError, SharedNotifier};
use crate::events::{NotificationEvent, NotificationEventReceiver};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct NotificationSender {
    notifier: SharedNotifier,
}

impl NotificationSender {
    pub fn new(notifier: SharedNotifier) -> Self {
        Self { notifier }
    }

    /// Run until shutdown is signaled or every sender is dropped.
    pub async fn run(
        self,
        mut shutdown_rx: watch::Receiver<bool>,
        mut event_rx: NotificationEventReceiver,
    ) {
        info!("NotificationSender started");

        loop {
            tokio::select! {
                biased;

                res = shutdown_rx.changed() => {
                    if res.is_err() || *shutdown_rx.borrow() {
                        info!("NotificationSender received shutdown signal");
                        break;
                    }
                }

                Some(event) = event_rx.recv() => {
                    debug!(event = ?event, "Received NotificationEvent");
                    if let Err(e) = self.deliver(&event).await {
                        warn!(event = ?event, error = %e, "Notification delivery failed");
                    }
                }

                else => {
                    info!("NotificationEvent channel closed");
                    break;
                }
            }
        }

        info!("NotificationSender shutdown complete");
    }

    pub async fn deliver(&self, event: &NotificationEvent) -> Result<(), CollaboratorError> {
        match *event {
            NotificationEvent::OfferCreated {
                driver_id,
                offer_id,
                ride_id,
                expires_at,
            } => {
                self.notifier
                    .notify_driver_of_offer(driver_id, offer_id, ride_id, expires_at)
                    .await
            }
            NotificationEvent::RideAssigned {
                ride_id,
                rider_id,
                driver_id,
            } => {
                self.notifier
                    .notify_rider_of_assignment(ride_id, rider_id, driver_id)
                    .await
            }
            NotificationEvent::RideUnmatched { ride_id, rider_id } => {
                self.notifier.notify_rider_unmatched(ride_id, rider_id).await
            }
            NotificationEvent::OfferWithdrawn {
                driver_id,
                offer_id,
                ride_id,
            } => {
                self.notifier
                    .notify_driver_offer_withdrawn(driver_id, offer_id, ride_id)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::notification_event_channel;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::Mutex;
    use time::PrimitiveDateTime;
    use uuid::Uuid;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<&'static str>>,
    }

    impl Recording {
        fn push(&self, call: &'static str) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call);
            }
        }
    }

    #[async_trait]
    impl crate::collaborators::NotificationCollaborator for Recording {
        async fn notify_driver_of_offer(
            &self,
            _: Uuid,
            _: Uuid,
            _: Uuid,
            _: PrimitiveDateTime,
        ) -> Result<(), CollaboratorError> {
            self.push("offer");
            Ok(())
        }

        async fn notify_rider_of_assignment(
            &self,
            _: Uuid,
            _: Uuid,
            _: Uuid,
        ) -> Result<(), CollaboratorError> {
            self.push("assigned");
            Ok(())
        }

        async fn notify_rider_unmatched(&self, _: Uuid, _: Uuid) -> Result<(), CollaboratorError> {
            Err(CollaboratorError::Unavailable("down".to_string()))
        }

        async fn notify_driver_offer_withdrawn(
            &self,
            _: Uuid,
            _: Uuid,
            _: Uuid,
        ) -> Result<(), CollaboratorError> {
            self.push("withdrawn");
            Ok(())
        }
    }

    #[tokio::test]
    async fn failures_do_not_stop_delivery() {
        let recording = Arc::new(Recording::default());
        let sender = NotificationSender::new(recording.clone());
        let (tx, rx) = notification_event_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let id = Uuid::now_v7();
        let events = [
            NotificationEvent::RideUnmatched {
                ride_id: id,
                rider_id: id,
            },
            NotificationEvent::RideAssigned {
                ride_id: id,
                rider_id: id,
                driver_id: id,
            },
            NotificationEvent::OfferWithdrawn {
                driver_id: id,
                offer_id: id,
                ride_id: id,
            },
        ];
        for event in events {
            assert!(tx.send(event).await.is_ok());
        }
        drop(tx);

        sender.run(shutdown_rx, rx).await;
        let calls = recording
            .calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default();
        assert_eq!(calls, vec!["assigned", "withdrawn"]);
    }
}
