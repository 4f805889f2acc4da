//! Event channel factories and handles.

use super::types::{NotificationEvent, RideStatusUpdate};
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

/// Default buffer size for event channels.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for NotificationEvent events.
pub type NotificationEventSender = mpsc::Sender<NotificationEvent>;
/// Receiver handle for NotificationEvent events.
pub type NotificationEventReceiver = mpsc::Receiver<NotificationEvent>;

/// Create a new NotificationEvent channel.
pub fn notification_event_channel() -> (NotificationEventSender, NotificationEventReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create a new RideStatusUpdate broadcast channel.
///
/// Receivers are created with [`broadcast::Sender::subscribe`]; the initial
/// receiver is dropped.
pub fn ride_status_channel() -> broadcast::Sender<RideStatusUpdate> {
    let (tx, _) = broadcast::channel(DEFAULT_CHANNEL_BUFFER);
    tx
}

/// Container for all event channel senders.
///
/// Sending never waits: a full or closed notification queue drops the event
/// with a warning, so a slow notifier can not hold up matching.
#[derive(Clone)]
pub struct EventSenders {
    pub notification_event: NotificationEventSender,
    pub ride_status: broadcast::Sender<RideStatusUpdate>,
}

impl EventSenders {
    pub fn new(
        notification_event: NotificationEventSender,
        ride_status: broadcast::Sender<RideStatusUpdate>,
    ) -> Self {
        Self {
            notification_event,
            ride_status,
        }
    }

    pub fn notify(&self, event: NotificationEvent) {
        if let Err(e) = self.notification_event.try_send(event) {
            warn!(error = %e, "Dropped notification event");
        }
    }

    pub fn publish_status(&self, update: RideStatusUpdate) {
        // Nobody watching this ride is fine.
        let _ = self.ride_status.send(update);
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<RideStatusUpdate> {
        self.ride_status.subscribe()
    }
}
