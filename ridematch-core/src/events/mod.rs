//! Event system.
//!
//! # Event Flow
//!
//! 1. Dispatcher, state machine, coordinator and scheduler emit
//!    `NotificationEvent` -> `NotificationSender` -> notification collaborator
//! 2. Every ride status change is broadcast as `RideStatusUpdate` -> rider
//!    WebSocket streams
//!
//! Events are emitted after the change they describe is committed. They
//! are fire-and-forget: losing one never affects ride or offer state.

pub mod channels;
pub mod types;

pub use channels::{
    DEFAULT_CHANNEL_BUFFER, EventSenders, NotificationEventReceiver, NotificationEventSender,
    notification_event_channel, ride_status_channel,
};

pub use types::{NotificationEvent, RideStatusUpdate};
