//! Long-running processors.
//!
//! - `MatchScheduler`: ticks at the sweep interval, expires offers, sessions
//!   and rides, re-dispatches searching rides, retries calendar writes
//! - `NotificationSender`: receives `NotificationEvent`, calls the
//!   notification collaborator

pub mod notification_sender;
pub mod scheduler;

pub use notification_sender::NotificationSender;
pub use scheduler::{MatchScheduler, SweepReport};
