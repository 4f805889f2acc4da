#![allow(dead_code)]

use async_trait::async_trait;
use ridematch_core::collaborators::{CalendarBooking, CalendarCollaborator, CollaboratorError};
use ridematch_core::config::{ConfigStore, MatchingConfig};
use ridematch_core::entities::{DriverProfile, RideKind};
use ridematch_core::events::{
    EventSenders, NotificationEvent, NotificationEventReceiver, RideStatusUpdate,
    notification_event_channel, ride_status_channel,
};
use ridematch_core::matching::{CreatedRide, MatchingEngine, NewRide};
use ridematch_core::store::InMemoryStore;
use ridematch_core::utils::ManualClock;
use ridematch_sdk::objects::{AccessibilityFeature, DayOfWeek, VehicleClass, WorkingSlot};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use time::macros::datetime;
use time::{Duration, PrimitiveDateTime};
use tokio::sync::broadcast;
use uuid::Uuid;

/// A Monday morning.
pub const START: PrimitiveDateTime = datetime!(2025-03-03 10:00:00);

/// Calendar that fails a set number of times, then hands out entry ids.
#[derive(Default)]
pub struct ScriptedCalendar {
    failures_left: AtomicU32,
    latency: std::time::Duration,
    bookings: Mutex<Vec<CalendarBooking>>,
}

impl ScriptedCalendar {
    pub fn failing(times: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(times),
            ..Self::default()
        }
    }

    /// Every call takes `latency` of real time before it answers.
    pub fn slow(latency: std::time::Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.bookings.lock().unwrap().len()
    }
}

#[async_trait]
impl CalendarCollaborator for ScriptedCalendar {
    async fn add_booking_to_calendar(
        &self,
        booking: &CalendarBooking,
    ) -> Result<String, CollaboratorError> {
        self.bookings.lock().unwrap().push(booking.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CollaboratorError::Unavailable("calendar down".to_string()));
        }
        Ok(format!("cal-{}", booking.assignment_id))
    }
}

pub struct Harness {
    pub engine: MatchingEngine,
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryStore>,
    pub calendar: Arc<ScriptedCalendar>,
    pub config: ConfigStore<MatchingConfig>,
    pub notifications: NotificationEventReceiver,
    pub statuses: broadcast::Receiver<RideStatusUpdate>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(MatchingConfig::default(), ScriptedCalendar::default())
    }

    pub fn with_config(config: MatchingConfig) -> Self {
        Self::build(config, ScriptedCalendar::default())
    }

    pub fn with_calendar(calendar: ScriptedCalendar) -> Self {
        Self::build(MatchingConfig::default(), calendar)
    }

    fn build(config: MatchingConfig, calendar: ScriptedCalendar) -> Self {
        let clock = Arc::new(ManualClock::new(START));
        let store = Arc::new(InMemoryStore::new());
        let calendar = Arc::new(calendar);
        let config = ConfigStore::new(config);
        let (notification_tx, notifications) = notification_event_channel();
        let events = EventSenders::new(notification_tx, ride_status_channel());
        let statuses = events.subscribe_status();
        let engine = MatchingEngine::new(
            store.clone(),
            clock.clone(),
            config.clone(),
            calendar.clone(),
            events,
        );
        Self {
            engine,
            clock,
            store,
            calendar,
            config,
            notifications,
            statuses,
        }
    }

    pub fn advance(&self, seconds: i64) {
        self.clock.advance(Duration::seconds(seconds));
    }

    pub fn now(&self) -> PrimitiveDateTime {
        self.engine.clock().now()
    }

    /// Register a standard-vehicle driver available all week and put them online.
    pub async fn online_driver(&self, n: u128, features: &[AccessibilityFeature]) -> Uuid {
        let driver_id = driver(n);
        self.register(driver_id, VehicleClass::Standard, features).await;
        self.engine
            .registry()
            .online(driver_id, None)
            .await
            .unwrap();
        driver_id
    }

    pub async fn register(
        &self,
        driver_id: Uuid,
        vehicle: VehicleClass,
        features: &[AccessibilityFeature],
    ) {
        self.engine
            .upsert_profile(DriverProfile {
                driver_id,
                vehicle,
                features: features.iter().copied().collect(),
                working_hours: all_week(),
                updated_at: self.now(),
            })
            .await
            .unwrap();
    }

    pub async fn immediate_ride(&self, accessibility: &[AccessibilityFeature]) -> CreatedRide {
        self.engine
            .create_ride(immediate(accessibility))
            .await
            .unwrap()
    }

    pub async fn prebooked_ride(&self, window_start: PrimitiveDateTime) -> CreatedRide {
        self.engine
            .create_ride(NewRide {
                kind: RideKind::PreBooked,
                window_start: Some(window_start),
                ..immediate(&[])
            })
            .await
            .unwrap()
    }

    pub fn drain_notifications(&mut self) -> Vec<NotificationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.notifications.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn driver(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

pub fn immediate(accessibility: &[AccessibilityFeature]) -> NewRide {
    NewRide {
        rider_id: Uuid::from_u128(0x5EED),
        pickup: "Station Square".to_string(),
        dropoff: "Riverside Clinic".to_string(),
        kind: RideKind::Immediate,
        window_start: None,
        duration: Duration::minutes(30),
        accessibility: accessibility.iter().copied().collect::<BTreeSet<_>>(),
        required_vehicle: None,
    }
}

pub fn all_week() -> Vec<WorkingSlot> {
    [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ]
    .into_iter()
    .map(|day| WorkingSlot {
        day,
        start_minute: 0,
        end_minute: 1440,
    })
    .collect()
}
