use crate::entities::{DriverSession, SessionEndReason};
use crate::matching::MatchError;
use crate::store::{SessionOpen, SharedStore};
use crate::utils::SharedClock;
use ridematch_sdk::objects::GeoPoint;
use std::collections::BTreeSet;
use time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Result of a presence action. Repeats are no-ops, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceChange {
    WentOnline(DriverSession),
    AlreadyOnline(DriverSession),
    WentOffline(DriverSession),
    Refreshed(DriverSession),
    NotOnline,
}

impl PresenceChange {
    pub fn changed(&self) -> bool {
        matches!(
            self,
            PresenceChange::WentOnline(_) | PresenceChange::WentOffline(_)
        )
    }

    /// The open session after the action, if any.
    pub fn open_session(&self) -> Option<&DriverSession> {
        match self {
            PresenceChange::WentOnline(s)
            | PresenceChange::AlreadyOnline(s)
            | PresenceChange::Refreshed(s) => Some(s),
            PresenceChange::WentOffline(_) | PresenceChange::NotOnline => None,
        }
    }
}

/// Which drivers are online, backed by their sessions in the store.
#[derive(Clone)]
pub struct DriverPresenceRegistry {
    store: SharedStore,
    clock: SharedClock,
}

impl DriverPresenceRegistry {
    pub fn new(store: SharedStore, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    pub async fn online(
        &self,
        driver_id: Uuid,
        location: Option<GeoPoint>,
    ) -> Result<PresenceChange, MatchError> {
        match self
            .store
            .open_session(driver_id, location, self.clock.now())
            .await?
        {
            SessionOpen::Opened(session) => {
                info!(%driver_id, session_id = session.session_id, "Driver went online");
                Ok(PresenceChange::WentOnline(session))
            }
            SessionOpen::AlreadyOpen(session) => {
                debug!(%driver_id, "Driver already online");
                Ok(PresenceChange::AlreadyOnline(session))
            }
        }
    }

    pub async fn offline(&self, driver_id: Uuid) -> Result<PresenceChange, MatchError> {
        let closed = self
            .store
            .close_session(driver_id, SessionEndReason::Offline, self.clock.now())
            .await?;
        Ok(match closed {
            Some(session) => {
                info!(%driver_id, session_id = session.session_id, "Driver went offline");
                PresenceChange::WentOffline(session)
            }
            None => PresenceChange::NotOnline,
        })
    }

    pub async fn heartbeat(
        &self,
        driver_id: Uuid,
        location: Option<GeoPoint>,
    ) -> Result<PresenceChange, MatchError> {
        let touched = self
            .store
            .touch_session(driver_id, location, self.clock.now())
            .await?;
        Ok(touched.map_or(PresenceChange::NotOnline, PresenceChange::Refreshed))
    }

    /// Point-in-time set of online drivers. May be stale by the time it is
    /// used; acceptance re-checks presence under the ride lock.
    pub async fn snapshot_online_drivers(&self) -> Result<BTreeSet<Uuid>, MatchError> {
        Ok(self
            .store
            .open_sessions()
            .await?
            .into_iter()
            .map(|s| s.driver_id)
            .collect())
    }

    pub async fn session(&self, driver_id: Uuid) -> Result<Option<DriverSession>, MatchError> {
        Ok(self.store.open_session_for(driver_id).await?)
    }

    /// Force-close sessions that missed heartbeats for longer than `timeout`.
    pub async fn expire_stale(&self, timeout: Duration) -> Result<Vec<DriverSession>, MatchError> {
        let now = self.clock.now();
        let closed = self.store.close_stale_sessions(now - timeout, now).await?;
        for session in &closed {
            info!(
                driver_id = %session.driver_id,
                last_heartbeat_at = %session.last_heartbeat_at,
                "Closed driver session after missed heartbeats"
            );
        }
        Ok(closed)
    }
}
