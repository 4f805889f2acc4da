//! MatchScheduler processor.
//!
//! The MatchScheduler is responsible for:
//! - Expiring offers whose window has passed
//! - Force-closing driver sessions that stopped sending heartbeats
//! - Expiring rides past their outer deadline and telling the rider
//! - Re-dispatching rides that are still searching
//! - Retrying calendar writes that failed earlier
//!
//! The first dispatch of a ride does not wait for a tick; it runs inside
//! [`MatchingEngine::create_ride`](crate::matching::MatchingEngine::create_ride).

use crate::config::{ConfigWatcher, MatchingConfig};
use crate::matching::{DispatchOutcome, MatchingEngine};
use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// Counters for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_offers: usize,
    pub closed_sessions: usize,
    pub expired_rides: usize,
    pub dispatched: usize,
    pub no_eligible: usize,
    pub calendar_retries: usize,
}

impl SweepReport {
    pub fn is_idle(&self) -> bool {
        *self == SweepReport::default()
    }
}

/// Periodic sweep over everything that changes with time alone.
pub struct MatchScheduler {
    engine: MatchingEngine,
}

impl MatchScheduler {
    pub fn new(engine: MatchingEngine) -> Self {
        Self { engine }
    }

    /// Run sweeps until shutdown is signaled. A config change restarts the
    /// tick interval with the new period.
    pub async fn run(
        self,
        mut shutdown_rx: watch::Receiver<bool>,
        mut config_watcher: ConfigWatcher,
    ) {
        let config = self.engine.config().snapshot().await;
        let mut interval = Self::interval(&config);
        info!(period = ?config.sweep_period(), "MatchScheduler started");

        loop {
            tokio::select! {
                biased;

                res = shutdown_rx.changed() => {
                    if res.is_err() || *shutdown_rx.borrow() {
                        info!("MatchScheduler received shutdown signal");
                        break;
                    }
                }

                Ok(()) = config_watcher.changed() => {
                    let config = self.engine.config().snapshot().await;
                    interval = Self::interval(&config);
                    info!(period = ?config.sweep_period(), "MatchScheduler picked up new config");
                }

                _ = interval.tick() => {
                    let report = self.tick().await;
                    if !report.is_idle() {
                        debug!(report = ?report, "Sweep finished");
                    }
                }
            }
        }

        info!("MatchScheduler shutdown complete");
    }

    fn interval(config: &MatchingConfig) -> Interval {
        let mut interval = tokio::time::interval(config.sweep_period());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }

    /// One sweep. A failing step is logged and the remaining steps still run.
    pub async fn tick(&self) -> SweepReport {
        let config = self.engine.config().snapshot().await;
        let mut report = SweepReport::default();

        match self.engine.offers().sweep_expired().await {
            Ok(expired) => report.expired_offers = expired.len(),
            Err(e) => error!(error = %e, "Failed to expire due offers"),
        }

        match self
            .engine
            .registry()
            .expire_stale(config.heartbeat_timeout)
            .await
        {
            Ok(closed) => report.closed_sessions = closed.len(),
            Err(e) => error!(error = %e, "Failed to close stale driver sessions"),
        }

        let now = self.engine.clock().now();
        let rides = match self
            .engine
            .store()
            .rides_needing_attention(now, now + config.prebook_lead, config.sweep_batch_size)
            .await
        {
            Ok(rides) => rides,
            Err(e) => {
                error!(error = %e, "Failed to list rides needing attention");
                Vec::new()
            }
        };
        let (overdue, searching): (Vec<_>, Vec<_>) =
            rides.into_iter().partition(|r| now >= r.match_deadline);

        for ride in overdue {
            match self.engine.dispatcher().expire_overdue(ride.ride_id).await {
                Ok(Some(_)) => report.expired_rides += 1,
                Ok(None) => {}
                Err(e) => error!(ride_id = %ride.ride_id, error = %e, "Failed to expire ride"),
            }
        }

        for ride in searching {
            match self.engine.dispatcher().dispatch(ride.ride_id).await {
                Ok(DispatchOutcome::Offered { .. }) => report.dispatched += 1,
                Ok(DispatchOutcome::NoEligibleDrivers) => report.no_eligible += 1,
                Ok(DispatchOutcome::Skipped(_)) => {}
                Err(e) => error!(ride_id = %ride.ride_id, error = %e, "Failed to re-dispatch ride"),
            }
        }

        match self.engine.coordinator().retry_missing_calendar_entries().await {
            Ok(tried) => report.calendar_retries = tried,
            Err(e) => error!(error = %e, "Failed to retry calendar entries"),
        }

        report
    }
}
