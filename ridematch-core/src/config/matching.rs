//! Matching parameters.

use crate::entities::RideKind;
use time::{Duration, PrimitiveDateTime};

/// Knobs for dispatch rounds, expiry and the periodic sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchingConfig {
    /// How long an offer for an immediate ride stays open.
    pub immediate_offer_window: Duration,
    /// How long an offer for a pre-booked ride stays open.
    pub prebooked_offer_window: Duration,
    /// Offer only the best K drivers per round. `None` offers every eligible driver.
    pub max_offers_per_round: Option<usize>,
    pub sweep_interval: Duration,
    /// Every sweep re-dispatches unmatched rides; pre-booked ones starting
    /// within this lead go first, together with immediate rides.
    pub prebook_lead: Duration,
    /// Outer deadline for an immediate ride, counted from creation.
    pub immediate_match_deadline: Duration,
    /// Outer deadline for a pre-booked ride, counted back from the window start.
    pub prebooked_cutoff: Duration,
    /// A session with no heartbeat for this long is force-closed.
    pub heartbeat_timeout: Duration,
    /// Minimum gap kept between two assignments of the same driver.
    pub schedule_buffer: Duration,
    /// Calendar writes stop being retried after this many failures.
    pub calendar_max_attempts: u32,
    /// How long one calendar call may take before it counts as failed.
    pub calendar_timeout: Duration,
    /// Upper bound on rides re-dispatched by one sweep.
    pub sweep_batch_size: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            immediate_offer_window: Duration::seconds(30),
            prebooked_offer_window: Duration::hours(2),
            max_offers_per_round: Some(5),
            sweep_interval: Duration::seconds(5),
            prebook_lead: Duration::hours(1),
            immediate_match_deadline: Duration::minutes(10),
            prebooked_cutoff: Duration::minutes(15),
            heartbeat_timeout: Duration::seconds(90),
            schedule_buffer: Duration::minutes(15),
            calendar_max_attempts: 12,
            calendar_timeout: Duration::seconds(10),
            sweep_batch_size: 100,
        }
    }
}

impl MatchingConfig {
    pub fn offer_window(&self, kind: RideKind) -> Duration {
        match kind {
            RideKind::Immediate => self.immediate_offer_window,
            RideKind::PreBooked => self.prebooked_offer_window,
        }
    }

    /// Outer deadline for a ride created at `created_at`.
    ///
    /// A pre-booked ride whose cutoff has already passed at creation keeps
    /// searching until its window starts.
    pub fn match_deadline(
        &self,
        kind: RideKind,
        created_at: PrimitiveDateTime,
        window_start: PrimitiveDateTime,
    ) -> PrimitiveDateTime {
        match kind {
            RideKind::Immediate => created_at + self.immediate_match_deadline,
            RideKind::PreBooked => {
                let cutoff = window_start - self.prebooked_cutoff;
                if cutoff > created_at {
                    cutoff
                } else {
                    window_start
                }
            }
        }
    }

    /// Sweep interval as a tokio period. Never zero.
    pub fn sweep_period(&self) -> std::time::Duration {
        std::time::Duration::try_from(self.sweep_interval)
            .unwrap_or(std::time::Duration::from_secs(5))
            .max(std::time::Duration::from_millis(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn deadlines_follow_ride_kind() {
        let config = MatchingConfig::default();
        let created = datetime!(2025-03-03 08:00:00);
        assert_eq!(
            config.match_deadline(RideKind::Immediate, created, created),
            datetime!(2025-03-03 08:10:00)
        );
        assert_eq!(
            config.match_deadline(RideKind::PreBooked, created, datetime!(2025-03-03 12:00:00)),
            datetime!(2025-03-03 11:45:00)
        );
        assert_eq!(
            config.match_deadline(RideKind::PreBooked, created, datetime!(2025-03-03 08:10:00)),
            datetime!(2025-03-03 08:10:00)
        );
    }

    #[test]
    fn zero_sweep_interval_is_clamped() {
        let config = MatchingConfig {
            sweep_interval: Duration::ZERO,
            ..MatchingConfig::default()
        };
        assert_eq!(config.sweep_period(), std::time::Duration::from_millis(100));
    }
}
