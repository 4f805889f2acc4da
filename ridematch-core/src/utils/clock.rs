//! Time source used by every component that makes a time-based decision.
//!
//! All timestamps are UTC `PrimitiveDateTime`s, matching the `TIMESTAMP`
//! columns in the database.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

pub trait Clock: Send + Sync {
    fn now(&self) -> PrimitiveDateTime;
}

pub type SharedClock = Arc<dyn Clock>;

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> PrimitiveDateTime {
        let now = OffsetDateTime::now_utc();
        PrimitiveDateTime::new(now.date(), now.time())
    }
}

/// A clock that only moves when told to. Millisecond resolution.
#[derive(Debug)]
pub struct ManualClock {
    unix_millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: PrimitiveDateTime) -> Self {
        Self {
            unix_millis: AtomicI64::new(to_unix_millis(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let millis = i64::try_from(by.whole_milliseconds()).unwrap_or(i64::MAX);
        self.unix_millis.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, at: PrimitiveDateTime) {
        self.unix_millis.store(to_unix_millis(at), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> PrimitiveDateTime {
        let nanos = i128::from(self.unix_millis.load(Ordering::SeqCst)) * 1_000_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map(|t| PrimitiveDateTime::new(t.date(), t.time()))
            .unwrap_or(PrimitiveDateTime::MIN)
    }
}

fn to_unix_millis(t: PrimitiveDateTime) -> i64 {
    i64::try_from(t.assume_utc().unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

/// Unix seconds, as exposed on the wire.
pub fn to_unix(t: PrimitiveDateTime) -> i64 {
    t.assume_utc().unix_timestamp()
}

pub fn from_unix(secs: i64) -> Option<PrimitiveDateTime> {
    OffsetDateTime::from_unix_timestamp(secs)
        .ok()
        .map(|t| PrimitiveDateTime::new(t.date(), t.time()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(datetime!(2025-03-03 09:00:00));
        clock.advance(Duration::seconds(31));
        assert_eq!(clock.now(), datetime!(2025-03-03 09:00:31));
        clock.set(datetime!(2025-03-04 00:00:00));
        assert_eq!(clock.now(), datetime!(2025-03-04 00:00:00));
    }

    #[test]
    fn unix_conversion_is_utc() {
        let t = datetime!(1970-01-01 00:01:40);
        assert_eq!(to_unix(t), 100);
        assert_eq!(from_unix(100), Some(t));
    }
}
