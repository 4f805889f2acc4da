//! Retry schedule for collaborator calls that failed after the state
//! transition they belong to has already been committed.

use time::{Duration, PrimitiveDateTime};

/// Upper bound on the exponent (2^11 = 2048 seconds).
pub const MAX_BACKOFF_EXPONENT: u32 = 11;

/// Delay before attempt number `attempts + 1`, in exponential steps of 2^n seconds.
pub fn retry_delay(attempts: u32) -> Duration {
    Duration::seconds(1i64 << attempts.min(MAX_BACKOFF_EXPONENT))
}

/// Whether a failed call last tried at `last_tried_at` may be tried again at `now`.
pub fn is_retry_due(
    attempts: u32,
    last_tried_at: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) -> bool {
    match last_tried_at {
        None => true,
        Some(last) => now >= last + retry_delay(attempts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_retry_delay() {
        assert_eq!(retry_delay(0), Duration::seconds(1));
        assert_eq!(retry_delay(1), Duration::seconds(2));
        assert_eq!(retry_delay(2), Duration::seconds(4));
        assert_eq!(retry_delay(10), Duration::seconds(1024));
        assert_eq!(retry_delay(11), Duration::seconds(2048));
        assert_eq!(retry_delay(15), Duration::seconds(2048));
    }

    #[test]
    fn retry_waits_out_the_delay() {
        let last = datetime!(2025-01-01 12:00:00);
        assert!(is_retry_due(0, None, last));
        assert!(!is_retry_due(2, Some(last), last + Duration::seconds(3)));
        assert!(is_retry_due(2, Some(last), last + Duration::seconds(4)));
    }
}
