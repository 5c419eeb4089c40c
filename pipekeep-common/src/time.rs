//! Timestamp utilities and the injectable clock
//!
//! Every staleness computation reads "now" through a [`Clock`] so that
//! classification and the transition passes are deterministic under test.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Fractional hours elapsed between two instants (negative if `to` is earlier)
pub fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds() as f64 / 3600.0
}

/// Source of the current instant
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        now()
    }
}

/// Manually driven clock
///
/// Starts at a fixed instant and only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    instant: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: Mutex::new(instant),
        }
    }

    /// Jump to an absolute instant
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.lock() = instant;
    }

    /// Move forward (or backward, for a negative duration)
    pub fn advance(&self, by: Duration) {
        let mut guard = self.lock();
        *guard += by;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        // A poisoned clock still holds a valid instant
        self.instant.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[tokio::test]
    async fn test_system_clock_advances() {
        let clock = SystemClock;
        let time1 = clock.now();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let time2 = clock.now();
        assert!(time2 > time1);
    }

    #[test]
    fn test_fixed_clock_holds_still() {
        let clock = FixedClock::new(t0());
        assert_eq!(clock.now(), t0());
        assert_eq!(clock.now(), t0());
    }

    #[test]
    fn test_fixed_clock_advance_and_set() {
        let clock = FixedClock::new(t0());
        clock.advance(Duration::hours(73));
        assert_eq!(clock.now(), t0() + Duration::hours(73));

        clock.advance(Duration::minutes(-30));
        assert_eq!(clock.now(), t0() + Duration::hours(73) - Duration::minutes(30));

        clock.set(t0());
        assert_eq!(clock.now(), t0());
    }

    #[test]
    fn test_hours_between() {
        assert_eq!(hours_between(t0(), t0() + Duration::hours(36)), 36.0);
        assert_eq!(hours_between(t0(), t0() + Duration::minutes(90)), 1.5);
        assert_eq!(hours_between(t0() + Duration::hours(2), t0()), -2.0);
    }
}
