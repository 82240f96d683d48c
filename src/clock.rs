//! Wall-clock abstraction shared by the admission controller and the task processor.
//!
//! Rate-limit windows and result ages are measured against wall-clock time
//! because the `X-RateLimit-Reset` header is reported in epoch seconds.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Creates a new system clock.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock whose time only moves when told to.
///
/// Clones share the same underlying instant, so a test can hand one clone to
/// the component under test and advance time through another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Creates a manual clock starting at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Moves the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock();
        *current += duration;
    }

    /// Moves the clock forward by whole seconds.
    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }

    /// Sets the clock to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.current.lock() = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_advance_and_set() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance_secs(61);
        assert_eq!(clock.now(), start + Duration::seconds(61));

        let later = start + Duration::hours(5);
        clock.set(later);
        assert_eq!(clock.now(), later);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        let other = clock.clone();

        other.advance_secs(10);
        assert_eq!(clock.now(), start + Duration::seconds(10));
    }

    #[test]
    fn test_system_clock_is_monotonic_enough() {
        let clock = SystemClock::new();
        let t1 = clock.now();
        let t2 = clock.now();
        assert!(t2 >= t1);
    }
}
