//! Clock capability so stores and retention make time decisions testably.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Source of "now" for the stores and the retention task.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for deterministic TTL and eviction tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_on_demand() {
        let clock = ManualClock::new(DateTime::from_timestamp_millis(0).unwrap());
        assert_eq!(clock.now().timestamp_millis(), 0);
        clock.advance(Duration::seconds(2));
        assert_eq!(clock.now().timestamp_millis(), 2_000);
    }
}
