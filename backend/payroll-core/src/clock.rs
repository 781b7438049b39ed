// src/clock.rs
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use std::sync::{Arc, Mutex};

/// Source of "now" for future-date checks and backup timestamps.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct TestClock {
    current_time: Arc<Mutex<NaiveDateTime>>,
}

impl TestClock {
    pub fn new(datetime_str: &str) -> Self {
        let dt = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S")
            .unwrap_or_else(|e| panic!("Invalid datetime '{}' for TestClock: {}", datetime_str, e));
        Self {
            current_time: Arc::new(Mutex::new(dt)),
        }
    }

    pub fn set_time(&self, datetime_str: &str) {
        let dt = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S")
            .unwrap_or_else(|e| panic!("Invalid datetime '{}' for TestClock: {}", datetime_str, e));
        *self.lock() = dt;
    }

    pub fn advance(&self, duration: Duration) {
        *self.lock() += duration;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NaiveDateTime> {
        // A poisoned clock still holds a valid instant.
        self.current_time
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        self.lock().and_utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_shared_between_clones() {
        let clock = TestClock::new("2026-10-19 09:00:00");
        let other = clock.clone();
        clock.advance(Duration::days(1));
        assert_eq!(other.today(), NaiveDate::from_ymd_opt(2026, 10, 20).unwrap());
        other.set_time("2026-11-01 00:00:00");
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 11, 1).unwrap());
    }
}
