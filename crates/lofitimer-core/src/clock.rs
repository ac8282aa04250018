//! Wall-clock sources.
//!
//! The engine never caches a countdown; every remaining-time query goes back
//! to the clock. Production code uses [`SystemClock`], tests drive a
//! [`ManualClock`] by hand.

use chrono::{DateTime, Local, NaiveDate};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Source of wall-clock time and of the current calendar day.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;

    /// The current calendar day used for ledger keys.
    fn today(&self) -> NaiveDate;
}

/// Real wall clock; calendar days follow local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Local::now().timestamp_millis()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Manually advanced clock. Clones share the same instant.
///
/// Calendar days are derived in UTC so tests are independent of the host
/// time zone.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: Arc::new(AtomicI64::new(now_ms)),
        }
    }

    /// Start at midnight UTC of `date`.
    pub fn at_date(date: NaiveDate) -> Self {
        let ms = date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or_default();
        Self::new(ms)
    }

    pub fn set_ms(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance_ms(secs.saturating_mul(1000));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn today(&self) -> NaiveDate {
        DateTime::from_timestamp_millis(self.now_ms())
            .map(|dt| dt.date_naive())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(1_000);
        let other = clock.clone();
        clock.advance_secs(2);
        assert_eq!(other.now_ms(), 3_000);
    }

    #[test]
    fn manual_clock_rolls_over_midnight() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let clock = ManualClock::at_date(day);
        assert_eq!(clock.today(), day);
        clock.advance_secs(24 * 3600 - 1);
        assert_eq!(clock.today(), day);
        clock.advance_secs(1);
        assert_eq!(clock.today(), day.succ_opt().unwrap());
    }
}
