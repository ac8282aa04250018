//! Rolling per-day usage ledger.
//!
//! Each calendar day with at least one completed countable session is stored
//! as `session.<YYYY-MM-DD>=<totalMinutes>,<sessionCount>`. Only the last
//! [`RETENTION_DAYS`] days (today inclusive) are kept; older entries are
//! pruned on every load and every save.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::properties::{KvStore, Properties};
use crate::error::StorageError;

pub const RETENTION_DAYS: u64 = 7;

const SESSION_KEY_PREFIX: &str = "session.";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Usage totals for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsageRecord {
    pub date: NaiveDate,
    pub total_minutes: u32,
    pub session_count: u32,
}

impl DailyUsageRecord {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_minutes: 0,
            session_count: 0,
        }
    }

    fn parse_value(date: NaiveDate, value: &str) -> Option<Self> {
        let mut parts = value.split(',');
        let total_minutes = parts.next()?.trim().parse().ok()?;
        let session_count = match parts.next() {
            Some(count) => count.trim().parse().ok()?,
            None => 0,
        };
        Some(Self {
            date,
            total_minutes,
            session_count,
        })
    }

    fn key(&self) -> String {
        format!("{SESSION_KEY_PREFIX}{}", self.date.format(DATE_FORMAT))
    }

    fn value(&self) -> String {
        format!("{},{}", self.total_minutes, self.session_count)
    }
}

/// Persisted map of calendar day to [`DailyUsageRecord`].
pub struct UsageLedger {
    store: Arc<dyn KvStore>,
    days: BTreeMap<NaiveDate, DailyUsageRecord>,
}

impl UsageLedger {
    /// Load from `store`, prune to the retention window and write the pruned
    /// form back immediately.
    ///
    /// A missing or unreadable store yields an empty ledger.
    pub fn load(store: Arc<dyn KvStore>, today: NaiveDate) -> Self {
        let props = store.load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read usage ledger, starting empty");
            Properties::new()
        });

        let mut days = BTreeMap::new();
        for (key, value) in &props {
            let Some(date_str) = key.strip_prefix(SESSION_KEY_PREFIX) else {
                continue;
            };
            let parsed = NaiveDate::parse_from_str(date_str, DATE_FORMAT)
                .ok()
                .and_then(|date| DailyUsageRecord::parse_value(date, value));
            match parsed {
                Some(record) => {
                    days.insert(record.date, record);
                }
                None => debug!(key = %key, "Skipping unreadable ledger entry"),
            }
        }

        let mut ledger = Self { store, days };
        ledger.prune(today);
        if let Err(e) = ledger.flush() {
            warn!(error = %e, "Failed to persist pruned usage ledger");
        }
        ledger
    }

    /// Record one completed session of `duration_secs` on `today`.
    ///
    /// The in-memory update always applies. The returned error only reports
    /// that the write did not durably succeed; [`flush`](Self::flush) retries.
    pub fn record_completion(
        &mut self,
        duration_secs: u64,
        today: NaiveDate,
    ) -> Result<DailyUsageRecord, StorageError> {
        let minutes = u32::try_from(duration_secs / 60).unwrap_or(u32::MAX);
        let record = self
            .days
            .entry(today)
            .or_insert_with(|| DailyUsageRecord::empty(today));
        record.total_minutes = record.total_minutes.saturating_add(minutes);
        record.session_count = record.session_count.saturating_add(1);
        let updated = *record;

        self.prune(today);
        self.flush()?;
        debug!(
            date = %today,
            total_minutes = updated.total_minutes,
            session_count = updated.session_count,
            "Usage ledger updated"
        );
        Ok(updated)
    }

    /// `n` records ending today, oldest first, zero-filled for missing days.
    pub fn last_n_days(&self, n: usize, today: NaiveDate) -> Vec<DailyUsageRecord> {
        (0..n as u64)
            .rev()
            .filter_map(|back| today.checked_sub_days(Days::new(back)))
            .map(|date| self.record_for(date))
            .collect()
    }

    /// Today's record, zero if nothing was recorded yet.
    pub fn today(&self, today: NaiveDate) -> DailyUsageRecord {
        self.record_for(today)
    }

    pub fn record_for(&self, date: NaiveDate) -> DailyUsageRecord {
        self.days
            .get(&date)
            .copied()
            .unwrap_or_else(|| DailyUsageRecord::empty(date))
    }

    /// Stored records in date order.
    pub fn records(&self) -> impl Iterator<Item = &DailyUsageRecord> {
        self.days.values()
    }

    /// Write the current map, replacing every `session.*` key in the store
    /// and keeping everything else.
    pub fn flush(&self) -> Result<(), StorageError> {
        let mut props = self.store.load()?;
        props.retain(|key, _| !key.starts_with(SESSION_KEY_PREFIX));
        for record in self.days.values() {
            props.insert(record.key(), record.value());
        }
        self.store.store(&props)
    }

    fn prune(&mut self, today: NaiveDate) {
        let Some(cutoff) = today.checked_sub_days(Days::new(RETENTION_DAYS - 1)) else {
            return;
        };
        let before = self.days.len();
        self.days.retain(|date, _| *date >= cutoff);
        let dropped = before - self.days.len();
        if dropped > 0 {
            debug!(dropped, cutoff = %cutoff, "Pruned expired ledger entries");
        }
    }
}

impl std::fmt::Debug for UsageLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageLedger")
            .field("days", &self.days)
            .finish_non_exhaustive()
    }
}
