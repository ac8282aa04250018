use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::DailyUsageRecord;
use crate::timer::Progress;

/// Every state change of the engine produces an Event.
/// Views subscribe to them; commands return them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The dialed-in duration changed while configuring.
    SessionConfigured {
        configured_secs: u64,
        countable: bool,
        at: DateTime<Utc>,
    },
    TimerStarted {
        remaining_secs: f64,
        target_end_ms: i64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        remaining_secs: f64,
        target_end_ms: i64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        remaining_secs: f64,
        at: DateTime<Utc>,
    },
    /// Progress discarded; back to the configured duration.
    TimerStopped {
        configured_secs: u64,
        at: DateTime<Utc>,
    },
    SessionCompleted {
        duration_secs: u64,
        counted: bool,
        /// False when the ledger write did not durably succeed.
        persisted: bool,
        /// Today's ledger totals after the completion was recorded.
        today: Option<DailyUsageRecord>,
        at: DateTime<Utc>,
    },
    StateSnapshot(Progress),
}

impl Event {
    pub fn is_completion(&self) -> bool {
        matches!(self, Event::SessionCompleted { .. })
    }
}
