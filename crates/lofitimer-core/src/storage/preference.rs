//! Last user-configured session length.

use std::sync::Arc;

use tracing::{debug, warn};

use super::properties::KvStore;

pub const DURATION_KEY: &str = "pomodoro_duration_seconds";

/// Persisted duration preference.
///
/// Reads and writes never fail from the caller's point of view: a missing or
/// corrupt value yields the default, and a failed write is logged.
#[derive(Clone)]
pub struct DurationPreference {
    store: Arc<dyn KvStore>,
    default_secs: u32,
}

impl DurationPreference {
    pub fn new(store: Arc<dyn KvStore>, default_secs: u32) -> Self {
        Self {
            store,
            default_secs,
        }
    }

    pub fn default_secs(&self) -> u32 {
        self.default_secs
    }

    pub fn get(&self) -> u32 {
        let props = match self.store.load() {
            Ok(props) => props,
            Err(e) => {
                warn!(error = %e, "Failed to read duration preference, using default");
                return self.default_secs;
            }
        };
        match props.get(DURATION_KEY).map(|v| v.parse::<u32>()) {
            Some(Ok(secs)) => secs,
            Some(Err(_)) => {
                warn!(key = DURATION_KEY, "Corrupt duration preference, using default");
                self.default_secs
            }
            None => self.default_secs,
        }
    }

    /// Persist synchronously. Other keys in the store are preserved.
    pub fn set(&self, secs: u32) {
        let mut props = match self.store.load() {
            Ok(props) => props,
            Err(e) => {
                warn!(error = %e, "Failed to read store before saving duration preference");
                return;
            }
        };
        props.insert(DURATION_KEY.to_string(), secs.to_string());
        match self.store.store(&props) {
            Ok(()) => debug!(secs, "Duration preference saved"),
            Err(e) => warn!(error = %e, secs, "Failed to save duration preference"),
        }
    }
}

impl std::fmt::Debug for DurationPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurationPreference")
            .field("default_secs", &self.default_secs)
            .finish_non_exhaustive()
    }
}
