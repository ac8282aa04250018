//! Timer engine implementation.
//!
//! The engine is a wall-clock-anchored state machine. It owns no threads and
//! no timers of its own: the caller (normally [`TimerService`]) invokes
//! [`TimerEngine::logic_tick`] periodically to detect completion.
//!
//! ## State Transitions
//!
//! ```text
//! Configuring --start--> Running --pause--> Paused --start--> Running
//! Running --(now >= target)--> [finished] --> Configuring
//! Running | Paused --stop--> Configuring
//! ```
//!
//! While running, the only ground truth is the target end timestamp. The
//! remaining time is recomputed from the clock on every query, so scheduler
//! jitter or a suspended process cannot make the countdown drift.
//!
//! Commands issued in the wrong phase are no-ops and return `None`.
//!
//! [`TimerService`]: super::TimerService

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::dial::{format_remaining, Dial, TimeField};
use crate::alert::Alert;
use crate::clock::Clock;
use crate::events::Event;
use crate::storage::{
    DailyUsageRecord, DurationPreference, KvStore, TimerConfig, UsageLedger,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    Configuring,
    Running,
    Paused,
}

/// Read-only view of the engine, published to attached views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub phase: TimerPhase,
    pub remaining_secs: f64,
    pub total_secs: u64,
    /// 0.0 .. 1.0 of the configured duration already elapsed.
    pub fraction_elapsed: f64,
    /// Remaining time as `HH:MM:SS`.
    pub label: String,
    pub dial: Dial,
    pub countable: bool,
    pub preset_active: bool,
    pub today: DailyUsageRecord,
}

/// Everything the engine needs from the outside.
pub struct EngineParts {
    pub clock: Arc<dyn Clock>,
    pub alert: Box<dyn Alert>,
    pub ledger: UsageLedger,
    pub preference: DurationPreference,
    /// Duration dialed in at startup.
    pub initial_secs: u32,
    /// Duration applied by [`TimerEngine::toggle_preset`].
    pub preset_secs: u32,
}

impl EngineParts {
    /// Read the ledger and the duration preference from `store`.
    ///
    /// This does blocking I/O and is meant to run off the control task.
    pub fn load(
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        alert: Box<dyn Alert>,
        config: &TimerConfig,
    ) -> Self {
        let preference = DurationPreference::new(store.clone(), config.default_duration_secs);
        let initial_secs = preference.get();
        let ledger = UsageLedger::load(store, clock.today());
        Self {
            clock,
            alert,
            ledger,
            preference,
            initial_secs,
            preset_secs: config.preset_duration_secs,
        }
    }
}

/// Core timer engine.
pub struct TimerEngine {
    phase: TimerPhase,
    dial: Dial,
    configured_secs: u64,
    /// Authoritative while configuring or paused; stale while running.
    remaining_secs: f64,
    /// Set iff running.
    target_end_ms: Option<i64>,
    countable: bool,
    /// What `countable` returns to after a completion or a manual edit.
    count_sessions: bool,
    preset_secs: u32,
    /// Dial saved when the preset was switched on.
    preset_backup: Option<Dial>,
    clock: Arc<dyn Clock>,
    alert: Box<dyn Alert>,
    ledger: UsageLedger,
    preference: DurationPreference,
}

impl TimerEngine {
    /// Create an engine in the `Configuring` phase with the initial duration
    /// dialed in.
    pub fn new(parts: EngineParts) -> Self {
        let dial = Dial::from_secs(u64::from(parts.initial_secs));
        let configured_secs = dial.total_secs();
        Self {
            phase: TimerPhase::Configuring,
            dial,
            configured_secs,
            remaining_secs: configured_secs as f64,
            target_end_ms: None,
            countable: true,
            count_sessions: true,
            preset_secs: parts.preset_secs,
            preset_backup: None,
            clock: parts.clock,
            alert: parts.alert,
            ledger: parts.ledger,
            preference: parts.preference,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    /// Seconds left. While running this is recomputed from the clock.
    pub fn remaining_secs(&self) -> f64 {
        match self.target_end_ms {
            Some(target) if self.phase == TimerPhase::Running => {
                let left = (target - self.clock.now_ms()) as f64 / 1000.0;
                left.clamp(0.0, self.configured_secs as f64)
            }
            _ => self.remaining_secs,
        }
    }

    /// The configured session length.
    pub fn total_secs(&self) -> u64 {
        self.configured_secs
    }

    /// Running or paused.
    pub fn is_active(&self) -> bool {
        self.phase != TimerPhase::Configuring
    }

    pub fn is_running(&self) -> bool {
        self.phase == TimerPhase::Running
    }

    pub fn target_end_ms(&self) -> Option<i64> {
        self.target_end_ms
    }

    pub fn dial(&self) -> Dial {
        self.dial
    }

    pub fn is_countable(&self) -> bool {
        self.countable
    }

    pub fn counts_sessions(&self) -> bool {
        self.count_sessions
    }

    pub fn preset_active(&self) -> bool {
        self.preset_backup.is_some()
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    pub fn today_usage(&self) -> DailyUsageRecord {
        self.ledger.today(self.today())
    }

    /// Ledger records for the last `n` days ending today, oldest first.
    pub fn last_n_days(&self, n: usize) -> Vec<DailyUsageRecord> {
        self.ledger.last_n_days(n, self.today())
    }

    /// 0.0 .. 1.0 of the configured duration already elapsed.
    pub fn fraction_elapsed(&self) -> f64 {
        if self.configured_secs == 0 {
            return 0.0;
        }
        (1.0 - self.remaining_secs() / self.configured_secs as f64).clamp(0.0, 1.0)
    }

    pub fn progress(&self) -> Progress {
        let remaining_secs = self.remaining_secs();
        Progress {
            phase: self.phase,
            remaining_secs,
            total_secs: self.configured_secs,
            fraction_elapsed: self.fraction_elapsed(),
            label: format_remaining(remaining_secs),
            dial: self.dial,
            countable: self.countable,
            preset_active: self.preset_active(),
            today: self.today_usage(),
        }
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> Event {
        Event::StateSnapshot(self.progress())
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Dial in `hours:minutes:seconds` and persist it as the preference.
    pub fn configure(&mut self, hours: u32, minutes: u32, seconds: u32) -> Option<Event> {
        if self.phase != TimerPhase::Configuring {
            return None;
        }
        let total = Dial::new(hours, minutes, seconds).total_secs();
        self.apply_dial(Dial::from_secs(total), true)
    }

    /// Step one field with wraparound and persist the result.
    pub fn adjust(&mut self, field: TimeField, delta: i32) -> Option<Event> {
        if self.phase != TimerPhase::Configuring {
            return None;
        }
        self.countable = self.count_sessions;
        self.apply_dial(self.dial.adjusted(field, delta), true)
    }

    /// Switch between the preset duration and whatever was dialed before.
    /// The preset is not persisted as the preference.
    pub fn toggle_preset(&mut self) -> Option<Event> {
        if self.phase != TimerPhase::Configuring {
            return None;
        }
        let next = match self.preset_backup.take() {
            Some(previous) => previous,
            None => {
                self.preset_backup = Some(self.dial);
                Dial::from_secs(u64::from(self.preset_secs))
            }
        };
        self.apply_dial(next, false)
    }

    /// Choose whether every later completion is written to the ledger, not
    /// just the next one. Takes effect for the current session only while
    /// configuring.
    pub fn set_counting(&mut self, enabled: bool) -> Option<Event> {
        self.count_sessions = enabled;
        if self.phase != TimerPhase::Configuring {
            return None;
        }
        self.countable = enabled;
        Some(self.configured_event())
    }

    /// Choose whether the next completion is written to the ledger.
    pub fn set_countable(&mut self, countable: bool) -> Option<Event> {
        if self.phase != TimerPhase::Configuring {
            return None;
        }
        self.countable = countable;
        Some(self.configured_event())
    }

    /// Start from `Configuring` or resume from `Paused`.
    ///
    /// With less than one second left the configured duration is restored
    /// first; if that is still under a second nothing happens.
    pub fn start(&mut self) -> Option<Event> {
        if self.phase == TimerPhase::Running {
            return None;
        }
        if self.remaining_secs < 1.0 {
            self.remaining_secs = self.configured_secs as f64;
        }
        if self.remaining_secs < 1.0 {
            debug!("Start ignored: nothing to count down");
            return None;
        }

        let resumed = self.phase == TimerPhase::Paused;
        let now = self.clock.now_ms();
        let target = now + (self.remaining_secs * 1000.0).round() as i64;
        self.target_end_ms = Some(target);
        self.phase = TimerPhase::Running;

        let remaining_secs = self.remaining_secs;
        let at = self.at();
        if resumed {
            info!(remaining_secs, "Timer resumed");
            Some(Event::TimerResumed {
                remaining_secs,
                target_end_ms: target,
                at,
            })
        } else {
            info!(remaining_secs, countable = self.countable, "Timer started");
            Some(Event::TimerStarted {
                remaining_secs,
                target_end_ms: target,
                at,
            })
        }
    }

    /// Pause when running, otherwise start or resume.
    ///
    /// A session whose target has already passed is finished instead, so a
    /// late toggle never starts a session nobody asked for.
    pub fn toggle(&mut self) -> Option<Event> {
        if let Some(completed) = self.logic_tick() {
            return Some(completed);
        }
        if self.is_running() {
            self.pause()
        } else {
            self.start()
        }
    }

    pub fn pause(&mut self) -> Option<Event> {
        if self.phase != TimerPhase::Running {
            return None;
        }
        self.remaining_secs = self.remaining_secs();
        self.target_end_ms = None;
        self.phase = TimerPhase::Paused;
        info!(remaining_secs = self.remaining_secs, "Timer paused");
        Some(Event::TimerPaused {
            remaining_secs: self.remaining_secs,
            at: self.at(),
        })
    }

    /// Discard progress. Never records a completion.
    pub fn stop(&mut self) -> Option<Event> {
        if self.phase != TimerPhase::Configuring {
            info!(phase = ?self.phase, "Timer stopped");
        }
        self.phase = TimerPhase::Configuring;
        self.target_end_ms = None;
        self.remaining_secs = self.configured_secs as f64;
        Some(Event::TimerStopped {
            configured_secs: self.configured_secs,
            at: self.at(),
        })
    }

    /// The authoritative completion check.
    ///
    /// Returns `Some(Event::SessionCompleted)` when the target has been
    /// reached; by then the engine is already back in `Configuring`.
    pub fn logic_tick(&mut self) -> Option<Event> {
        match self.target_end_ms {
            Some(target) if self.phase == TimerPhase::Running => {
                if self.clock.now_ms() >= target {
                    Some(self.finish())
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn finish(&mut self) -> Event {
        self.target_end_ms = None;
        self.phase = TimerPhase::Configuring;

        if let Err(e) = self.alert.play_alert() {
            warn!(error = %e, "Completion alert failed");
        }

        let duration_secs = self.configured_secs;
        let counted = self.countable;
        let (persisted, today) = if counted {
            let date = self.today();
            match self.ledger.record_completion(duration_secs, date) {
                Ok(record) => (true, Some(record)),
                Err(e) => {
                    warn!(error = %e, "Completion recorded in memory but not persisted");
                    (false, Some(self.ledger.today(date)))
                }
            }
        } else {
            (true, None)
        };

        self.countable = self.count_sessions;
        self.remaining_secs = self.configured_secs as f64;
        info!(duration_secs, counted, persisted, "Session completed");

        Event::SessionCompleted {
            duration_secs,
            counted,
            persisted,
            today,
            at: self.at(),
        }
    }

    fn apply_dial(&mut self, dial: Dial, persist: bool) -> Option<Event> {
        // The preference holds a u32; longer durations are capped so the
        // engine and the saved value agree.
        let secs = u32::try_from(dial.total_secs()).unwrap_or(u32::MAX);
        let dial = Dial::from_secs(u64::from(secs));
        self.dial = dial;
        self.configured_secs = u64::from(secs);
        self.remaining_secs = self.configured_secs as f64;
        if persist {
            // A manual edit leaves preset mode.
            self.preset_backup = None;
            self.preference.set(secs);
        }
        debug!(dial = %dial, "Duration configured");
        Some(self.configured_event())
    }

    fn configured_event(&self) -> Event {
        Event::SessionConfigured {
            configured_secs: self.configured_secs,
            countable: self.countable,
            at: self.at(),
        }
    }

    fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    fn at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.clock.now_ms()).unwrap_or_default()
    }
}

impl std::fmt::Debug for TimerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerEngine")
            .field("phase", &self.phase)
            .field("dial", &self.dial)
            .field("configured_secs", &self.configured_secs)
            .field("remaining_secs", &self.remaining_secs)
            .field("target_end_ms", &self.target_end_ms)
            .field("countable", &self.countable)
            .field("count_sessions", &self.count_sessions)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::SilentAlert;
    use crate::clock::ManualClock;
    use crate::error::AlertError;
    use crate::storage::{MemoryStore, DURATION_KEY};

    fn engine_with(initial_secs: u32) -> (TimerEngine, ManualClock, Arc<MemoryStore>) {
        let clock = ManualClock::at_date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        let store = Arc::new(MemoryStore::new());
        let config = TimerConfig {
            default_duration_secs: initial_secs,
            ..TimerConfig::default()
        };
        let parts = EngineParts::load(
            store.clone(),
            Arc::new(clock.clone()),
            Box::new(SilentAlert),
            &config,
        );
        (TimerEngine::new(parts), clock, store)
    }

    #[test]
    fn starts_configuring_with_initial_duration() {
        let (engine, _, _) = engine_with(1500);
        assert_eq!(engine.phase(), TimerPhase::Configuring);
        assert_eq!(engine.total_secs(), 1500);
        assert_eq!(engine.remaining_secs(), 1500.0);
        assert_eq!(engine.dial(), Dial::new(0, 25, 0));
        assert!(!engine.is_active());
    }

    #[test]
    fn start_pause_resume() {
        let (mut engine, clock, _) = engine_with(60);

        assert!(matches!(engine.start(), Some(Event::TimerStarted { .. })));
        assert_eq!(engine.phase(), TimerPhase::Running);
        assert!(engine.target_end_ms().is_some());

        clock.advance_secs(20);
        assert!(matches!(engine.pause(), Some(Event::TimerPaused { .. })));
        assert_eq!(engine.phase(), TimerPhase::Paused);
        assert!(engine.target_end_ms().is_none());
        assert_eq!(engine.remaining_secs(), 40.0);

        assert!(matches!(engine.start(), Some(Event::TimerResumed { .. })));
        assert_eq!(engine.remaining_secs(), 40.0);
    }

    #[test]
    fn commands_in_wrong_phase_are_noops() {
        let (mut engine, _, _) = engine_with(60);
        assert!(engine.pause().is_none());

        engine.start();
        assert!(engine.start().is_none());
        assert!(engine.configure(0, 1, 0).is_none());
        assert!(engine.adjust(TimeField::Minutes, 1).is_none());
        assert!(engine.toggle_preset().is_none());
        assert!(engine.set_countable(false).is_none());
        assert_eq!(engine.total_secs(), 60);
    }

    #[test]
    fn start_with_zero_duration_is_ignored() {
        let (mut engine, _, _) = engine_with(0);
        assert!(engine.start().is_none());
        assert_eq!(engine.phase(), TimerPhase::Configuring);
    }

    #[test]
    fn paused_with_less_than_a_second_restarts_full_duration() {
        let (mut engine, clock, _) = engine_with(10);
        engine.start();
        clock.advance_ms(9_500);
        engine.pause();
        assert!(engine.remaining_secs() < 1.0);

        engine.start();
        assert_eq!(engine.remaining_secs(), 10.0);
    }

    #[test]
    fn stop_restores_configured_duration() {
        let (mut engine, clock, _) = engine_with(300);
        engine.start();
        clock.advance_secs(100);
        assert!(engine.stop().is_some());
        assert_eq!(engine.phase(), TimerPhase::Configuring);
        assert_eq!(engine.remaining_secs(), 300.0);
        assert!(engine.target_end_ms().is_none());
        assert_eq!(engine.today_usage().session_count, 0);
    }

    #[test]
    fn remaining_is_recomputed_from_clock() {
        let (mut engine, clock, _) = engine_with(60);
        engine.start();
        clock.advance_ms(12_500);
        assert_eq!(engine.remaining_secs(), 47.5);
        assert_eq!(engine.progress().label, "00:00:48");
        clock.advance_secs(3600);
        assert_eq!(engine.remaining_secs(), 0.0);
        assert_eq!(engine.fraction_elapsed(), 1.0);
    }

    #[test]
    fn logic_tick_completes_and_records() {
        let (mut engine, clock, store) = engine_with(1500);
        engine.start();
        clock.advance_secs(1499);
        assert!(engine.logic_tick().is_none());
        clock.advance_secs(1);

        match engine.logic_tick() {
            Some(Event::SessionCompleted {
                duration_secs,
                counted,
                persisted,
                today,
                ..
            }) => {
                assert_eq!(duration_secs, 1500);
                assert!(counted);
                assert!(persisted);
                assert_eq!(today.unwrap().total_minutes, 25);
            }
            other => panic!("Expected SessionCompleted, got {other:?}"),
        }
        assert_eq!(engine.phase(), TimerPhase::Configuring);
        assert_eq!(engine.remaining_secs(), 1500.0);
        assert_eq!(store.contents()["session.2024-03-09"], "25,1");
        assert!(engine.logic_tick().is_none());
    }

    #[test]
    fn uncounted_session_leaves_ledger_alone() {
        let (mut engine, clock, _) = engine_with(120);
        engine.set_countable(false);
        engine.start();
        clock.advance_secs(120);
        match engine.logic_tick() {
            Some(Event::SessionCompleted { counted, today, .. }) => {
                assert!(!counted);
                assert!(today.is_none());
            }
            other => panic!("Expected SessionCompleted, got {other:?}"),
        }
        assert_eq!(engine.today_usage().session_count, 0);
        assert!(engine.is_countable());
    }

    #[test]
    fn counting_off_holds_across_sessions() {
        let (mut engine, clock, store) = engine_with(60);
        engine.set_counting(false);
        for _ in 0..2 {
            engine.start();
            clock.advance_secs(60);
            assert!(matches!(
                engine.logic_tick(),
                Some(Event::SessionCompleted { counted: false, .. })
            ));
            assert!(!engine.is_countable());
        }
        engine.adjust(TimeField::Seconds, 1);
        assert!(!engine.is_countable());
        assert_eq!(engine.today_usage().session_count, 0);
        assert!(!store.contents().contains_key("session.2024-03-09"));

        engine.set_counting(true);
        assert!(engine.is_countable());
    }

    #[test]
    fn counting_change_while_running_applies_to_next_session() {
        let (mut engine, clock, _) = engine_with(60);
        engine.start();
        assert!(engine.set_counting(false).is_none());
        assert!(engine.is_countable());
        clock.advance_secs(60);
        engine.logic_tick();
        assert_eq!(engine.today_usage().session_count, 1);
        assert!(!engine.is_countable());
    }

    #[test]
    fn toggle_pauses_and_resumes() {
        let (mut engine, clock, _) = engine_with(60);
        assert!(matches!(engine.toggle(), Some(Event::TimerStarted { .. })));
        clock.advance_secs(10);
        assert!(matches!(engine.toggle(), Some(Event::TimerPaused { .. })));
        assert_eq!(engine.remaining_secs(), 50.0);
        assert!(matches!(engine.toggle(), Some(Event::TimerResumed { .. })));
        assert!(engine.is_running());
    }

    #[test]
    fn toggle_after_target_finishes_instead_of_restarting() {
        let (mut engine, clock, _) = engine_with(60);
        engine.toggle();
        clock.advance_secs(61);
        assert!(matches!(
            engine.toggle(),
            Some(Event::SessionCompleted { .. })
        ));
        assert_eq!(engine.phase(), TimerPhase::Configuring);
        assert!(engine.target_end_ms().is_none());
        assert_eq!(engine.today_usage().session_count, 1);
    }

    #[test]
    fn oversized_duration_is_capped_consistently() {
        let (mut engine, _, store) = engine_with(60);
        engine.configure(1_200_000, 0, 0);
        assert_eq!(engine.total_secs(), u64::from(u32::MAX));
        assert_eq!(engine.dial().total_secs(), u64::from(u32::MAX));
        assert_eq!(store.contents()[DURATION_KEY], u32::MAX.to_string());
    }

    #[test]
    fn configure_persists_preference() {
        let (mut engine, _, store) = engine_with(1500);
        engine.configure(1, 2, 3);
        assert_eq!(engine.total_secs(), 3723);
        assert_eq!(engine.remaining_secs(), 3723.0);
        assert_eq!(store.contents()[DURATION_KEY], "3723");
    }

    #[test]
    fn adjust_wraps_and_persists() {
        let (mut engine, _, store) = engine_with(0);
        engine.adjust(TimeField::Minutes, -1);
        assert_eq!(engine.dial(), Dial::new(0, 59, 0));
        engine.adjust(TimeField::Hours, 23);
        engine.adjust(TimeField::Hours, 1);
        assert_eq!(engine.dial().hours, 0);
        assert_eq!(store.contents()[DURATION_KEY], "3540");
    }

    #[test]
    fn preset_toggle_restores_previous_dial() {
        let (mut engine, _, store) = engine_with(600);
        engine.toggle_preset();
        assert!(engine.preset_active());
        assert_eq!(engine.total_secs(), 1500);

        engine.toggle_preset();
        assert!(!engine.preset_active());
        assert_eq!(engine.total_secs(), 600);
        assert!(!store.contents().contains_key(DURATION_KEY));
    }

    #[test]
    fn manual_edit_leaves_preset_mode() {
        let (mut engine, _, store) = engine_with(600);
        engine.toggle_preset();
        engine.adjust(TimeField::Minutes, 5);
        assert!(!engine.preset_active());
        assert_eq!(engine.total_secs(), 1800);
        assert_eq!(store.contents()[DURATION_KEY], "1800");

        engine.toggle_preset();
        engine.toggle_preset();
        assert_eq!(engine.total_secs(), 1800);
    }

    struct FailingAlert;

    impl Alert for FailingAlert {
        fn play_alert(&self) -> Result<(), AlertError> {
            Err(AlertError::Playback("speaker on fire".into()))
        }
    }

    #[test]
    fn alert_failure_does_not_block_completion() {
        let (mut engine, clock, _) = engine_with(60);
        engine.alert = Box::new(FailingAlert);
        engine.start();
        clock.advance_secs(60);
        assert!(engine.logic_tick().is_some_and(|e| e.is_completion()));
        assert_eq!(engine.today_usage().session_count, 1);
    }
}
