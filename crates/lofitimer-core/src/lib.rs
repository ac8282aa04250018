//! # lofitimer Core Library
//!
//! The interval-timer engine of the lofitimer desktop player, usable on its
//! own. Views (the desktop page, the floating mini-indicator, the CLI) are
//! thin adapters over the same core library.
//!
//! ## Architecture
//!
//! - **Timer Engine**: a wall-clock-anchored state machine; completion is
//!   detected by a periodic `logic_tick()`
//! - **Timer Service**: one control task owning the engine, with a logic
//!   cadence that follows the running phase and a visual cadence that follows
//!   attached views
//! - **Storage**: a `key=value` properties file holding the duration
//!   preference and a rolling 7-day usage ledger, plus TOML configuration
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: core timer state machine
//! - [`EngineHandle`]: async command/query interface to the running service
//! - [`UsageLedger`]: per-day usage totals
//! - [`Config`]: application configuration management

pub mod alert;
pub mod clock;
pub mod error;
pub mod events;
pub mod storage;
pub mod timer;

pub use alert::{Alert, BellAlert, SilentAlert, SoundFileAlert};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AlertError, ConfigError, CoreError, Result, StorageError};
pub use events::Event;
pub use storage::{
    Config, DailyUsageRecord, DurationPreference, KvStore, MemoryStore, PropertiesFile,
    UsageLedger,
};
pub use timer::{
    Dial, EngineHandle, EngineParts, Progress, ServiceOptions, TimeField, TimerEngine,
    TimerPhase, TimerService, ViewHandle,
};
