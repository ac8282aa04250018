mod dial;
mod engine;
mod service;

pub use dial::{format_remaining, Dial, TimeField};
pub use engine::{EngineParts, Progress, TimerEngine, TimerPhase};
pub use service::{global, init_global, EngineHandle, ServiceOptions, TimerService, ViewHandle};
