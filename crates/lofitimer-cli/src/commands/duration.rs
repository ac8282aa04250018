use std::sync::Arc;

use clap::Subcommand;
use lofitimer_core::{Config, Dial, DurationPreference, PropertiesFile};

#[derive(Subcommand)]
pub enum DurationAction {
    /// Print the saved session length
    Get {
        /// Print whole seconds instead of HH:MM:SS
        #[arg(long)]
        secs: bool,
    },
    /// Save a new session length
    Set {
        /// Seconds, or HH:MM:SS / MM:SS
        value: String,
    },
}

pub fn run(action: DurationAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let store = Arc::new(PropertiesFile::new(config.properties_path()?));
    let preference = DurationPreference::new(store, config.timer.default_duration_secs);

    match action {
        DurationAction::Get { secs } => {
            let saved = preference.get();
            if secs {
                println!("{saved}");
            } else {
                println!("{}", Dial::from_secs(u64::from(saved)));
            }
        }
        DurationAction::Set { value } => {
            let secs = parse_duration(&value)?;
            preference.set(secs);
            println!("{}", Dial::from_secs(u64::from(secs)));
        }
    }
    Ok(())
}

/// Accepts `SECS`, `MM:SS` or `HH:MM:SS`.
pub fn parse_duration(value: &str) -> Result<u32, String> {
    let invalid = || format!("invalid duration '{value}', expected SECS or HH:MM:SS");
    let parts = value
        .trim()
        .split(':')
        .map(|p| p.trim().parse::<u32>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;
    let (h, m, s) = match parts[..] {
        [s] => (0, 0, s),
        [m, s] => (0, m, s),
        [h, m, s] => (h, m, s),
        _ => return Err(invalid()),
    };
    h.checked_mul(3600)
        .and_then(|h| m.checked_mul(60).and_then(|m| h.checked_add(m)))
        .and_then(|hm| hm.checked_add(s))
        .ok_or_else(invalid)
}
