mod config;
pub mod ledger;
pub mod preference;
pub mod properties;

pub use config::{AlertConfig, Config, StorageConfig, TimerConfig};
pub use ledger::{DailyUsageRecord, UsageLedger, RETENTION_DAYS};
pub use preference::{DurationPreference, DURATION_KEY};
pub use properties::{KvStore, MemoryStore, Properties, PropertiesFile};

use std::path::PathBuf;

use crate::error::StorageError;

/// File name of the properties store holding the preference and the ledger.
pub const PROPERTIES_FILE_NAME: &str = "pomodoro.properties";

/// Returns the data directory, creating it if needed.
///
/// `LOFITIMER_DATA_DIR` wins when set. Otherwise `~/.config/lofitimer[-dev]/`
/// based on `LOFITIMER_ENV` (set it to `dev` for a development directory).
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, StorageError> {
    let dir = match std::env::var_os("LOFITIMER_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("LOFITIMER_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("lofitimer-dev")
            } else {
                base_dir.join("lofitimer")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| StorageError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
