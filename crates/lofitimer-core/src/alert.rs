//! Completion alert collaborator.
//!
//! Alerts are fire-and-forget. The engine logs any error they return and
//! carries on with the phase transition.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::error::AlertError;
use crate::storage::AlertConfig;

/// Something that can announce a finished session.
pub trait Alert: Send {
    fn play_alert(&self) -> Result<(), AlertError>;
}

/// Does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentAlert;

impl Alert for SilentAlert {
    fn play_alert(&self) -> Result<(), AlertError> {
        Ok(())
    }
}

/// Rings the terminal bell on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct BellAlert;

impl Alert for BellAlert {
    fn play_alert(&self) -> Result<(), AlertError> {
        let mut err = std::io::stderr();
        err.write_all(b"\x07")
            .and_then(|_| err.flush())
            .map_err(|e| AlertError::Playback(e.to_string()))
    }
}

/// Hands a sound file to an external player without waiting for it.
#[derive(Debug, Clone)]
pub struct SoundFileAlert {
    player: String,
    sound_path: PathBuf,
}

impl SoundFileAlert {
    pub fn new(player: impl Into<String>, sound_path: impl Into<PathBuf>) -> Self {
        Self {
            player: player.into(),
            sound_path: sound_path.into(),
        }
    }
}

impl Alert for SoundFileAlert {
    fn play_alert(&self) -> Result<(), AlertError> {
        if !self.sound_path.exists() {
            return Err(AlertError::MissingAsset(self.sound_path.clone()));
        }
        // The child is not awaited.
        Command::new(&self.player)
            .arg(&self.sound_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|source| AlertError::PlayerFailed {
                player: self.player.clone(),
                source,
            })
    }
}

/// Build the alert described by `config`.
pub fn from_config(config: &AlertConfig) -> Box<dyn Alert> {
    if !config.enabled {
        return Box::new(SilentAlert);
    }
    match (&config.player, &config.sound_path) {
        (Some(player), Some(path)) => Box::new(SoundFileAlert::new(player.clone(), path.clone())),
        _ => Box::new(BellAlert),
    }
}
