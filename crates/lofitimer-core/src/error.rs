//! Core error types for lofitimer-core.
//!
//! Nothing in here is fatal to the process. Invalid commands are not errors
//! at all (the engine treats them as no-ops); these types describe the
//! peripheral failures that callers may want to report.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for lofitimer-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Persisted key/value store errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Alert playback errors
    #[error("Alert error: {0}")]
    Alert(#[from] AlertError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The control task that owns the engine is gone
    #[error("Timer service is no longer running")]
    ServiceClosed,

    /// No async runtime to host the timer service
    #[error("Timer service needs a tokio runtime: {0}")]
    Runtime(String),
}

/// Errors raised by a [`KvStore`](crate::storage::KvStore).
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to read the backing file
    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write the backing file
    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),

    /// Store refused the operation (used by in-memory and test stores)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
}

/// Alert collaborator errors. Always logged and swallowed by the engine.
#[derive(Error, Debug)]
pub enum AlertError {
    /// The configured sound asset does not exist
    #[error("Alert sound not found: {0}")]
    MissingAsset(PathBuf),

    /// The player process could not be spawned
    #[error("Failed to launch alert player '{player}': {source}")]
    PlayerFailed {
        player: String,
        #[source]
        source: std::io::Error,
    },

    /// Any other playback failure
    #[error("Alert playback failed: {0}")]
    Playback(String),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
