//! Line-oriented `key=value` store.
//!
//! The on-disk format is deliberately small:
//!
//! ```text
//! # lofitimer
//! pomodoro_duration_seconds=1500
//! session.2024-03-09=50,2
//! ```
//!
//! Blank lines and lines starting with `#` or `!` are ignored, whitespace
//! around keys and values is trimmed, and lines without a `=` (or `:`) are
//! skipped. Entries are written back sorted by key.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StorageError;

/// Parsed contents of a properties store.
pub type Properties = BTreeMap<String, String>;

const HEADER: &str = "# lofitimer";

/// Persisted key/value store abstraction.
///
/// Implementations must treat a missing backing resource as empty.
pub trait KvStore: Send + Sync {
    fn load(&self) -> Result<Properties, StorageError>;
    fn store(&self, props: &Properties) -> Result<(), StorageError>;
}

/// Parse properties text. Malformed lines are dropped.
pub fn parse(content: &str) -> Properties {
    let mut props = Properties::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let Some(idx) = line.find(['=', ':']) else {
            continue;
        };
        let key = line[..idx].trim();
        if key.is_empty() {
            continue;
        }
        props.insert(key.to_string(), line[idx + 1..].trim().to_string());
    }
    props
}

/// Render properties to text, one entry per line.
pub fn render(props: &Properties) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    for (key, value) in props {
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// File-backed store.
#[derive(Debug, Clone)]
pub struct PropertiesFile {
    path: PathBuf,
}

impl PropertiesFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KvStore for PropertiesFile {
    fn load(&self) -> Result<Properties, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(parse(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Properties::new()),
            Err(source) => Err(StorageError::ReadFailed {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn store(&self, props: &Properties) -> Result<(), StorageError> {
        let write_failed = |source| StorageError::WriteFailed {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(write_failed)?;
            }
        }
        std::fs::write(&self.path, render(props)).map_err(write_failed)
    }
}

/// In-process store, mainly for tests and embedding without a disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    props: Mutex<Properties>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(props: Properties) -> Self {
        Self {
            props: Mutex::new(props),
        }
    }

    /// Copy of the current contents.
    pub fn contents(&self) -> Properties {
        self.props.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl KvStore for MemoryStore {
    fn load(&self) -> Result<Properties, StorageError> {
        self.props
            .lock()
            .map(|p| p.clone())
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }

    fn store(&self, props: &Properties) -> Result<(), StorageError> {
        let mut guard = self
            .props
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        *guard = props.clone();
        Ok(())
    }
}
