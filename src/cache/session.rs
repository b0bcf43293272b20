//! Session-scoped storage for the raw cache snapshot
//!
//! The session store is the second tier behind the in-memory cache. It holds
//! the snapshot string written by `initialize` so a later process (a reload)
//! can answer from it without fetching again.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from a session store
#[derive(Debug, Error)]
pub enum SessionError {
    /// No storage location could be determined
    #[error("Session storage is unavailable")]
    Unavailable,

    /// Reading or writing the backing file failed
    #[error("Session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The stored record could not be encoded or decoded
    #[error("Session record is not valid JSON: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The key cannot be used as a file name
    #[error("Invalid session key: '{0}'")]
    InvalidKey(String),
}

/// Key/value store scoped to a browsing session
pub trait SessionStore: Send + Sync {
    /// Returns the value stored under `key`, if any
    fn get(&self, key: &str) -> Result<Option<String>, SessionError>;

    /// Stores `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;

    /// Removes the value stored under `key`
    fn remove(&self, key: &str) -> Result<(), SessionError>;
}

/// Session store kept in process memory
#[derive(Debug, Default)]
pub struct MemorySession {
    items: Mutex<HashMap<String, String>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySession {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        let items = self.items.lock().map_err(|_| SessionError::Unavailable)?;
        Ok(items.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let mut items = self.items.lock().map_err(|_| SessionError::Unavailable)?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        let mut items = self.items.lock().map_err(|_| SessionError::Unavailable)?;
        items.remove(key);
        Ok(())
    }
}

/// Stored form of a session value on disk
#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    /// The stored value
    value: String,
    /// When the value was written
    saved_at: DateTime<Utc>,
}

/// Session store persisted as JSON files in a directory
///
/// Uses `~/.cache/hydrate-cache/session/` on Linux, or the equivalent XDG path
/// on other platforms. Each key maps to one `<key>.json` file.
#[derive(Debug, Clone)]
pub struct FileSession {
    /// Directory where session files are stored
    dir: PathBuf,
}

impl FileSession {
    /// Creates a FileSession in the XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "hydrate-cache")?;
        let dir = project_dirs.cache_dir().join("session");
        Some(Self { dir })
    }

    /// Creates a FileSession rooted at a custom directory
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Checks that `key` names a file directly inside the session directory
    pub fn validate_key(key: &str) -> Result<(), SessionError> {
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && !key.contains('/')
            && !key.contains('\\');
        if valid {
            Ok(())
        } else {
            Err(SessionError::InvalidKey(key.to_string()))
        }
    }

    /// Returns the path to the file for the given key
    fn path(&self, key: &str) -> Result<PathBuf, SessionError> {
        Self::validate_key(key)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl SessionStore for FileSession {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        let path = self.path(key)?;
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)?;
        let record: SessionRecord = serde_json::from_str(&content)?;
        tracing::debug!(key, saved_at = %record.saved_at, "session value read");
        Ok(Some(record.value))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let path = self.path(key)?;
        fs::create_dir_all(&self.dir)?;

        let record = SessionRecord {
            value: value.to_string(),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&record)?;

        fs::write(path, json)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        match fs::remove_file(self.path(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
