//! Persisted application state.
//!
//! A small JSON document holding the directory access tokens (keyed by fixed
//! names) and the "first launch" flag. Reads never fail: a missing or corrupt
//! file is treated as empty state.

use crate::atomic::{atomic_read_json, atomic_write_json};
use crate::config::AppStateConfig;
use crate::error::{Result, SignatureError};
use crate::platform;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// The JSON root object.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct AppStateData {
    #[serde(default)]
    bookmarks: BTreeMap<String, String>,
    #[serde(default, rename = "HasLaunchedBefore")]
    has_launched_before: bool,
}

/// Manages the application state file.
pub struct AppStateStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl AppStateStore {
    /// Create a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Create a store at the platform's default location.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(platform::app_state_path()?))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the token stored under `key`.
    pub fn bookmark(&self, key: &str) -> Option<String> {
        self.load_data().bookmarks.get(key).cloned()
    }

    /// Store `token` under `key`, replacing any previous token.
    pub fn set_bookmark(&self, key: &str, token: &str) -> Result<()> {
        self.modify(|data| {
            data.bookmarks.insert(key.to_string(), token.to_string());
        })
    }

    /// Remove the token stored under `key`.
    pub fn remove_bookmark(&self, key: &str) -> Result<()> {
        self.modify(|data| {
            data.bookmarks.remove(key);
        })
    }

    /// Whether the application has never been launched with this state file.
    pub fn is_first_launch(&self) -> bool {
        !self.load_data().has_launched_before
    }

    /// Report whether this is the first launch and record that it happened.
    pub fn take_first_launch(&self) -> Result<bool> {
        let first = self.is_first_launch();
        if first {
            debug!("First launch, recording {}", AppStateConfig::FIRST_LAUNCH_KEY);
            self.modify(|data| data.has_launched_before = true)?;
        }
        Ok(first)
    }

    fn modify(&self, f: impl FnOnce(&mut AppStateData)) -> Result<()> {
        let _guard = self.write_lock.lock().map_err(|e| {
            SignatureError::Other(format!("Application state lock poisoned: {}", e))
        })?;
        let mut data = self.load_data();
        f(&mut data);
        atomic_write_json(&self.path, &data)
    }

    /// Read state, returning empty state on any error.
    fn load_data(&self) -> AppStateData {
        match atomic_read_json::<AppStateData>(&self.path) {
            Ok(Some(data)) => data,
            Ok(None) => AppStateData::default(),
            Err(e) => {
                warn!(
                    "Failed to read application state at {}: {}",
                    self.path.display(),
                    e
                );
                AppStateData::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bookmark_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = AppStateStore::new(tmp.path().join("state.json"));

        assert!(store.bookmark("key").is_none());
        store.set_bookmark("key", "abcd").unwrap();
        assert_eq!(store.bookmark("key").as_deref(), Some("abcd"));

        store.remove_bookmark("key").unwrap();
        assert!(store.bookmark("key").is_none());
    }

    #[test]
    fn test_first_launch_flag_flips_once() {
        let tmp = TempDir::new().unwrap();
        let store = AppStateStore::new(tmp.path().join("state.json"));

        assert!(store.take_first_launch().unwrap());
        assert!(!store.take_first_launch().unwrap());
        assert!(!store.is_first_launch());
    }

    #[test]
    fn test_corrupt_state_reads_as_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = AppStateStore::new(&path);
        assert!(store.is_first_launch());
        store.set_bookmark("key", "ff").unwrap();
        assert_eq!(store.bookmark("key").as_deref(), Some("ff"));
    }
}
