//! Durable key-value state for mpm.
//!
//! Everything that must survive a restart lives in a single JSON file in the
//! state directory (`~/.mpm/` by default):
//!
//! - `api_key`: Spotify access token
//! - `refresh_key`: Spotify refresh token
//! - `expires`: access token expiry, epoch seconds
//! - `settings`: `{ keypress, hardMode }`
//! - `user`: cached Spotify profile
//!
//! The file is written with mode 0600 on Unix since it holds credentials.
//!
//! # Example
//!
//! ```no_run
//! use mpm::store::SettingsStore;
//! use std::path::Path;
//!
//! let store = SettingsStore::new(Path::new("/home/user/.mpm"));
//! let mut state = store.load().unwrap();
//! state.api_key = Some("token".to_string());
//! store.save(&state).unwrap();
//! ```

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::types::{SpotifyUser, UserSettings};

/// State filename inside the state directory.
const STATE_FILE: &str = "state.json";

/// Scratch file a new state is written to before being renamed into place.
const STATE_TMP_FILE: &str = "state.json.tmp";

/// Errors that can occur while reading or writing the state file.
#[derive(Error, Debug)]
pub enum StoreError {
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The state file is not valid JSON.
    #[error("corrupt state file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Contents of the state file. Every entry is optional; a missing file reads
/// as the default (empty) state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<UserSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<SpotifyUser>,
}

impl StoredState {
    /// Returns true when both halves of the Spotify credentials are present.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some() && self.refresh_key.is_some()
    }
}

/// Reads and writes [`StoredState`] under a directory.
///
/// Clones share one write lock, so `update` calls from different tasks never
/// lose each other's fields. Writes go through a rename, so readers see
/// either the old file or the new one.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl SettingsStore {
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guarded data is `()`, so a poisoned lock carries no bad state.
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    /// Loads the state, treating a missing file as empty.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` when the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<StoredState, StoreError> {
        match fs::read_to_string(self.path()) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path().display(), "No state file, starting empty");
                Ok(StoredState::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the state, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the directory or file cannot be written.
    pub fn save(&self, state: &StoredState) -> Result<(), StoreError> {
        let _guard = self.lock();
        self.write(state)
    }

    fn write(&self, state: &StoredState) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;

        let tmp = self.dir.join(STATE_TMP_FILE);
        let body = serde_json::to_vec_pretty(state)?;
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&body)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        drop(file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&tmp)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&tmp, perms)?;
        }

        fs::rename(&tmp, self.path())?;
        Ok(())
    }

    /// Loads, applies `f`, and saves in one step.
    ///
    /// # Errors
    ///
    /// Propagates load and save failures.
    pub fn update<F>(&self, f: F) -> Result<StoredState, StoreError>
    where
        F: FnOnce(&mut StoredState),
    {
        let _guard = self.lock();
        let mut state = self.load()?;
        f(&mut state);
        self.write(&state)?;
        Ok(state)
    }

    /// Deletes the state file. Missing files are not an error.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.lock();
        match fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_empty_state() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path());
        assert_eq!(store.load().unwrap(), StoredState::default());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(&dir.path().join("nested"));

        let state = StoredState {
            api_key: Some("access".to_string()),
            refresh_key: Some("refresh".to_string()),
            expires: Some(1_700_000_000),
            settings: Some(UserSettings {
                keypress: 2,
                hard_mode: true,
            }),
            user: None,
        };
        store.save(&state).unwrap();

        assert_eq!(store.load().unwrap(), state);
        assert!(state.has_credentials());
    }

    #[test]
    fn file_uses_flat_key_layout() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path());
        store
            .update(|s| {
                s.api_key = Some("a".to_string());
                s.expires = Some(10);
            })
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["api_key"], "a");
        assert_eq!(raw["expires"], 10);
        assert!(raw.get("refresh_key").is_none());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path());
        fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(store.load(), Err(StoreError::Json(_))));
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path());
        store.save(&StoredState::default()).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn save_leaves_no_scratch_file() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path());
        store.save(&StoredState::default()).unwrap();

        assert!(store.path().exists());
        assert!(!dir.path().join(STATE_TMP_FILE).exists());
    }

    #[test]
    fn concurrent_updates_keep_each_others_fields() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store
                            .update(|s| {
                                if i % 2 == 0 {
                                    s.expires = Some(s.expires.unwrap_or(0) + 1);
                                } else {
                                    let keypress = s.settings.map_or(0, |st| st.keypress);
                                    s.settings = Some(UserSettings {
                                        keypress: keypress + 1,
                                        hard_mode: false,
                                    });
                                }
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let state = store.load().unwrap();
        assert_eq!(state.expires, Some(100));
        assert_eq!(state.settings.map(|s| s.keypress), Some(100));
    }

    #[cfg(unix)]
    #[test]
    fn save_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path());
        store.save(&StoredState::default()).unwrap();

        let perms = fs::metadata(store.path()).unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o600);
    }
}
