//! Configuration module for mpm.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `MPM_BACKEND_URL` | No | `https://mpm-node-backend.herokuapp.com` | Companion backend |
//! | `MPM_SPOTIFY_API_URL` | No | `https://api.spotify.com` | Spotify Web API |
//! | `MPM_AUTH_URL` | No | `https://ciavarella.dev/auth/login` | Authorization page opened by `mpm login` |
//! | `MPM_STATE_DIR` | No | `~/.mpm` | Directory holding `state.json` |
//! | `MPM_KEYPRESS` | No | 1 | Activity added per keystroke |
//! | `MPM_HARD_MODE` | No | false | Backspace zeroes the activity level |
//! | `MPM_REPORT_INTERVAL_SECS` | No | 60 | Seconds between session reports |
//!
//! Keypress and hard mode here are only the local defaults; settings saved
//! on the backend take precedence.
//!
//! # Example
//!
//! ```no_run
//! use mpm::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Backend: {}", config.backend_url);
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use directories::BaseDirs;
use thiserror::Error;

use crate::types::UserSettings;

/// Default companion backend.
const DEFAULT_BACKEND_URL: &str = "https://mpm-node-backend.herokuapp.com";

/// Default Spotify Web API base.
const DEFAULT_SPOTIFY_API_URL: &str = "https://api.spotify.com";

/// Default authorization page.
const DEFAULT_AUTH_URL: &str = "https://ciavarella.dev/auth/login";

/// Default state directory name relative to home.
const DEFAULT_STATE_DIR: &str = ".mpm";

/// Default seconds between session reports.
const DEFAULT_REPORT_INTERVAL_SECS: u64 = 60;

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,
}

/// Configuration for mpm.
#[derive(Debug, Clone)]
pub struct Config {
    /// Companion backend base URL.
    pub backend_url: String,

    /// Spotify Web API base URL.
    pub spotify_api_url: String,

    /// Authorization page the user pastes their token from.
    pub auth_url: String,

    /// Directory holding the persisted state.
    pub state_dir: PathBuf,

    /// Local default settings, used until the backend says otherwise.
    pub settings: UserSettings,

    /// Interval between session reports.
    pub report_interval: Duration,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `MPM_KEYPRESS` or `MPM_REPORT_INTERVAL_SECS` is not a positive integer
    /// - `MPM_HARD_MODE` is not a boolean
    /// - `MPM_STATE_DIR` is unset and the home directory cannot be determined
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend_url =
            env::var("MPM_BACKEND_URL").unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string());

        let spotify_api_url = env::var("MPM_SPOTIFY_API_URL")
            .unwrap_or_else(|_| DEFAULT_SPOTIFY_API_URL.to_string());

        let auth_url = env::var("MPM_AUTH_URL").unwrap_or_else(|_| DEFAULT_AUTH_URL.to_string());

        // Only touch the home directory when no override is given.
        let state_dir = match env::var("MPM_STATE_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => {
                let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
                base_dirs.home_dir().join(DEFAULT_STATE_DIR)
            }
        };

        let keypress = match env::var("MPM_KEYPRESS") {
            Ok(val) => parse_positive("MPM_KEYPRESS", &val)?,
            Err(_) => crate::types::DEFAULT_KEYPRESS,
        };

        let hard_mode = match env::var("MPM_HARD_MODE") {
            Ok(val) => parse_bool("MPM_HARD_MODE", &val)?,
            Err(_) => false,
        };

        let report_interval_secs = match env::var("MPM_REPORT_INTERVAL_SECS") {
            Ok(val) => u64::from(parse_positive("MPM_REPORT_INTERVAL_SECS", &val)?),
            Err(_) => DEFAULT_REPORT_INTERVAL_SECS,
        };

        Ok(Self {
            backend_url,
            spotify_api_url,
            auth_url,
            state_dir,
            settings: UserSettings {
                keypress,
                hard_mode,
            },
            report_interval: Duration::from_secs(report_interval_secs),
        })
    }
}

fn parse_positive(key: &str, val: &str) -> Result<u32, ConfigError> {
    let n = val
        .trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected positive integer, got '{val}'"),
        })?;
    if n == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than 0".to_string(),
        });
    }
    Ok(n)
}

fn parse_bool(key: &str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected true or false, got '{val}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to run tests with isolated environment variables.
    /// Clears all MPM_* vars before the test and restores them after.
    fn with_clean_env<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let saved_vars: Vec<(String, String)> =
            env::vars().filter(|(k, _)| k.starts_with("MPM_")).collect();

        for (key, _) in &saved_vars {
            env::remove_var(key);
        }

        let result = f();

        for (key, _) in env::vars().filter(|(k, _)| k.starts_with("MPM_")) {
            env::remove_var(key);
        }
        for (key, value) in saved_vars {
            env::set_var(key, value);
        }

        result
    }

    #[test]
    #[serial]
    fn test_defaults() {
        with_clean_env(|| {
            env::set_var("MPM_STATE_DIR", "/tmp/mpm-test");

            let config = Config::from_env().expect("should parse defaults");

            assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
            assert_eq!(config.spotify_api_url, DEFAULT_SPOTIFY_API_URL);
            assert_eq!(config.auth_url, DEFAULT_AUTH_URL);
            assert_eq!(config.state_dir, PathBuf::from("/tmp/mpm-test"));
            assert_eq!(config.settings, UserSettings::default());
            assert_eq!(config.report_interval, Duration::from_secs(60));
        });
    }

    #[test]
    #[serial]
    fn test_default_state_dir_under_home() {
        with_clean_env(|| {
            let config = Config::from_env().expect("should parse defaults");
            assert!(config.state_dir.ends_with(DEFAULT_STATE_DIR));
        });
    }

    #[test]
    #[serial]
    fn test_full_config() {
        with_clean_env(|| {
            env::set_var("MPM_BACKEND_URL", "http://localhost:3000");
            env::set_var("MPM_SPOTIFY_API_URL", "http://localhost:4000");
            env::set_var("MPM_AUTH_URL", "http://localhost:3000/login");
            env::set_var("MPM_STATE_DIR", "/custom/state");
            env::set_var("MPM_KEYPRESS", "3");
            env::set_var("MPM_HARD_MODE", "true");
            env::set_var("MPM_REPORT_INTERVAL_SECS", "15");

            let config = Config::from_env().expect("should parse full config");

            assert_eq!(config.backend_url, "http://localhost:3000");
            assert_eq!(config.spotify_api_url, "http://localhost:4000");
            assert_eq!(config.auth_url, "http://localhost:3000/login");
            assert_eq!(config.state_dir, PathBuf::from("/custom/state"));
            assert_eq!(
                config.settings,
                UserSettings {
                    keypress: 3,
                    hard_mode: true
                }
            );
            assert_eq!(config.report_interval, Duration::from_secs(15));
        });
    }

    #[test]
    #[serial]
    fn test_zero_keypress_rejected() {
        with_clean_env(|| {
            env::set_var("MPM_STATE_DIR", "/tmp/mpm-test");
            env::set_var("MPM_KEYPRESS", "0");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, ref message }
                    if key == "MPM_KEYPRESS" && message.contains("greater than 0")
            ));
        });
    }

    #[test]
    #[serial]
    fn test_invalid_hard_mode_rejected() {
        with_clean_env(|| {
            env::set_var("MPM_STATE_DIR", "/tmp/mpm-test");
            env::set_var("MPM_HARD_MODE", "maybe");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, .. } if key == "MPM_HARD_MODE"
            ));
        });
    }

    #[test]
    #[serial]
    fn test_invalid_report_interval_rejected() {
        with_clean_env(|| {
            env::set_var("MPM_STATE_DIR", "/tmp/mpm-test");
            env::set_var("MPM_REPORT_INTERVAL_SECS", "soon");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, .. } if key == "MPM_REPORT_INTERVAL_SECS"
            ));
        });
    }

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("K", "TRUE").unwrap());
        assert!(parse_bool("K", "1").unwrap());
        assert!(!parse_bool("K", "off").unwrap());
    }
}
