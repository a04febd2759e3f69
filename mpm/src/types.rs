//! Shared data types for the mpm companion.
//!
//! These types cross the wire to the backend or land in the state file, so
//! their serde representation is part of the external contract.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default amount a single keystroke adds to the activity level.
pub const DEFAULT_KEYPRESS: u32 = 1;

/// Per-user tuning of the activity counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    /// Amount added per keystroke, at least 1.
    pub keypress: u32,

    /// When set, a backspace zeroes the activity level.
    pub hard_mode: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            keypress: DEFAULT_KEYPRESS,
            hard_mode: false,
        }
    }
}

impl UserSettings {
    /// Returns a copy with `keypress` clamped to at least 1.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            keypress: self.keypress.max(1),
            ..self
        }
    }
}

/// Session identifier assigned by the backend on the first report.
///
/// The backend has returned both numeric and string ids over time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// The Spotify profile of the signed-in user, as returned by `GET /v1/me`.
///
/// Only `email` is interpreted locally; everything else is carried through
/// to the backend untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpotifyUser {
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One statistics report, as posted to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session_id: Option<SessionId>,
    pub total_time: u64,
    pub music_time: u64,
    pub paused_times: u64,
    pub user: Option<SpotifyUser>,
}
