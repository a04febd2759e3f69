//! Music Per Minute - plays music while you type.
//!
//! Every keystroke in the editor tops up an activity level that drains by one
//! each second. While the level is above zero Spotify plays; when it runs out
//! Spotify pauses. Time spent typing and listening is reported to a companion
//! backend once a minute.
//!
//! # Overview
//!
//! The editor extension launches `mpm run` and speaks a JSON-line protocol
//! over stdio (see [`protocol`]). A [`session::Session`] task owns all of the
//! mutable state and hands playback commands to a [`player::Player`] worker,
//! so a slow network never stalls the one-second tick.
//!
//! # Modules
//!
//! - [`activity`]: Activity level arithmetic
//! - [`playback`]: Play/pause transition rule
//! - [`token`]: Spotify credential parsing, expiry and refresh
//! - [`reporter`]: Session statistics and their report
//! - [`session`]: The per-activation loop tying everything together
//! - [`player`]: Background worker issuing Spotify calls
//! - [`spotify`]: Spotify Web API client
//! - [`backend`]: Companion backend client
//! - [`store`]: Persisted credentials, settings and profile
//! - [`protocol`]: Editor stdio protocol
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types
//! - [`types`]: Shared data types

pub mod activity;
pub mod backend;
pub mod config;
pub mod error;
mod http;
pub mod playback;
pub mod player;
pub mod protocol;
pub mod reporter;
pub mod session;
pub mod spotify;
pub mod store;
pub mod token;
pub mod types;

pub use activity::{ActivityCounter, ActivityEvent, LevelChange};
pub use backend::{BackendClient, BackendError};
pub use config::{Config, ConfigError};
pub use error::{MpmError, Result};
pub use playback::{PlaybackCommand, PlaybackController, PlaybackState};
pub use player::{Player, PlayerError, PlayerHandle};
pub use protocol::{EditorMessage, HostMessage, ProtocolError};
pub use reporter::{SessionReporter, SessionStats};
pub use session::{Reporting, Session, SessionConfig, SessionHandle, SessionSummary, StatusUpdate};
pub use spotify::{Device, SpotifyClient, SpotifyError};
pub use store::{SettingsStore, StoreError, StoredState};
pub use token::{TokenError, TokenManager};
pub use types::{SessionId, SessionReport, SpotifyUser, UserSettings};
