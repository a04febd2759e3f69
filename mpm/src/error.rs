//! Error types for mpm.
//!
//! Each module owns a focused error enum; [`MpmError`] gathers them for
//! callers that only need to report what went wrong.

use thiserror::Error;

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::player::PlayerError;
use crate::protocol::ProtocolError;
use crate::session::SessionClosed;
use crate::spotify::SpotifyError;
use crate::store::StoreError;
use crate::token::TokenError;

/// Errors that can occur anywhere in mpm.
///
/// # Examples
///
/// ```ignore
/// use mpm::error::Result;
///
/// fn load_state(store: &SettingsStore) -> Result<StoredState> {
///     Ok(store.load()?)
/// }
/// ```
#[derive(Error, Debug)]
pub enum MpmError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Persisted state could not be read or written.
    #[error("state error: {0}")]
    Store(#[from] StoreError),

    /// Credentials are missing, malformed or could not be refreshed.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    /// Spotify Web API failure.
    #[error("Spotify error: {0}")]
    Spotify(#[from] SpotifyError),

    /// Companion backend failure.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Playback worker failure.
    #[error("player error: {0}")]
    Player(#[from] PlayerError),

    /// The editor sent something unreadable.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The session loop has stopped.
    #[error(transparent)]
    SessionClosed(#[from] SessionClosed),

    /// File system or stdio error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for mpm operations.
pub type Result<T> = std::result::Result<T, MpmError>;
