//! Background worker that talks to Spotify.
//!
//! The session loop never waits on the network. It hands [`PlaybackCommand`]s
//! to a [`PlayerHandle`], and a worker task applies them in order, making
//! sure the access token is valid before each call. A 401 gets exactly one
//! token refresh and one retry. Anything else is logged and dropped.
//!
//! # Example
//!
//! ```no_run
//! use mpm::player::Player;
//! use mpm::playback::PlaybackCommand;
//! # fn example(player: Player) {
//! let handle = player.spawn(true);
//! handle.submit(PlaybackCommand::Play);
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::playback::PlaybackCommand;
use crate::spotify::{SpotifyClient, SpotifyError};
use crate::token::{TokenError, TokenManager};
use crate::types::SpotifyUser;

/// Capacity of the command channel between the session loop and the worker.
pub const COMMAND_BUFFER: usize = 32;

/// How long to give a freshly launched desktop client to register a device.
const DEVICE_WAKE_DELAY_SECS: u64 = 3;

/// Errors from a single player operation.
#[derive(Error, Debug)]
pub enum PlayerError {
    /// No valid access token could be obtained.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The Spotify call itself failed.
    #[error(transparent)]
    Spotify(#[from] SpotifyError),

    /// Spotify reports no playback device even after launching the client.
    #[error("no Spotify playback device available")]
    NoDevice,
}

/// Owns the credentials and the Spotify client.
#[derive(Debug)]
pub struct Player {
    tokens: TokenManager,
    spotify: SpotifyClient,
}

impl Player {
    #[must_use]
    pub fn new(tokens: TokenManager, spotify: SpotifyClient) -> Self {
        Self { tokens, spotify }
    }

    /// Issues one play or pause call.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError` if no token could be obtained or the call failed
    /// (after at most one refresh-and-retry on 401).
    pub async fn execute(&mut self, command: PlaybackCommand) -> Result<(), PlayerError> {
        let token = self.tokens.ensure_valid().await?;

        match self.call(command, &token).await {
            Err(SpotifyError::Unauthorized) => {
                warn!(?command, "Access token rejected, refreshing once");
                let token = self.tokens.force_refresh().await?;
                self.call(command, &token).await?;
            }
            result => result?,
        }

        debug!(?command, "Playback command applied");
        Ok(())
    }

    async fn call(&self, command: PlaybackCommand, token: &str) -> Result<(), SpotifyError> {
        match command {
            PlaybackCommand::Play => self.spotify.play(token).await,
            PlaybackCommand::Pause => self.spotify.pause(token).await,
        }
    }

    /// Fetches the signed-in user's profile. Any rejection (401 or another
    /// non-2xx status) gets one refresh and one retry.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError` if the profile cannot be fetched.
    pub async fn current_user(&mut self) -> Result<SpotifyUser, PlayerError> {
        let token = self.tokens.ensure_valid().await?;

        match self.spotify.current_user(&token).await {
            Err(e @ (SpotifyError::Unauthorized | SpotifyError::Api { .. })) => {
                info!(error = %e, "Stored access token rejected, refreshing");
                let token = self.tokens.force_refresh().await?;
                Ok(self.spotify.current_user(&token).await?)
            }
            result => Ok(result?),
        }
    }

    /// Makes sure Spotify has an active playback device.
    ///
    /// With no devices at all the desktop client is launched once. When the
    /// first device is idle, playback is transferred to it.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::NoDevice` if no device shows up, other variants
    /// for token or API failures.
    pub async fn prepare_device(&mut self) -> Result<(), PlayerError> {
        let token = self.tokens.ensure_valid().await?;
        let mut devices = self.spotify.devices(&token).await?;

        if devices.is_empty() {
            launch_desktop_client();
            tokio::time::sleep(Duration::from_secs(DEVICE_WAKE_DELAY_SECS)).await;
            devices = self.spotify.devices(&token).await?;
        }

        let device = devices.first().ok_or(PlayerError::NoDevice)?;
        if device.is_active {
            debug!(device = %device.name, "Playback device already active");
            return Ok(());
        }

        match &device.id {
            Some(id) => {
                info!(device = %device.name, "Activating playback device");
                self.spotify.transfer_playback(&token, id).await?;
            }
            None => warn!(device = %device.name, "Inactive device has no id, cannot activate"),
        }
        Ok(())
    }

    /// Validates the token, prepares a device and pauses playback so the
    /// session starts from a known state. Failures are logged.
    pub async fn startup(&mut self) {
        if let Err(e) = self.current_user().await {
            warn!(error = %e, "Could not validate Spotify access");
        }
        if let Err(e) = self.prepare_device().await {
            warn!(error = %e, "Could not prepare a playback device");
        }
        if let Err(e) = self.execute(PlaybackCommand::Pause).await {
            warn!(error = %e, "Initial pause failed");
        }
    }

    /// Moves the player onto a background task.
    ///
    /// When `startup` is set, [`startup`](Self::startup) runs first; commands
    /// submitted meanwhile queue up behind it.
    #[must_use]
    pub fn spawn(mut self, startup: bool) -> PlayerHandle {
        let (tx, mut rx) = mpsc::channel::<PlaybackCommand>(COMMAND_BUFFER);

        let task = tokio::spawn(async move {
            if startup {
                self.startup().await;
            }
            while let Some(command) = rx.recv().await {
                if let Err(e) = self.execute(command).await {
                    warn!(?command, error = %e, "Playback command failed");
                }
            }
            debug!("Player worker stopped");
        });

        PlayerHandle {
            tx,
            task: Some(task),
        }
    }
}

/// Sending side of a player worker.
#[derive(Debug)]
pub struct PlayerHandle {
    tx: mpsc::Sender<PlaybackCommand>,
    task: Option<JoinHandle<()>>,
}

impl PlayerHandle {
    /// A handle with no worker behind it; commands land on the returned
    /// receiver instead.
    #[must_use]
    pub fn detached(capacity: usize) -> (Self, mpsc::Receiver<PlaybackCommand>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, task: None }, rx)
    }

    /// Queues a command without waiting. Returns `false` if it was dropped.
    pub fn submit(&self, command: PlaybackCommand) -> bool {
        match self.tx.try_send(command) {
            Ok(()) => true,
            Err(e) => {
                warn!(?command, error = %e, "Dropping playback command");
                false
            }
        }
    }

    /// Closes the channel and waits up to `timeout` for queued commands.
    pub async fn shutdown(self, timeout: Duration) {
        let Self { tx, task } = self;
        drop(tx);

        let Some(mut task) = task else {
            return;
        };

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Player worker panicked"),
            Err(_) => {
                warn!("Timeout waiting for player worker, aborting");
                task.abort();
            }
        }
    }
}

/// Starts the Spotify desktop client, if this platform has a known way to.
fn launch_desktop_client() {
    let Some(mut command) = desktop_client_command() else {
        warn!("Don't know how to launch Spotify on this platform");
        return;
    };

    info!("No playback device found, launching Spotify");
    if let Err(e) = command.spawn() {
        warn!(error = %e, "Failed to launch Spotify");
    }
}

fn desktop_client_command() -> Option<Command> {
    if cfg!(target_os = "macos") {
        let mut command = Command::new("open");
        command.args(["-a", "spotify"]);
        Some(command)
    } else if cfg!(target_os = "windows") {
        let appdata = std::env::var_os("APPDATA")?;
        let exe = PathBuf::from(appdata).join("Spotify").join("Spotify.exe");
        Some(Command::new(exe))
    } else if cfg!(target_os = "linux") {
        Some(Command::new("spotify"))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn detached_handle_forwards_commands() {
        let (handle, mut rx) = PlayerHandle::detached(4);
        assert!(handle.submit(PlaybackCommand::Play));
        assert!(handle.submit(PlaybackCommand::Pause));

        assert_eq!(rx.recv().await, Some(PlaybackCommand::Play));
        assert_eq!(rx.recv().await, Some(PlaybackCommand::Pause));
    }

    #[tokio::test]
    async fn submit_reports_full_channel() {
        let (handle, _rx) = PlayerHandle::detached(1);
        assert!(handle.submit(PlaybackCommand::Play));
        assert!(!handle.submit(PlaybackCommand::Pause));
    }

    #[tokio::test]
    async fn shutdown_closes_detached_channel() {
        let (handle, mut rx) = PlayerHandle::detached(1);
        handle.shutdown(Duration::from_millis(10)).await;
        assert_eq!(rx.recv().await, None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_launches_spotify_binary() {
        let command = desktop_client_command().unwrap();
        assert_eq!(command.as_std().get_program(), "spotify");
    }
}
