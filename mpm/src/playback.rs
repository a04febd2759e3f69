//! Play/pause decisions driven by activity level transitions.
//!
//! The controller is edge-triggered rather than "nonzero means playing":
//!
//! | previous | current            | decision  |
//! |----------|--------------------|-----------|
//! | 0        | 0                  | none      |
//! | p        | c > 0, p < c       | play      |
//! | p > 0    | 0                  | pause     |
//! | p        | c > 0, p >= c      | none      |
//!
//! A decision for the state already held is dropped, so repeated bursts do
//! not re-issue `play` and an idle counter does not re-issue `pause`.

use crate::activity::LevelChange;

/// What the remote player was last told to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    Playing,
    #[default]
    Paused,
}

/// A remote call the controller wants issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackCommand {
    Play,
    Pause,
}

impl PlaybackCommand {
    /// The state the player is in once this command has been issued.
    #[must_use]
    pub fn target_state(self) -> PlaybackState {
        match self {
            Self::Play => PlaybackState::Playing,
            Self::Pause => PlaybackState::Paused,
        }
    }
}

/// Tracks [`PlaybackState`] and turns level changes into commands.
#[derive(Debug, Default)]
pub struct PlaybackController {
    state: PlaybackState,
}

impl PlaybackController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Evaluates a level change and returns the command to issue, if any.
    ///
    /// The state flips as soon as a command is returned. Whether the remote
    /// call later succeeds does not matter; the next transition corrects a
    /// missed call.
    pub fn on_level_change(&mut self, change: LevelChange) -> Option<PlaybackCommand> {
        let LevelChange { previous, current } = change;

        let wanted = if current == 0 && previous == 0 {
            None
        } else if current > 0 && previous < current {
            Some(PlaybackCommand::Play)
        } else if current == 0 && current < previous {
            Some(PlaybackCommand::Pause)
        } else {
            None
        }?;

        self.transition(wanted)
    }

    /// Returns a pause command when playing, for teardown.
    pub fn force_pause(&mut self) -> Option<PlaybackCommand> {
        self.transition(PlaybackCommand::Pause)
    }

    fn transition(&mut self, command: PlaybackCommand) -> Option<PlaybackCommand> {
        let target = command.target_state();
        if self.state == target {
            return None;
        }
        self.state = target;
        Some(command)
    }
}
