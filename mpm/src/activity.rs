//! Activity level tracking.
//!
//! The activity level is a synthetic "typing intensity" counter. Keystrokes
//! raise it, backspaces and the once-per-second decay tick lower it. Every
//! applied event yields exactly one [`LevelChange`], which is the only input
//! the playback controller looks at.

use crate::types::UserSettings;

/// Events that mutate the activity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityEvent {
    /// A character was inserted in the editor.
    Keystroke,
    /// Text was deleted in the editor.
    Backspace,
    /// The one-second idle decay.
    DecayTick,
}

/// The level before and after a single applied event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    pub previous: u32,
    pub current: u32,
}

/// Holds the activity level and the settings that shape how events move it.
#[derive(Debug, Clone)]
pub struct ActivityCounter {
    level: u32,
    settings: UserSettings,
}

impl ActivityCounter {
    /// Creates a counter at level 0.
    #[must_use]
    pub fn new(settings: UserSettings) -> Self {
        Self {
            level: 0,
            settings: settings.normalized(),
        }
    }

    /// Returns the current level.
    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Returns the settings in effect.
    #[must_use]
    pub fn settings(&self) -> UserSettings {
        self.settings
    }

    /// Replaces the keypress increment and hard mode flag.
    pub fn update_settings(&mut self, settings: UserSettings) {
        self.settings = settings.normalized();
    }

    /// Applies one event and reports the resulting transition.
    pub fn apply(&mut self, event: ActivityEvent) -> LevelChange {
        let previous = self.level;

        self.level = match event {
            ActivityEvent::Keystroke => previous.saturating_add(self.settings.keypress),
            ActivityEvent::Backspace if self.settings.hard_mode => 0,
            ActivityEvent::Backspace | ActivityEvent::DecayTick => previous.saturating_sub(1),
        };

        LevelChange {
            previous,
            current: self.level,
        }
    }

    /// Drops the level back to zero.
    pub fn reset(&mut self) {
        self.level = 0;
    }
}
