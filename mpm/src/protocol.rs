//! Line protocol between the editor extension and `mpm run`.
//!
//! The editor writes one JSON object per line to stdin and reads one JSON
//! object per line from stdout. Both directions are tagged by `type`.
//!
//! Editor to mpm:
//!
//! ```text
//! {"type":"change","text":"a"}                        keystroke
//! {"type":"change","text":""}                         backspace
//! {"type":"configuration","keypress":2,"hardMode":true}
//! {"type":"stop"}
//! ```
//!
//! mpm to editor:
//!
//! ```text
//! {"type":"status","text":"3 seconds left"}
//! {"type":"stopped"}
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::activity::ActivityEvent;
use crate::types::UserSettings;

/// Errors decoding an editor line.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid editor message: {0}")]
    InvalidMessage(#[from] serde_json::Error),
}

/// A message from the editor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditorMessage {
    /// A document change. The text of the first content change is all that
    /// matters: empty means something was deleted.
    Change {
        #[serde(default)]
        text: String,
    },

    /// The user changed the extension's settings. Absent fields keep their
    /// current value.
    Configuration {
        #[serde(default)]
        keypress: Option<u32>,
        #[serde(default, rename = "hardMode")]
        hard_mode: Option<bool>,
    },

    /// The user ran the stop command.
    Stop,
}

impl EditorMessage {
    /// Parses one line. Blank lines yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InvalidMessage` for anything that is not a
    /// known message.
    pub fn parse_line(line: &str) -> Result<Option<Self>, ProtocolError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(line)?))
    }

    /// The activity event a change message stands for.
    #[must_use]
    pub fn activity_event(&self) -> Option<ActivityEvent> {
        match self {
            Self::Change { text } if text.is_empty() => Some(ActivityEvent::Backspace),
            Self::Change { .. } => Some(ActivityEvent::Keystroke),
            _ => None,
        }
    }

    /// Applies a configuration message on top of `current`.
    #[must_use]
    pub fn merged_settings(&self, current: UserSettings) -> Option<UserSettings> {
        match self {
            Self::Configuration {
                keypress,
                hard_mode,
            } => Some(
                UserSettings {
                    keypress: keypress.unwrap_or(current.keypress),
                    hard_mode: hard_mode.unwrap_or(current.hard_mode),
                }
                .normalized(),
            ),
            _ => None,
        }
    }
}

/// A message to the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// New status bar text.
    Status { text: String },
    /// The session has been torn down; the status bar item can be hidden.
    Stopped,
}

impl HostMessage {
    /// Serializes to a single line without the trailing newline.
    #[must_use]
    pub fn to_line(&self) -> String {
        // A tagged enum of plain strings always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_with_text_is_keystroke() {
        let msg = EditorMessage::parse_line(r#"{"type":"change","text":"x"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(msg.activity_event(), Some(ActivityEvent::Keystroke));
    }

    #[test]
    fn change_with_empty_text_is_backspace() {
        let msg = EditorMessage::parse_line(r#"{"type":"change","text":""}"#)
            .unwrap()
            .unwrap();
        assert_eq!(msg.activity_event(), Some(ActivityEvent::Backspace));

        let msg = EditorMessage::parse_line(r#"{"type":"change"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(msg.activity_event(), Some(ActivityEvent::Backspace));
    }

    #[test]
    fn blank_line_is_ignored() {
        assert_eq!(EditorMessage::parse_line("   ").unwrap(), None);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result = EditorMessage::parse_line(r#"{"type":"explode"}"#);
        assert!(matches!(result, Err(ProtocolError::InvalidMessage(_))));
    }

    #[test]
    fn configuration_merges_partial_updates() {
        let msg = EditorMessage::parse_line(r#"{"type":"configuration","hardMode":true}"#)
            .unwrap()
            .unwrap();
        let merged = msg
            .merged_settings(UserSettings {
                keypress: 3,
                hard_mode: false,
            })
            .unwrap();
        assert_eq!(
            merged,
            UserSettings {
                keypress: 3,
                hard_mode: true
            }
        );
        assert_eq!(msg.activity_event(), None);
    }

    #[test]
    fn stop_parses() {
        let msg = EditorMessage::parse_line(r#"{"type":"stop"}"#).unwrap();
        assert_eq!(msg, Some(EditorMessage::Stop));
    }

    #[test]
    fn host_messages_serialize_as_tagged_lines() {
        let status = HostMessage::Status {
            text: "2 seconds left".to_string(),
        };
        assert_eq!(
            status.to_line(),
            r#"{"type":"status","text":"2 seconds left"}"#
        );
        assert_eq!(HostMessage::Stopped.to_line(), r#"{"type":"stopped"}"#);
    }
}
