//! Command intents and the records produced when one is detected.

use crate::error::VoiceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every intent the dispatcher knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceCommandType {
    Repeat,
    Pause,
    Resume,
    Stop,
    Next,
    Previous,
    Help,
    VolumeUp,
    VolumeDown,
    Slower,
    Faster,
    Skip,
    Cancel,
}

impl VoiceCommandType {
    pub const ALL: [VoiceCommandType; 13] = [
        VoiceCommandType::Repeat,
        VoiceCommandType::Pause,
        VoiceCommandType::Resume,
        VoiceCommandType::Stop,
        VoiceCommandType::Next,
        VoiceCommandType::Previous,
        VoiceCommandType::Help,
        VoiceCommandType::VolumeUp,
        VoiceCommandType::VolumeDown,
        VoiceCommandType::Slower,
        VoiceCommandType::Faster,
        VoiceCommandType::Skip,
        VoiceCommandType::Cancel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceCommandType::Repeat => "repeat",
            VoiceCommandType::Pause => "pause",
            VoiceCommandType::Resume => "resume",
            VoiceCommandType::Stop => "stop",
            VoiceCommandType::Next => "next",
            VoiceCommandType::Previous => "previous",
            VoiceCommandType::Help => "help",
            VoiceCommandType::VolumeUp => "volume_up",
            VoiceCommandType::VolumeDown => "volume_down",
            VoiceCommandType::Slower => "slower",
            VoiceCommandType::Faster => "faster",
            VoiceCommandType::Skip => "skip",
            VoiceCommandType::Cancel => "cancel",
        }
    }

    /// Intents whose meaning only the embedding lesson flow knows.
    pub fn is_navigation(&self) -> bool {
        matches!(
            self,
            VoiceCommandType::Next | VoiceCommandType::Previous | VoiceCommandType::Skip
        )
    }
}

impl fmt::Display for VoiceCommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoiceCommandType {
    type Err = VoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        VoiceCommandType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| VoiceError::CommandNotFound {
                command: s.to_string(),
            })
    }
}

/// A detected intent instance. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceCommand {
    #[serde(rename = "type")]
    pub command_type: VoiceCommandType,
    /// Match score in [0, 1].
    pub confidence: f32,
    /// Transcript that produced the command.
    pub raw_text: String,
    /// Creation time, epoch milliseconds.
    pub timestamp: i64,
    pub context: String,
    /// Phrase set of the pattern that matched.
    pub variations: Vec<String>,
}

impl VoiceCommand {
    /// Build a command that did not come from the matcher (keyboard, IPC).
    pub fn manual(command_type: VoiceCommandType, context: &str, timestamp: i64) -> Self {
        Self {
            command_type,
            confidence: 1.0,
            raw_text: command_type.as_str().to_string(),
            timestamp,
            context: context.to_string(),
            variations: Vec::new(),
        }
    }
}

/// Snapshot taken when a command interrupts active speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BargeInEvent {
    /// Epoch milliseconds at the moment of interruption.
    pub interrupted_at: i64,
    pub original_content: String,
    pub segment_id: Option<String>,
    /// Estimated playback position inside the interrupted segment.
    pub position_ms: u64,
    pub was_paused: bool,
    pub command_type: VoiceCommandType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_wire_name() {
        for t in VoiceCommandType::ALL {
            assert_eq!(t.as_str().parse::<VoiceCommandType>().unwrap(), t);
        }
    }

    #[test]
    fn parse_accepts_dashes_and_case() {
        assert_eq!(
            "Volume-Up".parse::<VoiceCommandType>().unwrap(),
            VoiceCommandType::VolumeUp
        );
    }

    #[test]
    fn unknown_name_is_command_not_found() {
        let err = "dance".parse::<VoiceCommandType>().unwrap_err();
        assert!(matches!(err, VoiceError::CommandNotFound { ref command } if command == "dance"));
    }

    #[test]
    fn navigation_intents() {
        let nav: Vec<_> = VoiceCommandType::ALL
            .into_iter()
            .filter(|t| t.is_navigation())
            .collect();
        assert_eq!(
            nav,
            vec![
                VoiceCommandType::Next,
                VoiceCommandType::Previous,
                VoiceCommandType::Skip
            ]
        );
    }

    #[test]
    fn command_serializes_type_field() {
        let cmd = VoiceCommand::manual(VoiceCommandType::VolumeDown, "keyboard", 42);
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"type\":\"volume_down\""), "got {json}");
        assert!(json.contains("\"rawText\":\"volume_down\""), "got {json}");
    }
}
