//! JSON message protocol for IPC communication between CLI and daemon.

use crate::commands::VoiceCommandType;
use crate::error::{ErrorCode, VoiceError};
use crate::recognition::CommandOutcome;
use crate::session::SessionSnapshot;
use serde::{Deserialize, Serialize};

/// Commands sent by CLI to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Start listening for voice commands
    Start,
    /// Stop listening
    Stop,
    /// Toggle listening on/off
    Toggle,
    /// Get session status
    Status,
    /// Narrate text
    Say { text: String },
    /// Run a command as if it had been spoken
    Execute { command: VoiceCommandType },
    Pause,
    Resume,
    Repeat,
    /// Stop narration and drop the queue
    Cancel,
    SetVolume { volume: f32 },
    SetRate { rate: f32 },
    /// List example phrases of every available command
    Commands,
    /// Export the current telemetry session as JSON
    ExportSession,
    /// Shutdown the daemon
    Shutdown,
}

impl Command {
    /// Serialize command to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize command from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Responses sent by daemon to CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Command succeeded
    Ok,
    /// Current session status
    Status {
        session_id: String,
        snapshot: SessionSnapshot,
    },
    /// Result of an executed command
    Outcome { outcome: CommandOutcome },
    /// Applied volume or rate after clamping
    Level { value: f32 },
    Commands { commands: Vec<String> },
    Export { json: String },
    /// Error occurred
    Error { code: ErrorCode, message: String },
}

impl Response {
    /// Serialize response to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize response from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl From<VoiceError> for Response {
    fn from(error: VoiceError) -> Self {
        Response::Error {
            code: error.code(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_format_is_snake_case() {
        assert_eq!(Command::Toggle.to_json().unwrap(), r#"{"type":"toggle"}"#);
        assert_eq!(
            Command::ExportSession.to_json().unwrap(),
            r#"{"type":"export_session"}"#
        );
        assert_eq!(
            Command::Execute {
                command: VoiceCommandType::VolumeUp
            }
            .to_json()
            .unwrap(),
            r#"{"type":"execute","command":"volume_up"}"#
        );
    }

    #[test]
    fn command_with_payload_parses() {
        let cmd = Command::from_json(r#"{"type":"say","text":"Hello there"}"#).unwrap();
        assert_eq!(
            cmd,
            Command::Say {
                text: "Hello there".to_string()
            }
        );

        let cmd = Command::from_json(r#"{"type":"set_rate","rate":1.5}"#).unwrap();
        assert_eq!(cmd, Command::SetRate { rate: 1.5 });
    }

    #[test]
    fn invalid_json_returns_error() {
        assert!(Command::from_json(r#"{"type": "unknown_command"}"#).is_err());
        assert!(Command::from_json(r#"{"invalid": "json"}"#).is_err());
        assert!(Command::from_json("not json at all").is_err());
        assert!(Command::from_json(r#"{"type":"execute","command":"dance"}"#).is_err());
    }

    #[test]
    fn response_ok_format() {
        assert_eq!(Response::Ok.to_json().unwrap(), r#"{"type":"ok"}"#);
    }

    #[test]
    fn outcome_response_nests_tagged_outcome() {
        let resp = Response::Outcome {
            outcome: CommandOutcome::VolumeChanged { volume: 0.5 },
        };
        let json = resp.to_json().unwrap();
        assert!(json.contains(r#""type":"outcome""#), "{json}");
        assert!(json.contains(r#""outcome":"volume_changed""#), "{json}");
        assert_eq!(Response::from_json(&json).unwrap(), resp);
    }

    #[test]
    fn error_response_from_voice_error() {
        let resp = Response::from(VoiceError::CommandNotFound {
            command: "cancel".to_string(),
        });
        let json = resp.to_json().unwrap();
        assert!(json.contains(r#""code":"COMMAND_NOT_FOUND""#), "{json}");
        assert!(json.contains("Unknown command type: cancel"), "{json}");
    }
}
