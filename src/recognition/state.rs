//! Recognition states, service events and dispatch outcomes.

use crate::commands::{BargeInEvent, VoiceCommand};
use crate::config::VoiceConfig;
use crate::narration::SpeechState;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionState {
    #[default]
    Idle,
    Listening,
    Processing,
    Executing,
    Error,
    Unsupported,
}

impl RecognitionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecognitionState::Idle => "idle",
            RecognitionState::Listening => "listening",
            RecognitionState::Processing => "processing",
            RecognitionState::Executing => "executing",
            RecognitionState::Error => "error",
            RecognitionState::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for RecognitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the dispatcher did for a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    Repeated {
        barge_in: Option<BargeInEvent>,
        /// False when there was nothing to repeat.
        restarted: bool,
    },
    Paused,
    Resumed,
    Stopped {
        barge_in: Option<BargeInEvent>,
    },
    VolumeChanged {
        volume: f32,
    },
    RateChanged {
        rate: f32,
    },
    HelpAnnounced {
        barge_in: Option<BargeInEvent>,
    },
    /// Handed to the lesson flow as a navigation request.
    Forwarded,
    /// Not applicable in the current narration state.
    Ignored,
}

/// Observable events of the command service.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    StateChanged(RecognitionState),
    CommandDetected(VoiceCommand),
    CommandExecuted {
        command: VoiceCommand,
        outcome: CommandOutcome,
        execution_ms: f64,
    },
    CommandFailed {
        command: VoiceCommand,
        error: String,
    },
    SpeechStateChanged(SpeechState),
    /// `next`, `previous` or `skip`; only the lesson flow can act on these.
    NavigationRequested(VoiceCommand),
}

/// Diagnostic dump of the command service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionDebugInfo {
    pub supported: bool,
    pub initialized: bool,
    pub state: RecognitionState,
    pub config: VoiceConfig,
    pub session_id: String,
    pub listening_requested: bool,
    pub engine_running: bool,
    pub last_command_time: Option<i64>,
    pub buffer: Vec<String>,
    pub armed_timers: usize,
    pub speech_state: SpeechState,
}
