//! lesson-voice - Hands-free voice commands for spoken lessons
//!
//! Continuous command recognition, queued narration and per-session telemetry,
//! driven as sans-IO state machines over pluggable speech engines.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod daemon;
pub mod defaults;
pub mod engines;
pub mod error;
pub mod events;
pub mod ipc;
pub mod narration;
pub mod recognition;
pub mod runtime;
pub mod session;
pub mod telemetry;
pub mod timers;
pub mod ui;

// Engine seams
pub use narration::SpeechSynthesizer;
pub use recognition::SpeechRecognizer;
pub use telemetry::{KeyValueStore, TelemetryTransport};

// Core services
pub use commands::{CommandMatcher, VoiceCommand, VoiceCommandType};
pub use narration::{NarrationController, NarrationHandle};
pub use recognition::CommandService;
pub use session::{SessionEngines, VoiceSession};
pub use telemetry::{TelemetryHandle, TelemetryService};

// Runtime
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use runtime::{RuntimeOptions, SessionHandle, spawn_session};

// Error handling
pub use error::{ErrorCode, Result, VoiceError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.0.1+abc1234"` when git hash is available, `"0.0.1"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
