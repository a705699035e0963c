//! Default configuration and timing constants for lesson-voice.
//!
//! This module provides shared constants used across the state machines and
//! configuration types so the two never drift apart.

/// Debounce window for buffered transcripts, in milliseconds.
///
/// Multi-word phrases spoken with natural pauses arrive as several results;
/// each new result re-arms this window so the phrase is matched once.
pub const DEBOUNCE_MS: u64 = 500;

/// Delay between two narration segments, in milliseconds.
pub const SEGMENT_GAP_MS: u64 = 100;

/// Delay before restarting recognition after the engine ends in continuous mode.
pub const RESTART_AFTER_END_MS: u64 = 100;

/// Delay before the single retry after a network error.
pub const NETWORK_RETRY_MS: u64 = 2000;

/// Delay before retrying after any other non-fatal engine error.
pub const TRANSIENT_RETRY_MS: u64 = 1000;

/// Estimated speaking speed at rate 1.0, used for duration estimates.
pub const CHARS_PER_SECOND: f32 = 10.0;

/// Step applied by the volume and speed voice commands.
pub const ADJUST_STEP: f32 = 0.2;

/// Ceiling for the "faster" voice command.
///
/// `set_rate` itself accepts up to [`MAX_RATE`]; voice control stops here
/// so a few repeated commands cannot make narration unintelligible.
pub const VOICE_MAX_RATE: f32 = 3.0;

/// Lower bound for speech rate.
pub const MIN_RATE: f32 = 0.1;

/// Upper bound for speech rate.
pub const MAX_RATE: f32 = 10.0;

/// Upper bound for speech pitch.
pub const MAX_PITCH: f32 = 2.0;

/// Default recognition language tag.
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Default number of alternatives requested from the recognizer.
pub const MAX_ALTERNATIVES: u32 = 3;

/// Results with a positive engine confidence below this are treated as noise.
pub const NOISE_THRESHOLD: f32 = 0.1;

/// Upper bound for a single host request, in milliseconds.
pub const COMMAND_TIMEOUT_MS: u64 = 5000;

/// Inactivity before floating controls hide, in milliseconds.
pub const AUTO_HIDE_DELAY_MS: u64 = 5000;

/// Maximum number of telemetry events kept across all stored sessions.
pub const TELEMETRY_MAX_EVENTS: usize = 1000;

/// Interval between batched telemetry uploads, in milliseconds.
pub const TELEMETRY_SEND_INTERVAL_MS: u64 = 30_000;

/// Storage key holding every recorded session.
pub const SESSIONS_KEY: &str = "voice_telemetry_sessions";

/// Storage key holding events waiting for upload.
pub const QUEUE_KEY: &str = "voice_telemetry_queue";

/// Application directory name under the XDG config and data roots.
pub const APP_DIR: &str = "lesson-voice";

/// Socket file name under the runtime directory.
pub const SOCKET_NAME: &str = "lesson-voice.sock";
