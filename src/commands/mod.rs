//! Voice command intents, the pattern table, and transcript matching.

pub mod matcher;
pub mod patterns;
pub mod types;

pub use matcher::{CommandMatch, CommandMatcher, MatchPolicy};
pub use patterns::{DEFAULT_PATTERNS, HELP_TEXT, VoiceCommandPattern, default_patterns};
pub use types::{BargeInEvent, VoiceCommand, VoiceCommandType};
