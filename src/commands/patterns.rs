//! Built-in command pattern table.

use crate::commands::types::VoiceCommandType;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// One row of the pattern table: an intent, its trigger phrases and the
/// minimum confidence a transcript needs to trigger it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceCommandPattern {
    #[serde(rename = "type")]
    pub command_type: VoiceCommandType,
    pub patterns: Vec<String>,
    pub min_confidence: f32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub examples: Vec<String>,
}

impl VoiceCommandPattern {
    fn row(
        command_type: VoiceCommandType,
        patterns: &[&str],
        min_confidence: f32,
        description: &str,
        examples: &[&str],
    ) -> Self {
        Self {
            command_type,
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            min_confidence,
            description: description.to_string(),
            examples: examples.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Table order is match order.
pub static DEFAULT_PATTERNS: LazyLock<Vec<VoiceCommandPattern>> = LazyLock::new(|| {
    use VoiceCommandType::*;
    vec![
        VoiceCommandPattern::row(
            Repeat,
            &["repeat", "say it again", "again", "one more time", "can you repeat"],
            0.7,
            "Repeat the current content",
            &["Repeat", "Say it again", "One more time"],
        ),
        VoiceCommandPattern::row(
            Pause,
            &["pause", "wait", "hold on", "stop for a moment", "hold up"],
            0.8,
            "Pause the current speech or lesson",
            &["Pause", "Wait", "Hold on"],
        ),
        VoiceCommandPattern::row(
            Resume,
            &["resume", "continue", "go on", "keep going", "carry on"],
            0.8,
            "Resume paused content",
            &["Resume", "Continue", "Go on"],
        ),
        VoiceCommandPattern::row(
            Stop,
            &["stop", "cancel", "quit", "exit", "end"],
            0.8,
            "Stop the current activity",
            &["Stop", "Cancel", "Exit"],
        ),
        VoiceCommandPattern::row(
            Next,
            &["next", "move on", "skip", "forward", "continue to next"],
            0.7,
            "Move to the next item",
            &["Next", "Move on", "Skip"],
        ),
        VoiceCommandPattern::row(
            Previous,
            &["previous", "go back", "back", "last one", "before"],
            0.7,
            "Go to the previous item",
            &["Previous", "Go back", "Back"],
        ),
        VoiceCommandPattern::row(
            Help,
            &[
                "help",
                "what can i say",
                "commands",
                "what commands",
                "available commands",
            ],
            0.8,
            "Show available voice commands",
            &["Help", "What can I say?", "Commands"],
        ),
        VoiceCommandPattern::row(
            VolumeUp,
            &["louder", "volume up", "increase volume", "turn up"],
            0.8,
            "Increase the volume",
            &["Louder", "Volume up", "Turn up"],
        ),
        VoiceCommandPattern::row(
            VolumeDown,
            &[
                "quieter",
                "volume down",
                "decrease volume",
                "turn down",
                "softer",
            ],
            0.8,
            "Decrease the volume",
            &["Quieter", "Volume down", "Softer"],
        ),
        VoiceCommandPattern::row(
            Slower,
            &["slower", "slow down", "speak slower", "not so fast"],
            0.8,
            "Decrease speech rate",
            &["Slower", "Slow down", "Not so fast"],
        ),
        VoiceCommandPattern::row(
            Faster,
            &["faster", "speed up", "speak faster", "hurry up"],
            0.8,
            "Increase speech rate",
            &["Faster", "Speed up", "Hurry up"],
        ),
    ]
});

/// Owned copy of the built-in table.
pub fn default_patterns() -> Vec<VoiceCommandPattern> {
    DEFAULT_PATTERNS.clone()
}

/// Spoken response to the help intent.
pub const HELP_TEXT: [&str; 4] = [
    "You can say: Repeat, Pause, Resume, Stop",
    "Volume commands: Louder, Quieter",
    "Speed commands: Faster, Slower",
    "Navigation: Next, Previous, Skip",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_one_row_per_matchable_intent() {
        let types: Vec<_> = DEFAULT_PATTERNS.iter().map(|p| p.command_type).collect();
        assert_eq!(types.len(), 11);
        for t in VoiceCommandType::ALL {
            let expected = !matches!(t, VoiceCommandType::Skip | VoiceCommandType::Cancel);
            assert_eq!(types.contains(&t), expected, "{t}");
        }
    }

    #[test]
    fn thresholds_are_within_unit_range() {
        for p in DEFAULT_PATTERNS.iter() {
            assert!((0.0..=1.0).contains(&p.min_confidence), "{:?}", p.command_type);
            assert!(!p.patterns.is_empty());
            assert!(!p.examples.is_empty());
        }
    }

    #[test]
    fn phrases_are_lowercase() {
        for p in DEFAULT_PATTERNS.iter() {
            for phrase in &p.patterns {
                assert_eq!(phrase, &phrase.to_lowercase());
            }
        }
    }

    #[test]
    fn pattern_row_deserializes_from_toml() {
        let row: VoiceCommandPattern = toml::from_str(
            r#"
            type = "repeat"
            patterns = ["once more"]
            min_confidence = 0.6
            "#,
        )
        .unwrap();
        assert_eq!(row.command_type, VoiceCommandType::Repeat);
        assert_eq!(row.patterns, vec!["once more"]);
        assert!(row.description.is_empty());
    }
}
