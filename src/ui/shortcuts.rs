//! Keyboard shortcuts for voice control.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shortcut {
    /// Alt+V
    ToggleListening,
    /// Alt+R
    Repeat,
    /// Alt+P: pause while speaking, resume while paused.
    TogglePause,
    /// Alt+S
    Stop,
}

impl Shortcut {
    pub const ALL: [Shortcut; 4] = [
        Shortcut::ToggleListening,
        Shortcut::Repeat,
        Shortcut::TogglePause,
        Shortcut::Stop,
    ];

    /// Resolve a key press. Only Alt combinations are bound.
    pub fn from_key(alt: bool, key: char) -> Option<Self> {
        if !alt {
            return None;
        }
        match key.to_ascii_lowercase() {
            'v' => Some(Shortcut::ToggleListening),
            'r' => Some(Shortcut::Repeat),
            'p' => Some(Shortcut::TogglePause),
            's' => Some(Shortcut::Stop),
            _ => None,
        }
    }

    pub fn key(&self) -> char {
        match self {
            Shortcut::ToggleListening => 'v',
            Shortcut::Repeat => 'r',
            Shortcut::TogglePause => 'p',
            Shortcut::Stop => 's',
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Shortcut::ToggleListening => "Start or stop listening",
            Shortcut::Repeat => "Repeat the current narration",
            Shortcut::TogglePause => "Pause or resume narration",
            Shortcut::Stop => "Stop narration",
        }
    }
}

impl fmt::Display for Shortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Alt+{}", self.key().to_ascii_uppercase())
    }
}

/// Parses bindings such as `alt+v` or `Alt+P`.
impl FromStr for Shortcut {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let key = lower
            .strip_prefix("alt+")
            .and_then(|k| {
                let mut chars = k.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(c),
                    _ => None,
                }
            })
            .ok_or_else(|| format!("Unknown shortcut: {s}"))?;
        Shortcut::from_key(true, key).ok_or_else(|| format!("Unknown shortcut: {s}"))
    }
}
