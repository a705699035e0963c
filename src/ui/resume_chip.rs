//! The "resume" chip shown while narration is paused.

use crate::narration::SpeechState;
use serde::{Deserialize, Serialize};

/// Key handling while the chip is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChipAction {
    Resume,
    Cancel,
}

impl ChipAction {
    /// Enter and Space resume, Escape cancels.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "Enter" | " " => Some(ChipAction::Resume),
            "Escape" => Some(ChipAction::Cancel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResumeChip {
    paused_since: Option<i64>,
}

impl ResumeChip {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow the narration state; the pause start is kept across repeated
    /// paused snapshots.
    pub fn update(&mut self, speech: &SpeechState, now_ms: i64) {
        if speech.is_paused {
            self.paused_since.get_or_insert(now_ms);
        } else {
            self.paused_since = None;
        }
    }

    pub fn is_visible(&self) -> bool {
        self.paused_since.is_some()
    }

    pub fn paused_since(&self) -> Option<i64> {
        self.paused_since
    }

    pub fn elapsed_ms(&self, now_ms: i64) -> u64 {
        self.paused_since
            .map_or(0, |since| u64::try_from(now_ms - since).unwrap_or(0))
    }

    /// "Paused for" text, or `None` while hidden.
    pub fn timer_text(&self, now_ms: i64) -> Option<String> {
        self.paused_since
            .map(|_| format_elapsed(self.elapsed_ms(now_ms)))
    }
}

/// `45s` below a minute, `m:ss` above.
pub fn format_elapsed(millis: u64) -> String {
    let seconds = millis / 1000;
    let minutes = seconds / 60;
    if minutes > 0 {
        format!("{}:{:02}", minutes, seconds % 60)
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speech(paused: bool) -> SpeechState {
        SpeechState {
            is_playing: true,
            is_paused: paused,
            current_text: Some("Hello".to_string()),
            current_segment_id: Some("segment_1".to_string()),
            position_ms: 0,
            duration_ms: 500,
            volume: 1.0,
            rate: 1.0,
            pitch: 1.0,
            queue_length: 1,
            can_pause: !paused,
            can_resume: paused,
            can_stop: true,
        }
    }

    #[test]
    fn visible_only_while_paused() {
        let mut chip = ResumeChip::new();
        chip.update(&speech(false), 0);
        assert!(!chip.is_visible());

        chip.update(&speech(true), 1_000);
        chip.update(&speech(true), 5_000);
        assert_eq!(chip.paused_since(), Some(1_000));
        assert_eq!(chip.timer_text(46_000).as_deref(), Some("45s"));

        chip.update(&speech(false), 50_000);
        assert!(!chip.is_visible());
        assert_eq!(chip.timer_text(50_000), None);
    }

    #[test]
    fn formats_minutes() {
        assert_eq!(format_elapsed(0), "0s");
        assert_eq!(format_elapsed(59_999), "59s");
        assert_eq!(format_elapsed(65_000), "1:05");
        assert_eq!(format_elapsed(600_000), "10:00");
    }

    #[test]
    fn chip_keys() {
        assert_eq!(ChipAction::from_key("Enter"), Some(ChipAction::Resume));
        assert_eq!(ChipAction::from_key(" "), Some(ChipAction::Resume));
        assert_eq!(ChipAction::from_key("Escape"), Some(ChipAction::Cancel));
        assert_eq!(ChipAction::from_key("a"), None);
    }
}
