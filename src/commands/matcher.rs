//! Transcript to intent matching.
//!
//! A phrase hits when it occurs in the lowercased transcript on word
//! boundaries. Its confidence is the share of the phrase's words present in
//! the transcript, plus a bonus for short utterances:
//!
//! ```text
//! base  = matched phrase words / phrase words
//! boost = max(0, (10 - transcript words) / 10)
//! conf  = min(1, base + 0.2 * boost)
//! ```
//!
//! Transcript words keep their punctuation, so "repeat." does not count the
//! word "repeat" even though the boundary check lets the phrase hit.

use crate::commands::patterns::{DEFAULT_PATTERNS, VoiceCommandPattern};
use crate::commands::types::{VoiceCommand, VoiceCommandType};
use serde::{Deserialize, Serialize};

/// How competing patterns are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Table order; the first phrase whose confidence clears its pattern's
    /// threshold wins.
    #[default]
    FirstMatch,
    /// Highest confidence across the whole table; ties go to the earlier row.
    BestMatch,
}

/// Result of matching a transcript, before it becomes a [`VoiceCommand`].
#[derive(Debug, Clone, PartialEq)]
pub struct CommandMatch {
    pub command_type: VoiceCommandType,
    pub confidence: f32,
    /// The trigger phrase that hit.
    pub phrase: String,
    pub variations: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CommandMatcher {
    patterns: Vec<VoiceCommandPattern>,
    policy: MatchPolicy,
}

impl Default for CommandMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERNS.clone(), MatchPolicy::default())
    }
}

impl CommandMatcher {
    pub fn new(patterns: Vec<VoiceCommandPattern>, policy: MatchPolicy) -> Self {
        let patterns = patterns
            .into_iter()
            .map(|mut p| {
                p.patterns = p.patterns.iter().map(|s| s.trim().to_lowercase()).collect();
                p.patterns.retain(|s| !s.is_empty());
                p
            })
            .collect();
        Self { patterns, policy }
    }

    pub fn patterns(&self) -> &[VoiceCommandPattern] {
        &self.patterns
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: MatchPolicy) {
        self.policy = policy;
    }

    /// Match a transcript against the table. `None` means no command.
    pub fn find(&self, transcript: &str) -> Option<CommandMatch> {
        let normalized = transcript.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }

        let mut best: Option<CommandMatch> = None;
        for pattern in &self.patterns {
            for phrase in &pattern.patterns {
                if !contains_phrase(&normalized, phrase) {
                    continue;
                }
                let score = confidence(&normalized, phrase);
                // A NaN or above-one threshold can never be met.
                if pattern.min_confidence.is_nan() || score < pattern.min_confidence {
                    continue;
                }
                let candidate = CommandMatch {
                    command_type: pattern.command_type,
                    confidence: score,
                    phrase: phrase.clone(),
                    variations: pattern.patterns.clone(),
                };
                match self.policy {
                    MatchPolicy::FirstMatch => return Some(candidate),
                    MatchPolicy::BestMatch => {
                        if best.as_ref().is_none_or(|b| score > b.confidence) {
                            best = Some(candidate);
                        }
                    }
                }
            }
        }
        best
    }

    /// Match and wrap the result as a [`VoiceCommand`].
    pub fn detect(&self, transcript: &str, context: &str, timestamp: i64) -> Option<VoiceCommand> {
        self.find(transcript).map(|m| VoiceCommand {
            command_type: m.command_type,
            confidence: m.confidence,
            raw_text: transcript.to_string(),
            timestamp,
            context: context.to_string(),
            variations: m.variations,
        })
    }
}

/// Score a phrase against an already lowercased transcript.
pub fn confidence(transcript: &str, phrase: &str) -> f32 {
    let words: Vec<&str> = transcript.split_whitespace().collect();
    let phrase_words: Vec<String> = phrase.split_whitespace().map(str::to_lowercase).collect();

    let matching = phrase_words
        .iter()
        .filter(|pw| words.contains(&pw.as_str()))
        .count();
    let base = matching as f32 / phrase_words.len().max(1) as f32;
    let boost = ((10.0 - words.len() as f32) / 10.0).max(0.0);

    (base + boost * 0.2).min(1.0)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whether `phrase` occurs in `haystack` delimited by word boundaries.
pub fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    let chars: Vec<char> = haystack.chars().collect();
    let phrase_chars: Vec<char> = phrase.chars().collect();
    let plen = phrase_chars.len();
    if plen > chars.len() {
        return false;
    }

    (0..=chars.len() - plen).any(|i| {
        if chars[i..i + plen] != phrase_chars[..] {
            return false;
        }
        let before_ok = i == 0 || !is_word_char(chars[i - 1]);
        let after_ok = i + plen == chars.len() || !is_word_char(chars[i + plen]);
        before_ok && after_ok
    })
}
