//! Narration data types: segments, state snapshots, events, and options.

use crate::commands::BargeInEvent;
use serde::{Deserialize, Serialize};

/// One unit of speech owned by the narration queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrationSegment {
    pub id: String,
    pub text: String,
    /// Epoch milliseconds when the engine started speaking it.
    pub start_time: Option<i64>,
    /// Epoch milliseconds when the engine finished it.
    pub end_time: Option<i64>,
    /// Measured duration in milliseconds.
    pub duration: Option<u64>,
}

impl NarrationSegment {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            start_time: None,
            end_time: None,
            duration: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationStatus {
    Idle,
    Playing,
    Paused,
}

/// Snapshot derived from the controller on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechState {
    pub is_playing: bool,
    pub is_paused: bool,
    pub current_text: Option<String>,
    pub current_segment_id: Option<String>,
    /// Estimated elapsed time in the current segment.
    pub position_ms: u64,
    /// Estimated time left for the current and pending segments.
    pub duration_ms: u64,
    pub volume: f32,
    pub rate: f32,
    pub pitch: f32,
    pub queue_length: usize,
    pub can_pause: bool,
    pub can_resume: bool,
    pub can_stop: bool,
}

impl SpeechState {
    pub fn status(&self) -> NarrationStatus {
        match (self.is_playing, self.is_paused) {
            (_, true) => NarrationStatus::Paused,
            (true, false) => NarrationStatus::Playing,
            (false, false) => NarrationStatus::Idle,
        }
    }
}

/// Observable narration events.
#[derive(Debug, Clone, PartialEq)]
pub enum NarrationEvent {
    StateChanged(SpeechState),
    SegmentStarted(NarrationSegment),
    SegmentEnded(NarrationSegment),
    /// The queue ran dry.
    Completed,
    BargeIn(BargeInEvent),
    /// An engine failure that was swallowed at the boundary.
    Error(String),
}

/// Options for `speak`.
///
/// `queue` takes precedence over `interrupt`: a queued request never cuts
/// off current speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakOptions {
    /// Cancel in-flight speech and replace the queue.
    pub interrupt: bool,
    /// Append behind whatever is queued.
    pub queue: bool,
    /// Id for the new segment; numbered per segment when several are given.
    pub segment_id: Option<String>,
}

impl Default for SpeakOptions {
    fn default() -> Self {
        Self {
            interrupt: true,
            queue: false,
            segment_id: None,
        }
    }
}

impl SpeakOptions {
    pub fn queued() -> Self {
        Self {
            interrupt: false,
            queue: true,
            segment_id: None,
        }
    }

    /// Replace the not-yet-started segments, leaving the current one alone.
    pub fn replace_pending() -> Self {
        Self {
            interrupt: false,
            queue: false,
            segment_id: None,
        }
    }

    pub fn with_segment_id(mut self, id: impl Into<String>) -> Self {
        self.segment_id = Some(id.into());
        self
    }
}

/// Text accepted by `speak`: one string or an ordered list of segments.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechInput {
    One(String),
    Many(Vec<String>),
}

impl SpeechInput {
    pub fn into_segments(self) -> Vec<String> {
        match self {
            SpeechInput::One(text) => vec![text],
            SpeechInput::Many(texts) => texts,
        }
    }
}

impl From<&str> for SpeechInput {
    fn from(text: &str) -> Self {
        SpeechInput::One(text.to_string())
    }
}

impl From<String> for SpeechInput {
    fn from(text: String) -> Self {
        SpeechInput::One(text)
    }
}

impl From<Vec<String>> for SpeechInput {
    fn from(texts: Vec<String>) -> Self {
        SpeechInput::Many(texts)
    }
}

impl From<Vec<&str>> for SpeechInput {
    fn from(texts: Vec<&str>) -> Self {
        SpeechInput::Many(texts.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for SpeechInput {
    fn from(texts: [&str; N]) -> Self {
        SpeechInput::Many(texts.iter().map(|t| t.to_string()).collect())
    }
}

/// Diagnostic dump of the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrationDebugInfo {
    pub supported: bool,
    pub engine_active: bool,
    pub state: SpeechState,
    pub queued_text: Vec<String>,
    pub last_played: Option<String>,
    pub voice: Option<String>,
    pub language: String,
    pub armed_timers: usize,
}
