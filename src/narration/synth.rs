//! Speech synthesis engine abstraction.

use crate::error::{Result, VoiceError};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

pub type UtteranceId = u64;

/// One request to the engine. Rate and pitch are fixed for its lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: UtteranceId,
    pub text: String,
    pub volume: f32,
    pub rate: f32,
    pub pitch: f32,
    pub voice: Option<String>,
    pub language: String,
}

/// Engine callbacks, tagged with the utterance they belong to.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthEvent {
    Started { id: UtteranceId },
    Ended { id: UtteranceId },
    Failed { id: UtteranceId, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub name: String,
    pub language: String,
    pub default: bool,
}

/// Utterance-based text-to-speech engine.
///
/// Engines report progress asynchronously as [`SynthEvent`]s; the narration
/// controller is the only caller and ignores events for utterances it has
/// already cancelled.
pub trait SpeechSynthesizer: Send {
    fn is_available(&self) -> bool {
        true
    }

    fn speak(&mut self, utterance: &Utterance) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn resume(&mut self) -> Result<()>;

    /// Drop the active utterance and anything the engine queued.
    fn cancel(&mut self) -> Result<()>;

    /// Adjust the volume of the utterance in flight, where supported.
    fn set_volume(&mut self, volume: f32) -> Result<()>;

    fn is_active(&self) -> bool;

    fn voices(&self) -> Vec<VoiceInfo> {
        Vec::new()
    }
}

/// Calls recorded by [`MockSynthesizer`].
#[derive(Debug, Clone, PartialEq)]
pub enum SynthCall {
    Speak(Utterance),
    Pause,
    Resume,
    Cancel,
    SetVolume(f32),
}

/// Shared view of everything a [`MockSynthesizer`] was asked to do.
#[derive(Debug, Clone, Default)]
pub struct SynthLog {
    calls: Arc<Mutex<Vec<SynthCall>>>,
}

impl SynthLog {
    fn push(&self, call: SynthCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }

    pub fn calls(&self) -> Vec<SynthCall> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Every utterance handed to the engine, in order.
    pub fn spoken(&self) -> Vec<Utterance> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SynthCall::Speak(u) => Some(u),
                _ => None,
            })
            .collect()
    }

    pub fn spoken_texts(&self) -> Vec<String> {
        self.spoken().into_iter().map(|u| u.text).collect()
    }

    pub fn last_spoken(&self) -> Option<Utterance> {
        self.spoken().pop()
    }

    pub fn count(&self, predicate: impl Fn(&SynthCall) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(c)).count()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Mock synthesizer for testing
///
/// Records calls instead of producing audio. Tests feed the matching
/// [`SynthEvent`]s back into the controller to simulate playback.
#[derive(Debug, Clone)]
pub struct MockSynthesizer {
    log: SynthLog,
    available: bool,
    fail_speak: bool,
    fail_pause: bool,
    voices: Vec<VoiceInfo>,
    active: bool,
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self {
            log: SynthLog::default(),
            available: true,
            fail_speak: false,
            fail_pause: false,
            voices: Vec::new(),
            active: false,
        }
    }

    /// Pretend the environment has no synthesis primitive.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Make every `speak` call fail.
    pub fn with_speak_failure(mut self) -> Self {
        self.fail_speak = true;
        self
    }

    /// Make `pause` and `resume` fail.
    pub fn with_pause_failure(mut self) -> Self {
        self.fail_pause = true;
        self
    }

    pub fn with_voices(mut self, voices: Vec<VoiceInfo>) -> Self {
        self.voices = voices;
        self
    }

    /// Handle for inspecting calls after the mock has been moved.
    pub fn log(&self) -> SynthLog {
        self.log.clone()
    }
}

impl SpeechSynthesizer for MockSynthesizer {
    fn is_available(&self) -> bool {
        self.available
    }

    fn speak(&mut self, utterance: &Utterance) -> Result<()> {
        self.log.push(SynthCall::Speak(utterance.clone()));
        if self.fail_speak {
            return Err(VoiceError::Synthesis {
                message: "mock speak failure".to_string(),
            });
        }
        self.active = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.log.push(SynthCall::Pause);
        if self.fail_pause {
            return Err(VoiceError::Synthesis {
                message: "mock pause failure".to_string(),
            });
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.log.push(SynthCall::Resume);
        if self.fail_pause {
            return Err(VoiceError::Synthesis {
                message: "mock resume failure".to_string(),
            });
        }
        Ok(())
    }

    fn cancel(&mut self) -> Result<()> {
        self.log.push(SynthCall::Cancel);
        self.active = false;
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.log.push(SynthCall::SetVolume(volume));
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        self.voices.clone()
    }
}
