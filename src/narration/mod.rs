//! Narration: queued text-to-speech playback.

pub mod controller;
pub mod state;
pub mod synth;

pub use controller::NarrationController;
pub use state::{
    NarrationDebugInfo, NarrationEvent, NarrationSegment, NarrationStatus, SpeakOptions,
    SpeechInput, SpeechState,
};
pub use synth::{
    MockSynthesizer, SpeechSynthesizer, SynthCall, SynthEvent, SynthLog, Utterance, UtteranceId,
    VoiceInfo,
};

use std::sync::{Arc, Mutex, MutexGuard};

/// Shared handle to the single narration controller of a session.
///
/// When locking both this and a telemetry handle, lock this one first.
#[derive(Debug, Clone)]
pub struct NarrationHandle {
    inner: Arc<Mutex<NarrationController>>,
}

impl NarrationHandle {
    pub fn new(controller: NarrationController) -> Self {
        Self {
            inner: Arc::new(Mutex::new(controller)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, NarrationController> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
