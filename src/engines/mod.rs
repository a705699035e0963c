//! Engine implementations for the terminal.
//!
//! Both report progress over tokio channels that the session runtime drains.

pub mod console;

pub use console::{ConsoleSynthesizer, LineRecognizer, estimated_duration};

use crate::narration::SynthEvent;
use crate::recognition::RecognitionEvent;
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Receiving ends of the engine callbacks.
#[derive(Debug)]
pub struct EngineEvents {
    pub synth: UnboundedReceiver<SynthEvent>,
    pub recognition: UnboundedReceiver<RecognitionEvent>,
}

/// Console narration plus stdin commands, wired to fresh channels.
pub fn console_engines() -> (ConsoleSynthesizer, LineRecognizer, EngineEvents) {
    let (synth_tx, synth_rx) = mpsc::unbounded_channel();
    let (recognition_tx, recognition_rx) = mpsc::unbounded_channel();
    (
        ConsoleSynthesizer::new(synth_tx),
        LineRecognizer::stdin(recognition_tx),
        EngineEvents {
            synth: synth_rx,
            recognition: recognition_rx,
        },
    )
}
