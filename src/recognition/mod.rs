//! Recognition: continuous listening, command detection and dispatch.

pub mod engine;
pub mod service;
pub mod state;

pub use engine::{
    MockRecognizer, RecognitionErrorKind, RecognitionEvent, RecognizerCall, RecognizerLog,
    RecognizerSettings, SpeechRecognizer,
};
pub use service::CommandService;
pub use state::{CommandOutcome, RecognitionDebugInfo, RecognitionState, ServiceEvent};
