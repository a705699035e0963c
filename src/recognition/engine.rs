//! Speech recognition engine abstraction.

use crate::config::VoiceConfig;
use crate::error::{Result, VoiceError};
use std::sync::{Arc, Mutex};

/// Settings pushed to the engine at initialization and on relevant config
/// updates.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizerSettings {
    pub continuous: bool,
    pub interim_results: bool,
    pub language: String,
    pub max_alternatives: u32,
}

impl From<&VoiceConfig> for RecognizerSettings {
    fn from(config: &VoiceConfig) -> Self {
        Self {
            continuous: config.continuous,
            interim_results: config.interim_results,
            language: config.language.clone(),
            max_alternatives: config.max_alternatives,
        }
    }
}

/// Engine callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    /// The engine is capturing audio.
    Started,
    Result {
        transcript: String,
        /// Engine-reported confidence; 0 when the engine does not report one.
        confidence: f32,
        is_final: bool,
    },
    Error {
        code: String,
    },
    NoMatch,
    /// The engine stopped capturing, for whatever reason.
    Ended,
}

impl RecognitionEvent {
    pub fn final_result(transcript: &str, confidence: f32) -> Self {
        RecognitionEvent::Result {
            transcript: transcript.to_string(),
            confidence,
            is_final: true,
        }
    }

    pub fn interim_result(transcript: &str) -> Self {
        RecognitionEvent::Result {
            transcript: transcript.to_string(),
            confidence: 0.0,
            is_final: false,
        }
    }

    pub fn error(code: &str) -> Self {
        RecognitionEvent::Error {
            code: code.to_string(),
        }
    }
}

/// How an engine error code affects the listening session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    /// Terminal until the user restarts listening.
    Permission,
    /// Retried once after a delay.
    Network,
    /// Retried while continuous listening is wanted.
    Transient,
}

impl RecognitionErrorKind {
    pub fn classify(code: &str) -> Self {
        match code {
            "not-allowed" | "permission-denied" | "service-not-allowed" => {
                RecognitionErrorKind::Permission
            }
            "network" => RecognitionErrorKind::Network,
            _ => RecognitionErrorKind::Transient,
        }
    }
}

/// Continuous transcription engine. Results and state changes come back
/// asynchronously as [`RecognitionEvent`]s.
pub trait SpeechRecognizer: Send {
    fn is_available(&self) -> bool {
        true
    }

    fn configure(&mut self, settings: &RecognizerSettings) -> Result<()>;

    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;
}

/// Calls recorded by [`MockRecognizer`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerCall {
    Configure(RecognizerSettings),
    Start,
    Stop,
}

#[derive(Debug, Clone, Default)]
pub struct RecognizerLog {
    calls: Arc<Mutex<Vec<RecognizerCall>>>,
}

impl RecognizerLog {
    fn push(&self, call: RecognizerCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }

    pub fn calls(&self) -> Vec<RecognizerCall> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn starts(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RecognizerCall::Start))
            .count()
    }

    pub fn stops(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RecognizerCall::Stop))
            .count()
    }

    pub fn last_settings(&self) -> Option<RecognizerSettings> {
        self.calls().into_iter().rev().find_map(|c| match c {
            RecognizerCall::Configure(settings) => Some(settings),
            _ => None,
        })
    }
}

/// Mock recognizer for testing
///
/// Records calls; tests feed [`RecognitionEvent`]s to the service to
/// simulate the engine.
#[derive(Debug, Clone)]
pub struct MockRecognizer {
    log: RecognizerLog,
    available: bool,
    fail_start: bool,
}

impl Default for MockRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRecognizer {
    pub fn new() -> Self {
        Self {
            log: RecognizerLog::default(),
            available: true,
            fail_start: false,
        }
    }

    /// An environment without speech recognition.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn with_start_failure(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn log(&self) -> RecognizerLog {
        self.log.clone()
    }
}

impl SpeechRecognizer for MockRecognizer {
    fn is_available(&self) -> bool {
        self.available
    }

    fn configure(&mut self, settings: &RecognizerSettings) -> Result<()> {
        self.log.push(RecognizerCall::Configure(settings.clone()));
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.log.push(RecognizerCall::Start);
        if self.fail_start {
            return Err(VoiceError::Recognition {
                message: "mock start failure".to_string(),
            });
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.log.push(RecognizerCall::Stop);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_error_codes() {
        for code in ["not-allowed", "permission-denied", "service-not-allowed"] {
            assert_eq!(
                RecognitionErrorKind::classify(code),
                RecognitionErrorKind::Permission
            );
        }
        assert_eq!(
            RecognitionErrorKind::classify("network"),
            RecognitionErrorKind::Network
        );
        assert_eq!(
            RecognitionErrorKind::classify("no-speech"),
            RecognitionErrorKind::Transient
        );
        assert_eq!(
            RecognitionErrorKind::classify("audio-capture"),
            RecognitionErrorKind::Transient
        );
    }

    #[test]
    fn settings_follow_config() {
        let config = VoiceConfig {
            language: "en-GB".to_string(),
            interim_results: true,
            ..VoiceConfig::default()
        };
        let settings = RecognizerSettings::from(&config);
        assert_eq!(settings.language, "en-GB");
        assert!(settings.interim_results);
        assert!(settings.continuous);
        assert_eq!(settings.max_alternatives, 3);
    }

    #[test]
    fn mock_records_calls() {
        let mut recognizer = MockRecognizer::new().with_start_failure();
        let log = recognizer.log();
        assert!(recognizer.start().is_err());
        recognizer.stop().unwrap();
        assert_eq!(log.starts(), 1);
        assert_eq!(log.stops(), 1);
        assert!(log.last_settings().is_none());
    }
}
