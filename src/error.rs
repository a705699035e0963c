//! Error types for lesson-voice.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    // Environment and lifecycle errors
    #[error("Speech {capability} is not supported in this environment")]
    NotSupported { capability: String },

    #[error("Voice command service not initialized")]
    NotInitialized,

    #[error("Microphone permission denied: {message}")]
    PermissionDenied { message: String },

    // Engine errors
    #[error("Speech recognition network error: {message}")]
    Network { message: String },

    #[error("Speech recognition error: {message}")]
    Recognition { message: String },

    #[error("Speech synthesis error: {message}")]
    Synthesis { message: String },

    // Command errors
    #[error("Unknown command type: {command}")]
    CommandNotFound { command: String },

    #[error("Command execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("Invalid command context: {message}")]
    InvalidContext { message: String },

    #[error("Timed out after {millis}ms waiting for {operation}")]
    Timeout { operation: String, millis: u64 },

    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Telemetry storage errors
    #[error("Telemetry storage error: {message}")]
    Storage { message: String },

    // IPC errors
    #[error("IPC socket error: {message}")]
    IpcSocket { message: String },

    #[error("IPC protocol error: {message}")]
    IpcProtocol { message: String },

    #[error("IPC connection failed: {message}")]
    IpcConnection { message: String },

    // General I/O and serialization errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Stable error codes shared with hosts and telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotSupported,
    PermissionDenied,
    NetworkError,
    RecognitionError,
    CommandNotFound,
    ExecutionFailed,
    InvalidContext,
    Timeout,
    Internal,
}

impl VoiceError {
    /// Map the error onto its stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            VoiceError::NotSupported { .. } | VoiceError::NotInitialized => ErrorCode::NotSupported,
            VoiceError::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            VoiceError::Network { .. } => ErrorCode::NetworkError,
            VoiceError::Recognition { .. } | VoiceError::Synthesis { .. } => {
                ErrorCode::RecognitionError
            }
            VoiceError::CommandNotFound { .. } => ErrorCode::CommandNotFound,
            VoiceError::ExecutionFailed { .. } => ErrorCode::ExecutionFailed,
            VoiceError::InvalidContext { .. } => ErrorCode::InvalidContext,
            VoiceError::Timeout { .. } => ErrorCode::Timeout,
            _ => ErrorCode::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, VoiceError>;
