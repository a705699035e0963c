//! Telemetry record types and constructors for the common events.

use crate::commands::{BargeInEvent, VoiceCommandType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TelemetryEventType {
    #[serde(rename = "HF_COMMAND_DETECTED")]
    CommandDetected,
    #[serde(rename = "HF_COMMAND_EXECUTED")]
    CommandExecuted,
    #[serde(rename = "HF_COMMAND_FAILED")]
    CommandFailed,
    #[serde(rename = "HF_REPEAT")]
    Repeat,
    #[serde(rename = "HF_PAUSE")]
    Pause,
    #[serde(rename = "HF_RESUME")]
    Resume,
    #[serde(rename = "HF_STOP")]
    Stop,
    #[serde(rename = "HF_BARGE_IN")]
    BargeIn,
    #[serde(rename = "HF_VOLUME_CHANGE")]
    VolumeChange,
    #[serde(rename = "HF_RATE_CHANGE")]
    RateChange,
    #[serde(rename = "HF_RECOGNITION_START")]
    RecognitionStart,
    #[serde(rename = "HF_RECOGNITION_END")]
    RecognitionEnd,
    #[serde(rename = "HF_RECOGNITION_ERROR")]
    RecognitionError,
    #[serde(rename = "HF_CONTROLS_SHOW")]
    ControlsShow,
    #[serde(rename = "HF_CONTROLS_HIDE")]
    ControlsHide,
    #[serde(rename = "HF_SESSION_START")]
    SessionStart,
    #[serde(rename = "HF_SESSION_END")]
    SessionEnd,
    #[serde(rename = "HF_COMMAND_LATENCY")]
    CommandLatency,
    #[serde(rename = "HF_ACCURACY_CHECK")]
    AccuracyCheck,
}

impl TelemetryEventType {
    pub fn is_session_boundary(&self) -> bool {
        matches!(
            self,
            TelemetryEventType::SessionStart | TelemetryEventType::SessionEnd
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    /// Milliseconds from detection to completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryContext {
    pub page: String,
    pub phase: String,
    pub user_agent: String,
    pub audio_supported: bool,
    pub mic_permission: String,
}

impl TelemetryContext {
    pub fn new(phase: &str) -> Self {
        Self {
            page: "lesson".to_string(),
            phase: phase.to_string(),
            user_agent: format!("lesson-voice/{}", crate::version_string()),
            audio_supported: true,
            mic_permission: "granted".to_string(),
        }
    }

    pub fn with_mic_permission(mut self, permission: &str) -> Self {
        self.mic_permission = permission.to_string();
        self
    }

    pub fn with_audio_supported(mut self, supported: bool) -> Self {
        self.audio_supported = supported;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    #[serde(rename = "type")]
    pub event_type: TelemetryEventType,
    pub timestamp: i64,
    pub session_id: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<Performance>,
    pub context: TelemetryContext,
}

impl TelemetryEvent {
    pub fn new(event_type: TelemetryEventType, session_id: &str, timestamp: i64) -> Self {
        Self {
            event_type,
            timestamp,
            session_id: session_id.to_string(),
            data: Map::new(),
            performance: None,
            context: TelemetryContext::new("unknown"),
        }
    }

    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn with_latency(mut self, latency_ms: f64) -> Self {
        self.performance.get_or_insert_with(Performance::default).latency = Some(latency_ms);
        self
    }

    pub fn with_phase(mut self, phase: &str) -> Self {
        self.context.phase = phase.to_string();
        self
    }

    pub fn with_context(mut self, context: TelemetryContext) -> Self {
        self.context = context;
        self
    }

    pub fn latency(&self) -> Option<f64> {
        self.performance.as_ref().and_then(|p| p.latency)
    }

    /// `data.commandType`, when present.
    pub fn command_type(&self) -> Option<&str> {
        self.data.get("commandType").and_then(Value::as_str)
    }

    pub fn command_detected(
        session_id: &str,
        timestamp: i64,
        command_type: VoiceCommandType,
        confidence: f32,
        raw_text: &str,
    ) -> Self {
        Self::new(TelemetryEventType::CommandDetected, session_id, timestamp)
            .with_data("commandType", command_type.as_str())
            .with_data("confidence", json!(confidence))
            .with_data("rawText", raw_text)
            .with_phase("detection")
    }

    /// `HF_COMMAND_EXECUTED` or `HF_COMMAND_FAILED`, with the execution time
    /// as latency.
    pub fn command_executed(
        session_id: &str,
        timestamp: i64,
        command_type: VoiceCommandType,
        success: bool,
        execution_ms: f64,
    ) -> Self {
        let event_type = if success {
            TelemetryEventType::CommandExecuted
        } else {
            TelemetryEventType::CommandFailed
        };
        Self::new(event_type, session_id, timestamp)
            .with_data("commandType", command_type.as_str())
            .with_data("success", success)
            .with_data("executionTime", execution_ms)
            .with_latency(execution_ms)
            .with_phase("execution")
    }

    pub fn barge_in(session_id: &str, timestamp: i64, event: &BargeInEvent) -> Self {
        Self::new(TelemetryEventType::BargeIn, session_id, timestamp)
            .with_data("interruptedContent", event.original_content.as_str())
            .with_data("interruptionTime", event.interrupted_at)
            .with_data("commandType", event.command_type.as_str())
            .with_data("positionMs", event.position_ms)
            .with_phase("barge_in")
    }

    pub fn recognition_error(
        session_id: &str,
        timestamp: i64,
        message: &str,
        code: Option<&str>,
    ) -> Self {
        let mut event = Self::new(TelemetryEventType::RecognitionError, session_id, timestamp)
            .with_data("errorMessage", message)
            .with_phase("recognition")
            .with_context(TelemetryContext::new("recognition").with_mic_permission("unknown"));
        if let Some(code) = code {
            event = event.with_data("errorCode", code);
        }
        event
    }

    pub fn latency_measurement(
        session_id: &str,
        timestamp: i64,
        operation: &str,
        latency_ms: f64,
    ) -> Self {
        Self::new(TelemetryEventType::CommandLatency, session_id, timestamp)
            .with_data("operationType", operation)
            .with_latency(latency_ms)
    }
}
