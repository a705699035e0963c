//! Per-session aggregates, derived purely from the event list.

use crate::telemetry::event::{TelemetryEvent, TelemetryEventType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    /// Events excluding the session start and end markers.
    pub total_events: usize,
    pub commands_detected: usize,
    pub commands_executed: usize,
    pub commands_failed: usize,
    pub barge_in_events: usize,
    pub recognition_errors: usize,
    pub average_latency: f64,
    pub total_latency: f64,
    pub latency_measurements: usize,
    /// Detections per command type.
    pub command_types: BTreeMap<String, usize>,
}

impl SessionStats {
    /// Aggregate a session's events. Only `HF_COMMAND_LATENCY` events feed
    /// the latency figures.
    pub fn from_events(events: &[TelemetryEvent]) -> Self {
        let mut stats = SessionStats::default();

        for event in events {
            if event.event_type.is_session_boundary() {
                continue;
            }
            stats.total_events += 1;
            match event.event_type {
                TelemetryEventType::CommandDetected => {
                    stats.commands_detected += 1;
                    if let Some(command_type) = event.command_type() {
                        *stats
                            .command_types
                            .entry(command_type.to_string())
                            .or_default() += 1;
                    }
                }
                TelemetryEventType::CommandExecuted => stats.commands_executed += 1,
                TelemetryEventType::CommandFailed => stats.commands_failed += 1,
                TelemetryEventType::BargeIn => stats.barge_in_events += 1,
                TelemetryEventType::RecognitionError => stats.recognition_errors += 1,
                TelemetryEventType::CommandLatency => {
                    if let Some(latency) = event.latency() {
                        stats.total_latency += latency;
                        stats.latency_measurements += 1;
                    }
                }
                _ => {}
            }
        }

        if stats.latency_measurements > 0 {
            stats.average_latency = stats.total_latency / stats.latency_measurements as f64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::VoiceCommandType;

    #[test]
    fn empty_session_has_zero_stats() {
        assert_eq!(SessionStats::from_events(&[]), SessionStats::default());
    }

    #[test]
    fn counts_by_type_and_tallies_commands() {
        let events = vec![
            TelemetryEvent::new(TelemetryEventType::SessionStart, "s", 0),
            TelemetryEvent::command_detected("s", 1, VoiceCommandType::Repeat, 1.0, "repeat"),
            TelemetryEvent::command_detected("s", 2, VoiceCommandType::Repeat, 0.9, "again"),
            TelemetryEvent::command_detected("s", 3, VoiceCommandType::Pause, 1.0, "pause"),
            TelemetryEvent::command_executed("s", 4, VoiceCommandType::Repeat, true, 5.0),
            TelemetryEvent::command_executed("s", 5, VoiceCommandType::Pause, false, 7.0),
            TelemetryEvent::recognition_error("s", 6, "network", Some("network")),
            TelemetryEvent::latency_measurement("s", 7, "command_execution", 10.0),
            TelemetryEvent::latency_measurement("s", 8, "command_execution", 20.0),
            TelemetryEvent::new(TelemetryEventType::SessionEnd, "s", 9),
        ];

        let stats = SessionStats::from_events(&events);

        assert_eq!(stats.total_events, 8);
        assert_eq!(stats.commands_detected, 3);
        assert_eq!(stats.commands_executed, 1);
        assert_eq!(stats.commands_failed, 1);
        assert_eq!(stats.recognition_errors, 1);
        assert_eq!(stats.command_types["repeat"], 2);
        assert_eq!(stats.command_types["pause"], 1);
        // Execution latencies are not latency measurements.
        assert_eq!(stats.latency_measurements, 2);
        assert_eq!(stats.average_latency, 15.0);
    }
}
