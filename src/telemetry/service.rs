//! Session-bracketed event log with bounded persistence and a send queue.

use crate::clock::SharedClock;
use crate::config::{TelemetryConfig, TelemetryConfigUpdate};
use crate::defaults;
use crate::error::Result;
use crate::telemetry::event::{TelemetryContext, TelemetryEvent, TelemetryEventType};
use crate::telemetry::stats::SessionStats;
use crate::telemetry::storage::{KeyValueStore, MemoryStore};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use std::collections::{BTreeMap, VecDeque};

/// Telemetry records what the voice services do; it never feeds back into
/// their control flow, so every failure here is logged and swallowed.
pub struct TelemetryService {
    config: TelemetryConfig,
    store: Box<dyn KeyValueStore>,
    clock: SharedClock,
    sessions: BTreeMap<String, Vec<TelemetryEvent>>,
    current_session: Option<String>,
    queue: VecDeque<TelemetryEvent>,
}

impl std::fmt::Debug for TelemetryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryService")
            .field("config", &self.config)
            .field("sessions", &self.sessions.len())
            .field("current_session", &self.current_session)
            .field("queue", &self.queue.len())
            .finish()
    }
}

impl TelemetryService {
    /// Build the service and reload whatever `store` holds from a previous run.
    pub fn new(config: TelemetryConfig, store: Box<dyn KeyValueStore>, clock: SharedClock) -> Self {
        let mut service = Self {
            config,
            store,
            clock,
            sessions: BTreeMap::new(),
            current_session: None,
            queue: VecDeque::new(),
        };
        if service.config.local_storage {
            service.load();
        }
        service
    }

    pub fn in_memory(config: TelemetryConfig, clock: SharedClock) -> Self {
        Self::new(config, Box::new(MemoryStore::new()), clock)
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn configure(&mut self, update: &TelemetryConfigUpdate) {
        update.apply_to(&mut self.config);
        tracing::debug!("Telemetry reconfigured: {:?}", self.config);
    }

    /// A blank event stamped with the current session and time.
    pub fn event(&self, event_type: TelemetryEventType) -> TelemetryEvent {
        let session_id = self.current_session.as_deref().unwrap_or("");
        TelemetryEvent::new(event_type, session_id, self.clock.epoch_millis())
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.epoch_millis()
    }

    pub fn track_event(&mut self, event: TelemetryEvent) {
        if !self.config.enabled {
            return;
        }
        let Some(session_id) = self.current_session.clone() else {
            self.enqueue(event);
            self.persist();
            return;
        };
        self.record(&session_id, event);
    }

    /// Make `session_id` current and log its start marker.
    pub fn start_session(&mut self, session_id: &str) {
        self.current_session = Some(session_id.to_string());
        self.sessions.entry(session_id.to_string()).or_default();

        let now = self.clock.epoch_millis();
        let event = TelemetryEvent::new(TelemetryEventType::SessionStart, session_id, now)
            .with_data("language", defaults::DEFAULT_LANGUAGE)
            .with_context(TelemetryContext::new("session_start").with_mic_permission("unknown"));
        if self.config.enabled {
            self.record(session_id, event);
        }
        tracing::info!("Telemetry session started: {}", session_id);
    }

    /// Log the end marker with the session's statistics. Returns `None` for
    /// an unknown session.
    pub fn end_session(&mut self, session_id: &str) -> Option<SessionStats> {
        let events = self.sessions.get(session_id)?;
        let stats = SessionStats::from_events(events);
        let now = self.clock.epoch_millis();
        let started = events.first().map_or(now, |e| e.timestamp);

        let mut event = TelemetryEvent::new(TelemetryEventType::SessionEnd, session_id, now)
            .with_context(TelemetryContext::new("session_end").with_mic_permission("unknown"));
        if let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(&stats) {
            event.data = fields;
        }
        event = event.with_data("duration", now - started);

        if self.config.enabled {
            self.record(session_id, event);
        }
        if self.current_session.as_deref() == Some(session_id) {
            self.current_session = None;
        }
        tracing::info!(
            "Telemetry session ended: {} ({} events)",
            session_id,
            stats.total_events
        );
        Some(stats)
    }

    pub fn current_session(&self) -> Option<&str> {
        self.current_session.as_deref()
    }

    /// Events of one session in recording order; empty when unknown.
    pub fn session(&self, session_id: &str) -> &[TelemetryEvent] {
        self.sessions
            .get(session_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    pub fn session_stats(&self, session_id: &str) -> SessionStats {
        SessionStats::from_events(self.session(session_id))
    }

    pub fn total_events(&self) -> usize {
        self.sessions.values().map(Vec::len).sum()
    }

    pub fn export_session(&self, session_id: &str) -> Result<String> {
        let events = self.session(session_id);
        let export = json!({
            "sessionId": session_id,
            "stats": SessionStats::from_events(events),
            "events": events,
            "exportedAt": self.exported_at(),
            "config": self.config,
        });
        Ok(serde_json::to_string_pretty(&export)?)
    }

    pub fn export_all_sessions(&self) -> Result<String> {
        let export = json!({
            "sessions": self.sessions,
            "config": self.config,
            "exportedAt": self.exported_at(),
        });
        Ok(serde_json::to_string_pretty(&export)?)
    }

    /// Forget every session and the send queue, including persisted copies.
    pub fn clear_sessions(&mut self) {
        self.sessions.clear();
        self.queue.clear();
        if self.config.local_storage {
            for key in [defaults::SESSIONS_KEY, defaults::QUEUE_KEY] {
                if let Err(e) = self.store.remove(key) {
                    tracing::warn!("Failed to clear telemetry storage: {}", e);
                }
            }
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Drain the send queue.
    pub fn take_batch(&mut self) -> Vec<TelemetryEvent> {
        let batch: Vec<_> = self.queue.drain(..).collect();
        if !batch.is_empty() {
            self.persist();
        }
        batch
    }

    /// Put a failed batch back ahead of anything queued since.
    pub fn requeue_front(&mut self, batch: Vec<TelemetryEvent>) {
        for event in batch.into_iter().rev() {
            self.queue.push_front(event);
        }
        self.persist();
    }

    fn record(&mut self, session_id: &str, event: TelemetryEvent) {
        if self.config.debug_mode {
            tracing::debug!("Telemetry event {:?} in {}", event.event_type, session_id);
        }
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .push(event.clone());
        self.enqueue(event);
        self.evict();
        self.persist();
    }

    fn enqueue(&mut self, event: TelemetryEvent) {
        if self.config.endpoint.is_some() {
            self.queue.push_back(event);
        }
    }

    /// Drop whole non-current sessions, oldest first, until the total is back
    /// under `max_events`.
    fn evict(&mut self) {
        let total = self.total_events();
        if total <= self.config.max_events {
            return;
        }
        let mut excess = total - self.config.max_events;

        let mut by_age: Vec<(i64, String)> = self
            .sessions
            .iter()
            .map(|(id, events)| (events.first().map_or(0, |e| e.timestamp), id.clone()))
            .collect();
        by_age.sort();

        for (_, id) in by_age {
            if excess == 0 {
                break;
            }
            if self.current_session.as_deref() == Some(id.as_str()) {
                continue;
            }
            if let Some(events) = self.sessions.remove(&id) {
                tracing::debug!("Evicted telemetry session {} ({} events)", id, events.len());
                excess = excess.saturating_sub(events.len());
            }
        }
    }

    fn persist(&mut self) {
        if !self.config.local_storage {
            return;
        }
        if let Err(e) = self.save() {
            tracing::warn!("Failed to persist telemetry: {}", e);
        }
    }

    fn save(&mut self) -> Result<()> {
        let sessions = serde_json::to_string(&self.sessions)?;
        let queue = serde_json::to_string(&self.queue)?;
        self.store.set(defaults::SESSIONS_KEY, &sessions)?;
        self.store.set(defaults::QUEUE_KEY, &queue)
    }

    fn load(&mut self) {
        match self.store.get(defaults::SESSIONS_KEY) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(sessions) => self.sessions = sessions,
                Err(e) => tracing::warn!("Ignoring unreadable telemetry sessions: {}", e),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to load telemetry sessions: {}", e),
        }
        match self.store.get(defaults::QUEUE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(queue) => self.queue = queue,
                Err(e) => tracing::warn!("Ignoring unreadable telemetry queue: {}", e),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to load telemetry queue: {}", e),
        }
    }

    fn exported_at(&self) -> String {
        DateTime::<Utc>::from_timestamp_millis(self.clock.epoch_millis())
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::commands::VoiceCommandType;

    fn service() -> (TelemetryService, ManualClock) {
        let clock = ManualClock::new();
        (
            TelemetryService::in_memory(TelemetryConfig::default(), clock.shared()),
            clock,
        )
    }

    fn types(events: &[TelemetryEvent]) -> Vec<TelemetryEventType> {
        events.iter().map(|e| e.event_type).collect()
    }

    #[test]
    fn session_brackets_tracked_events() {
        let (mut telemetry, _clock) = service();
        telemetry.start_session("s1");
        for event_type in [
            TelemetryEventType::Pause,
            TelemetryEventType::Resume,
            TelemetryEventType::Stop,
        ] {
            let event = telemetry.event(event_type);
            telemetry.track_event(event);
        }
        let stats = telemetry.end_session("s1").unwrap();

        let events = telemetry.session("s1");
        assert_eq!(
            types(events),
            vec![
                TelemetryEventType::SessionStart,
                TelemetryEventType::Pause,
                TelemetryEventType::Resume,
                TelemetryEventType::Stop,
                TelemetryEventType::SessionEnd,
            ]
        );
        assert_eq!(stats.total_events, 3);
        assert_eq!(events.len(), stats.total_events + 2);
        assert_eq!(telemetry.current_session(), None);
    }

    #[test]
    fn end_of_unknown_session_is_none() {
        let (mut telemetry, _clock) = service();
        assert!(telemetry.end_session("missing").is_none());
        assert!(telemetry.session("missing").is_empty());
    }

    #[test]
    fn events_without_session_are_not_recorded() {
        let (mut telemetry, _clock) = service();
        let event = telemetry.event(TelemetryEventType::Pause);
        telemetry.track_event(event);
        assert_eq!(telemetry.total_events(), 0);
    }

    #[test]
    fn disabled_service_records_nothing() {
        let (mut telemetry, _clock) = service();
        telemetry.configure(&TelemetryConfigUpdate {
            enabled: Some(false),
            ..Default::default()
        });
        telemetry.start_session("s1");
        let event = telemetry.event(TelemetryEventType::Pause);
        telemetry.track_event(event);
        assert!(telemetry.session("s1").is_empty());
    }

    #[test]
    fn end_marker_carries_stats_and_duration() {
        let (mut telemetry, clock) = service();
        telemetry.start_session("s1");
        let event = TelemetryEvent::command_detected(
            "s1",
            telemetry.now_millis(),
            VoiceCommandType::Repeat,
            1.0,
            "repeat",
        );
        telemetry.track_event(event);
        clock.advance_ms(1500);
        telemetry.end_session("s1");

        let end = telemetry.session("s1").last().unwrap();
        assert_eq!(end.data["commandsDetected"], 1);
        assert_eq!(end.data["duration"], 1500);
        assert_eq!(end.data["commandTypes"]["repeat"], 1);
    }

    #[test]
    fn eviction_drops_oldest_non_current_sessions_whole() {
        let clock = ManualClock::new();
        let config = TelemetryConfig {
            max_events: 5,
            ..TelemetryConfig::default()
        };
        let mut telemetry = TelemetryService::in_memory(config, clock.shared());

        telemetry.start_session("old");
        telemetry.end_session("old");
        clock.advance_ms(10);
        telemetry.start_session("middle");
        telemetry.end_session("middle");
        clock.advance_ms(10);
        telemetry.start_session("live");
        for _ in 0..3 {
            let event = telemetry.event(TelemetryEventType::Pause);
            telemetry.track_event(event);
        }

        assert_eq!(telemetry.session_ids(), vec!["live".to_string()]);
        assert_eq!(telemetry.session("live").len(), 4);

        for _ in 0..3 {
            let event = telemetry.event(TelemetryEventType::Pause);
            telemetry.track_event(event);
        }
        // The current session is never truncated, even over the limit.
        assert_eq!(telemetry.session("live").len(), 7);
    }

    #[test]
    fn export_session_shape() {
        let (mut telemetry, _clock) = service();
        telemetry.start_session("s1");
        let json = telemetry.export_session("s1").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["sessionId"], "s1");
        assert_eq!(value["events"].as_array().unwrap().len(), 1);
        assert_eq!(value["stats"]["totalEvents"], 0);
        assert_eq!(value["config"]["max_events"], 1000);
        assert!(value["exportedAt"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn export_all_lists_every_session() {
        let (mut telemetry, _clock) = service();
        telemetry.start_session("a");
        telemetry.start_session("b");
        let json = telemetry.export_all_sessions().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["sessions"]["a"].is_array());
        assert!(value["sessions"]["b"].is_array());
    }

    #[test]
    fn sessions_reload_from_store() {
        let clock = ManualClock::new();
        let store = MemoryStore::new();
        {
            let mut telemetry = TelemetryService::new(
                TelemetryConfig::default(),
                Box::new(store.clone()),
                clock.shared(),
            );
            telemetry.start_session("s1");
            telemetry.end_session("s1");
        }
        let telemetry =
            TelemetryService::new(TelemetryConfig::default(), Box::new(store), clock.shared());
        assert_eq!(telemetry.session("s1").len(), 2);
    }

    #[test]
    fn clear_sessions_empties_store() {
        let clock = ManualClock::new();
        let store = MemoryStore::new();
        let mut telemetry = TelemetryService::new(
            TelemetryConfig::default(),
            Box::new(store.clone()),
            clock.shared(),
        );
        telemetry.start_session("s1");
        assert!(!store.is_empty());

        telemetry.clear_sessions();
        assert!(store.is_empty());
        assert!(telemetry.session_ids().is_empty());
    }

    #[test]
    fn local_storage_off_never_touches_store() {
        let clock = ManualClock::new();
        let store = MemoryStore::new();
        let config = TelemetryConfig {
            local_storage: false,
            ..TelemetryConfig::default()
        };
        let mut telemetry = TelemetryService::new(config, Box::new(store.clone()), clock.shared());
        telemetry.start_session("s1");
        assert!(store.is_empty());
    }
}
