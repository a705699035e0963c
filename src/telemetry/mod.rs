//! Telemetry: an append-only record of voice activity, kept per session.

pub mod event;
pub mod service;
pub mod stats;
pub mod storage;
pub mod transport;

pub use event::{Performance, TelemetryContext, TelemetryEvent, TelemetryEventType};
pub use service::TelemetryService;
pub use stats::SessionStats;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
#[cfg(feature = "upload")]
pub use transport::HttpTransport;
pub use transport::{MockTransport, TelemetryTransport, flush};

use std::sync::{Arc, Mutex, MutexGuard};

/// Shared handle to a session's telemetry service.
#[derive(Debug, Clone)]
pub struct TelemetryHandle {
    inner: Arc<Mutex<TelemetryService>>,
}

impl TelemetryHandle {
    pub fn new(service: TelemetryService) -> Self {
        Self {
            inner: Arc::new(Mutex::new(service)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, TelemetryService> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stamp an event with the current session and time, then record it.
    pub fn track(&self, event_type: TelemetryEventType) {
        let mut service = self.lock();
        let event = service.event(event_type);
        service.track_event(event);
    }

    /// Record an event built from the current session id and timestamp.
    pub fn track_with(&self, build: impl FnOnce(&str, i64) -> TelemetryEvent) {
        let mut service = self.lock();
        let session_id = service.current_session().unwrap_or("").to_string();
        let event = build(&session_id, service.now_millis());
        service.track_event(event);
    }
}
