//! Batched delivery of queued telemetry to a remote endpoint.

use crate::error::{Result, VoiceError};
use crate::telemetry::TelemetryHandle;
use crate::telemetry::event::TelemetryEvent;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[async_trait]
pub trait TelemetryTransport: Send + Sync {
    /// Deliver one batch. An error means the whole batch should be retried.
    async fn send(&self, endpoint: &str, events: &[TelemetryEvent]) -> Result<()>;
}

/// POSTs `{"events": [...]}` as JSON.
#[cfg(feature = "upload")]
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

#[cfg(feature = "upload")]
impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "upload")]
#[async_trait]
impl TelemetryTransport for HttpTransport {
    async fn send(&self, endpoint: &str, events: &[TelemetryEvent]) -> Result<()> {
        let body = serde_json::to_string(&serde_json::json!({ "events": events }))?;
        let response = self
            .client
            .post(endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| VoiceError::Network {
                message: format!("Failed to send telemetry: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(VoiceError::Network {
                message: format!("Telemetry endpoint returned status {}", response.status()),
            });
        }
        Ok(())
    }
}

/// Records batches instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    batches: Arc<Mutex<Vec<Vec<TelemetryEvent>>>>,
    fail: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send fail until reset with `set_failing(false)`.
    pub fn failing() -> Self {
        let transport = Self::default();
        transport.set_failing(true);
        transport
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<Vec<TelemetryEvent>> {
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl TelemetryTransport for MockTransport {
    async fn send(&self, _endpoint: &str, events: &[TelemetryEvent]) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(VoiceError::Network {
                message: "mock transport failure".to_string(),
            });
        }
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(events.to_vec());
        Ok(())
    }
}

/// Send the pending queue once. The lock is not held across the send; a
/// failed batch goes back in front of anything queued meanwhile.
///
/// Returns the number of events delivered.
pub async fn flush(handle: &TelemetryHandle, transport: &dyn TelemetryTransport) -> usize {
    let (endpoint, batch) = {
        let mut service = handle.lock();
        let Some(endpoint) = service.config().endpoint.clone() else {
            return 0;
        };
        if !service.config().enabled {
            return 0;
        }
        (endpoint, service.take_batch())
    };

    if batch.is_empty() {
        return 0;
    }

    match transport.send(&endpoint, &batch).await {
        Ok(()) => {
            tracing::debug!("Flushed {} telemetry events", batch.len());
            batch.len()
        }
        Err(e) => {
            tracing::warn!("Telemetry flush failed, re-queueing {} events: {}", batch.len(), e);
            handle.lock().requeue_front(batch);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{TelemetryConfig, TelemetryConfigUpdate};
    use crate::telemetry::{TelemetryEventType, TelemetryService};

    fn handle_with_endpoint() -> TelemetryHandle {
        let config = TelemetryConfig {
            endpoint: Some("http://telemetry.invalid/events".to_string()),
            ..TelemetryConfig::default()
        };
        TelemetryHandle::new(TelemetryService::in_memory(config, ManualClock::new().shared()))
    }

    fn track(handle: &TelemetryHandle, event_type: TelemetryEventType) {
        let mut service = handle.lock();
        let event = service.event(event_type);
        service.track_event(event);
    }

    #[tokio::test]
    async fn flush_sends_queue_as_one_batch() {
        let handle = handle_with_endpoint();
        track(&handle, TelemetryEventType::Pause);
        track(&handle, TelemetryEventType::Resume);
        let transport = MockTransport::new();

        assert_eq!(flush(&handle, &transport).await, 2);
        assert_eq!(transport.batches().len(), 1);
        assert_eq!(handle.lock().queue_len(), 0);
        assert_eq!(flush(&handle, &transport).await, 0);
        assert_eq!(transport.batches().len(), 1);
    }

    #[tokio::test]
    async fn failed_flush_requeues_before_newer_events() {
        let handle = handle_with_endpoint();
        track(&handle, TelemetryEventType::Pause);
        let transport = MockTransport::failing();

        assert_eq!(flush(&handle, &transport).await, 0);
        track(&handle, TelemetryEventType::Stop);

        transport.set_failing(false);
        assert_eq!(flush(&handle, &transport).await, 2);
        let sent: Vec<_> = transport.batches()[0]
            .iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(sent, vec![TelemetryEventType::Pause, TelemetryEventType::Stop]);
    }

    #[tokio::test]
    async fn no_endpoint_means_nothing_queued_or_sent() {
        let handle = TelemetryHandle::new(TelemetryService::in_memory(
            TelemetryConfig::default(),
            ManualClock::new().shared(),
        ));
        track(&handle, TelemetryEventType::Pause);
        assert_eq!(handle.lock().queue_len(), 0);

        handle.lock().configure(&TelemetryConfigUpdate {
            endpoint: Some("http://telemetry.invalid".to_string()),
            ..Default::default()
        });
        track(&handle, TelemetryEventType::Pause);
        let transport = MockTransport::new();
        assert_eq!(flush(&handle, &transport).await, 1);
    }
}
