//! Telemetry survives restarts through the on-disk store.

use lesson_voice::config::{Config, TelemetryConfig};
use lesson_voice::narration::MockSynthesizer;
use lesson_voice::recognition::MockRecognizer;
use lesson_voice::session::{SessionEngines, VoiceSession};
use lesson_voice::telemetry::{
    FileStore, MockTransport, TelemetryEventType, TelemetryHandle, TelemetryService, flush,
};
use lesson_voice::{ManualClock, VoiceCommandType};
use std::path::Path;
use tempfile::TempDir;

fn file_service(dir: &Path, config: TelemetryConfig, clock: &ManualClock) -> TelemetryService {
    TelemetryService::new(
        config,
        Box::new(FileStore::open(dir).unwrap()),
        clock.shared(),
    )
}

#[test]
fn sessions_reload_from_disk() {
    let temp_dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    {
        let mut telemetry = file_service(temp_dir.path(), TelemetryConfig::default(), &clock);
        telemetry.start_session("s1");
        for event_type in [
            TelemetryEventType::RecognitionStart,
            TelemetryEventType::Pause,
            TelemetryEventType::Resume,
        ] {
            clock.advance_ms(10);
            let event = telemetry.event(event_type);
            telemetry.track_event(event);
        }
        let stats = telemetry.end_session("s1").unwrap();
        assert_eq!(stats.total_events, 3);
    }

    let telemetry = file_service(temp_dir.path(), TelemetryConfig::default(), &clock);
    let types: Vec<_> = telemetry
        .session("s1")
        .iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        types,
        vec![
            TelemetryEventType::SessionStart,
            TelemetryEventType::RecognitionStart,
            TelemetryEventType::Pause,
            TelemetryEventType::Resume,
            TelemetryEventType::SessionEnd,
        ]
    );
    assert_eq!(telemetry.current_session(), None);
}

#[test]
fn voice_session_history_outlives_the_session() {
    let temp_dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let config = Config::default();

    let session_id = {
        let store = FileStore::open(temp_dir.path()).unwrap();
        let mut session = VoiceSession::new(
            config.clone(),
            SessionEngines::new(
                Box::new(MockSynthesizer::new()),
                Box::new(MockRecognizer::new()),
            )
            .with_store(Box::new(store)),
            clock.shared(),
        );
        session.initialize();
        session.execute_command(VoiceCommandType::VolumeDown).unwrap();
        let session_id = session.service().session_id().to_string();
        session.shutdown();
        session_id
    };

    let telemetry = file_service(temp_dir.path(), config.telemetry, &clock);
    let events = telemetry.session(&session_id);
    assert!(
        events
            .iter()
            .any(|e| e.event_type == TelemetryEventType::VolumeChange)
    );
    assert_eq!(
        events.last().map(|e| e.event_type),
        Some(TelemetryEventType::SessionEnd)
    );
}

#[tokio::test]
async fn failed_upload_stays_queued_across_restart() {
    let temp_dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let config = TelemetryConfig {
        endpoint: Some("http://localhost:9/telemetry".to_string()),
        ..Default::default()
    };

    let handle = TelemetryHandle::new(file_service(temp_dir.path(), config.clone(), &clock));
    handle.lock().start_session("s1");
    let transport = MockTransport::failing();
    assert_eq!(flush(&handle, &transport).await, 0);
    assert_eq!(handle.lock().queue_len(), 1);
    drop(handle);

    let handle = TelemetryHandle::new(file_service(temp_dir.path(), config, &clock));
    assert_eq!(handle.lock().queue_len(), 1);
    transport.set_failing(false);
    assert_eq!(flush(&handle, &transport).await, 1);
    assert_eq!(handle.lock().queue_len(), 0);
    assert_eq!(
        transport.batches()[0][0].event_type,
        TelemetryEventType::SessionStart
    );
}
