//! Daemon mode: hosts one voice session behind the IPC server.

pub mod handler;

use crate::clock::{SharedClock, SystemClock};
use crate::config::{Config, TelemetryConfig};
use crate::engines::console_engines;
use crate::error::{Result, VoiceError};
use crate::ipc::server::IpcServer;
use crate::runtime::{RuntimeOptions, spawn_session};
use crate::session::{SessionEngines, VoiceSession};
use crate::telemetry::{FileStore, KeyValueStore, MemoryStore, TelemetryTransport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::info;

/// Run the daemon: start the session, serve IPC, wait for shutdown.
///
/// Narration is printed to stdout and commands are read from stdin while
/// listening. With `listen`, listening starts right away.
pub async fn run_daemon(
    config: Config,
    socket_path: Option<PathBuf>,
    quiet: bool,
    listen: bool,
) -> Result<()> {
    let (synthesizer, recognizer, engine_events) = console_engines();
    let engines = SessionEngines {
        synthesizer: Box::new(synthesizer),
        recognizer: Box::new(recognizer),
        store: telemetry_store(&config.telemetry)?,
    };
    let clock: SharedClock = Arc::new(SystemClock);
    let mut session = VoiceSession::new(config.clone(), engines, clock.clone());
    if !session.initialize() && !quiet {
        eprintln!("Speech recognition unavailable, narration only.");
    }

    let (session_handle, session_task) = spawn_session(
        session,
        engine_events,
        RuntimeOptions {
            clock,
            command_timeout: Duration::from_millis(config.voice.command_timeout_ms),
            transport: telemetry_transport(&config.telemetry),
            send_interval: Duration::from_millis(config.telemetry.send_interval_ms),
        },
    );

    if listen {
        session_handle.call(|s| s.start_listening()).await??;
    }

    let socket_path = socket_path.unwrap_or_else(IpcServer::default_socket_path);
    let server = IpcServer::bind(socket_path)?;
    if !quiet {
        eprintln!(
            "IPC server listening at: {}",
            server.socket_path().display()
        );
        eprintln!("Daemon ready.");
    }

    let shutdown = Arc::new(Notify::new());
    let stop_server = Arc::new(Notify::new());
    let handler = handler::DaemonCommandHandler::new(session_handle.clone(), Arc::clone(&shutdown));
    let server_task = {
        let stop = Arc::clone(&stop_server);
        tokio::spawn(server.serve(handler, async move { stop.notified().await }))
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            if !quiet {
                eprintln!("\nReceived SIGINT, shutting down...");
            }
        }
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                eprintln!("Error setting up signal handler: {}", e);
            }
            if !quiet {
                eprintln!("\nReceived SIGTERM, shutting down...");
            }
        }
        _ = shutdown.notified() => {
            info!("Shutdown requested over IPC");
        }
    }

    // A stored permit covers a server task that has not polled yet.
    stop_server.notify_one();
    match server_task.await {
        Ok(Err(e)) => eprintln!("lesson-voice: IPC server failed: {e}"),
        Err(e) => eprintln!("lesson-voice: IPC server task failed: {e}"),
        Ok(Ok(())) => {}
    }

    if let Err(e) = session_handle.shutdown().await {
        eprintln!("lesson-voice: session shutdown failed: {e}");
    }
    if let Err(e) = session_task.await {
        eprintln!("lesson-voice: session task failed: {e}");
    }

    if !quiet {
        eprintln!("Daemon stopped.");
    }

    Ok(())
}

/// Where telemetry sessions are persisted.
pub fn telemetry_store(config: &TelemetryConfig) -> Result<Box<dyn KeyValueStore>> {
    if config.local_storage {
        Ok(Box::new(FileStore::open(&config.resolved_storage_dir())?))
    } else {
        Ok(Box::new(MemoryStore::new()))
    }
}

/// Uploader for queued telemetry, when an endpoint is configured.
#[cfg(feature = "upload")]
pub fn telemetry_transport(config: &TelemetryConfig) -> Option<Arc<dyn TelemetryTransport>> {
    config.endpoint.as_ref().map(|_| {
        Arc::new(crate::telemetry::HttpTransport::new()) as Arc<dyn TelemetryTransport>
    })
}

#[cfg(not(feature = "upload"))]
pub fn telemetry_transport(_config: &TelemetryConfig) -> Option<Arc<dyn TelemetryTransport>> {
    None
}

/// Wait for SIGTERM signal (used by systemd).
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| VoiceError::Other(format!("Failed to register SIGTERM handler: {}", e)))?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    // On non-Unix, just wait forever (Ctrl+C will still work)
    std::future::pending::<()>().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn local_storage_uses_storage_dir() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("telemetry");
        let config = TelemetryConfig {
            storage_dir: Some(dir.clone()),
            ..Default::default()
        };

        let mut store = telemetry_store(&config).unwrap();
        store.set("sample", "{}").unwrap();
        assert!(dir.join("sample.json").exists());
    }

    #[test]
    fn without_local_storage_nothing_touches_disk() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("telemetry");
        let config = TelemetryConfig {
            local_storage: false,
            storage_dir: Some(dir.clone()),
            ..Default::default()
        };

        let mut store = telemetry_store(&config).unwrap();
        store.set("sample", "{}").unwrap();
        assert_eq!(store.get("sample").unwrap().as_deref(), Some("{}"));
        assert!(!dir.exists());
    }

    #[cfg(feature = "upload")]
    #[test]
    fn transport_only_with_endpoint() {
        assert!(telemetry_transport(&TelemetryConfig::default()).is_none());
        let config = TelemetryConfig {
            endpoint: Some("http://localhost:9/telemetry".to_string()),
            ..Default::default()
        };
        assert!(telemetry_transport(&config).is_some());
    }
}
