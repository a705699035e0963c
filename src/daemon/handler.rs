//! Command handler implementation for the daemon.

use crate::error::Result;
use crate::ipc::protocol::{Command, Response};
use crate::ipc::server::CommandHandler;
use crate::narration::SpeakOptions;
use crate::runtime::SessionHandle;
use crate::session::VoiceSession;
use std::sync::Arc;
use tokio::sync::Notify;

/// Command handler for daemon IPC commands.
pub struct DaemonCommandHandler {
    session: SessionHandle,
    shutdown: Arc<Notify>,
}

impl DaemonCommandHandler {
    /// `shutdown` is notified when a client asks the daemon to exit.
    pub fn new(session: SessionHandle, shutdown: Arc<Notify>) -> Self {
        Self { session, shutdown }
    }

    /// Run `job` on the session task and turn its result into a response.
    async fn run<T, F>(&self, job: F, respond: impl FnOnce(T) -> Response) -> Response
    where
        T: Send + 'static,
        F: FnOnce(&mut VoiceSession) -> Result<T> + Send + 'static,
    {
        match self.session.call(job).await.and_then(|result| result) {
            Ok(value) => respond(value),
            Err(e) => Response::from(e),
        }
    }

    async fn get_status(&self) -> Response {
        self.run(
            |s| Ok((s.service().session_id().to_string(), s.snapshot())),
            |(session_id, snapshot)| Response::Status {
                session_id,
                snapshot,
            },
        )
        .await
    }
}

fn ok<T>(_: T) -> Response {
    Response::Ok
}

#[async_trait::async_trait]
impl CommandHandler for DaemonCommandHandler {
    async fn handle(&self, command: Command) -> Response {
        match command {
            Command::Start => self.run(|s| s.start_listening(), ok).await,
            Command::Stop => {
                self.run(
                    |s| {
                        s.stop_listening();
                        Ok(())
                    },
                    ok,
                )
                .await
            }
            Command::Toggle => self.run(|s| s.toggle_listening(), ok).await,
            Command::Status => self.get_status().await,
            Command::Say { text } => {
                self.run(move |s| Ok(s.speak(text, SpeakOptions::default())), ok)
                    .await
            }
            Command::Execute { command } => {
                self.run(
                    move |s| s.execute_command(command),
                    |outcome| Response::Outcome { outcome },
                )
                .await
            }
            Command::Pause => self.run(|s| Ok(s.pause_speech()), ok).await,
            Command::Resume => self.run(|s| Ok(s.resume_speech()), ok).await,
            Command::Repeat => self.run(|s| Ok(s.repeat_speech()), ok).await,
            Command::Cancel => {
                self.run(
                    |s| {
                        s.stop_speech();
                        Ok(())
                    },
                    ok,
                )
                .await
            }
            Command::SetVolume { volume } => {
                self.run(move |s| Ok(s.set_volume(volume)), |value| Response::Level {
                    value,
                })
                .await
            }
            Command::SetRate { rate } => {
                self.run(move |s| Ok(s.set_rate(rate)), |value| Response::Level {
                    value,
                })
                .await
            }
            Command::Commands => {
                self.run(
                    |s| Ok(s.available_commands()),
                    |commands| Response::Commands { commands },
                )
                .await
            }
            Command::ExportSession => {
                self.run(
                    |s| {
                        let session_id = s.service().session_id().to_string();
                        s.telemetry().lock().export_session(&session_id)
                    },
                    |json| Response::Export { json },
                )
                .await
            }
            Command::Shutdown => {
                self.shutdown.notify_one();
                Response::Ok
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{SharedClock, SystemClock};
    use crate::commands::VoiceCommandType;
    use crate::config::Config;
    use crate::engines::EngineEvents;
    use crate::error::ErrorCode;
    use crate::narration::MockSynthesizer;
    use crate::recognition::{CommandOutcome, MockRecognizer, RecognitionState};
    use crate::runtime::{RuntimeOptions, spawn_session};
    use crate::session::SessionEngines;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn create_test_handler() -> (DaemonCommandHandler, Arc<Notify>) {
        let clock: SharedClock = Arc::new(SystemClock);
        let mut session = VoiceSession::new(
            Config::default(),
            SessionEngines::new(
                Box::new(MockSynthesizer::new()),
                Box::new(MockRecognizer::new()),
            ),
            clock.clone(),
        );
        session.initialize();
        let (_, synth) = mpsc::unbounded_channel();
        let (_, recognition) = mpsc::unbounded_channel();
        let (handle, _task) = spawn_session(
            session,
            EngineEvents { synth, recognition },
            RuntimeOptions {
                clock,
                command_timeout: Duration::from_secs(5),
                transport: None,
                send_interval: Duration::from_secs(30),
            },
        );
        let shutdown = Arc::new(Notify::new());
        (
            DaemonCommandHandler::new(handle, Arc::clone(&shutdown)),
            shutdown,
        )
    }

    #[tokio::test]
    async fn handler_status() {
        let (handler, _) = create_test_handler();
        match handler.handle(Command::Status).await {
            Response::Status {
                session_id,
                snapshot,
            } => {
                assert!(session_id.starts_with("voice_"));
                assert!(snapshot.is_supported);
                assert_eq!(snapshot.recognition_state, RecognitionState::Idle);
            }
            other => panic!("Expected Status response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn handler_start_and_toggle() {
        let (handler, _) = create_test_handler();
        assert_eq!(handler.handle(Command::Start).await, Response::Ok);
        assert_eq!(handler.handle(Command::Toggle).await, Response::Ok);
        assert_eq!(handler.handle(Command::Stop).await, Response::Ok);
    }

    #[tokio::test]
    async fn handler_execute_reports_outcome() {
        let (handler, _) = create_test_handler();
        let response = handler
            .handle(Command::Execute {
                command: VoiceCommandType::VolumeDown,
            })
            .await;
        match response {
            Response::Outcome {
                outcome: CommandOutcome::VolumeChanged { volume },
            } => assert!((volume - 0.8).abs() < 1e-6),
            other => panic!("Expected volume outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn handler_execute_cancel_is_not_found() {
        let (handler, _) = create_test_handler();
        match handler
            .handle(Command::Execute {
                command: VoiceCommandType::Cancel,
            })
            .await
        {
            Response::Error { code, .. } => assert_eq!(code, ErrorCode::CommandNotFound),
            other => panic!("Expected Error response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn handler_levels_are_clamped() {
        let (handler, _) = create_test_handler();
        assert_eq!(
            handler.handle(Command::SetVolume { volume: 3.0 }).await,
            Response::Level { value: 1.0 }
        );
        assert_eq!(
            handler.handle(Command::SetRate { rate: 1.5 }).await,
            Response::Level { value: 1.5 }
        );
    }

    #[tokio::test]
    async fn handler_commands_and_export() {
        let (handler, _) = create_test_handler();
        match handler.handle(Command::Commands).await {
            Response::Commands { commands } => {
                assert_eq!(commands.first().map(String::as_str), Some("Repeat"))
            }
            other => panic!("Expected Commands response, got {:?}", other),
        }
        match handler.handle(Command::ExportSession).await {
            Response::Export { json } => assert!(json.contains("\"sessionId\"")),
            other => panic!("Expected Export response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn handler_shutdown_notifies() {
        let (handler, shutdown) = create_test_handler();
        assert_eq!(handler.handle(Command::Shutdown).await, Response::Ok);
        tokio::time::timeout(Duration::from_secs(1), shutdown.notified())
            .await
            .unwrap();
    }
}
