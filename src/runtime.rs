//! Tokio host for a [`VoiceSession`].
//!
//! One task owns the session. Engine callbacks, host requests, timer
//! deadlines and the telemetry flush interval are multiplexed in a single
//! `select!` loop, so the session is never touched from two places at once.

use crate::clock::SharedClock;
use crate::engines::EngineEvents;
use crate::error::{Result, VoiceError};
use crate::recognition::ServiceEvent;
use crate::session::VoiceSession;
use crate::telemetry::{TelemetryTransport, flush};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

type Job = Box<dyn FnOnce(&mut VoiceSession) + Send>;

enum Request {
    Run(Job),
    Shutdown(oneshot::Sender<()>),
}

/// Sends work to the session task. Cheap to clone.
#[derive(Clone)]
pub struct SessionHandle {
    requests: mpsc::Sender<Request>,
    timeout: Duration,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SessionHandle {
    /// Run `job` against the session and return its result.
    ///
    /// # Errors
    ///
    /// `VoiceError::Timeout` when no answer arrives within the command
    /// timeout, `VoiceError::Other` when the session task has stopped.
    pub async fn call<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut VoiceSession) -> T + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |session| {
            if reply_tx.send(job(session)).is_err() {
                debug!("Session request abandoned by caller");
            }
        });
        self.requests
            .send(Request::Run(job))
            .await
            .map_err(|_| stopped())?;

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(stopped()),
            Err(_) => Err(VoiceError::Timeout {
                operation: "session request".to_string(),
                millis: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Ask the session task to shut the session down and exit.
    pub async fn shutdown(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.requests
            .send(Request::Shutdown(done_tx))
            .await
            .map_err(|_| stopped())?;
        done_rx.await.map_err(|_| stopped())
    }
}

fn stopped() -> VoiceError {
    VoiceError::Other("Voice session has stopped".to_string())
}

/// Options for [`spawn_session`].
pub struct RuntimeOptions {
    pub clock: SharedClock,
    pub command_timeout: Duration,
    pub transport: Option<Arc<dyn TelemetryTransport>>,
    pub send_interval: Duration,
}

/// Spawn the task that owns `session`.
pub fn spawn_session(
    session: VoiceSession,
    engines: EngineEvents,
    options: RuntimeOptions,
) -> (SessionHandle, JoinHandle<()>) {
    let (requests_tx, requests_rx) = mpsc::channel(32);
    let handle = SessionHandle {
        requests: requests_tx,
        timeout: options.command_timeout,
    };
    let task = tokio::spawn(run_session(session, engines, requests_rx, options));
    (handle, task)
}

async fn run_session(
    mut session: VoiceSession,
    mut engines: EngineEvents,
    mut requests: mpsc::Receiver<Request>,
    options: RuntimeOptions,
) {
    let events = session.subscribe();
    let mut flush_tick = tokio::time::interval(options.send_interval);
    flush_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut done: Option<oneshot::Sender<()>> = None;

    info!("Voice session running");
    loop {
        let deadline = session.next_deadline();
        tokio::select! {
            request = requests.recv() => match request {
                Some(Request::Run(job)) => job(&mut session),
                Some(Request::Shutdown(reply)) => {
                    done = Some(reply);
                    break;
                }
                None => break,
            },
            Some(event) = engines.synth.recv() => session.handle_synth_event(event),
            Some(event) = engines.recognition.recv() => session.handle_recognition_event(event),
            () = sleep_until(deadline) => session.poll_timers(options.clock.now()),
            _ = flush_tick.tick(), if options.transport.is_some() => {
                if let Some(transport) = options.transport.clone() {
                    let telemetry = session.telemetry().clone();
                    tokio::spawn(async move {
                        flush(&telemetry, transport.as_ref()).await;
                    });
                }
            }
        }
        for event in events.drain() {
            log_event(&event);
        }
    }

    session.shutdown();
    if let Some(transport) = options.transport {
        flush(session.telemetry(), transport.as_ref()).await;
    }
    info!("Voice session stopped");
    if let Some(reply) = done
        && reply.send(()).is_err()
    {
        debug!("Shutdown requester went away");
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

fn log_event(event: &ServiceEvent) {
    match event {
        ServiceEvent::StateChanged(state) => debug!(%state, "Recognition state"),
        ServiceEvent::CommandDetected(command) => info!(
            command = %command.command_type,
            confidence = command.confidence,
            "Command detected"
        ),
        ServiceEvent::CommandExecuted {
            command,
            execution_ms,
            ..
        } => debug!(command = %command.command_type, execution_ms, "Command executed"),
        ServiceEvent::CommandFailed { command, error } => {
            warn!(command = %command.command_type, "Command failed: {}", error)
        }
        ServiceEvent::NavigationRequested(command) => {
            info!(command = %command.command_type, "Navigation requested")
        }
        ServiceEvent::SpeechStateChanged(_) => {}
    }
}
