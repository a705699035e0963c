//! Listening session state machine and command dispatcher.
//!
//! Transcript results are buffered and processed once the engine has been
//! quiet for the debounce window, so a phrase spoken with pauses is matched
//! as one unit. Matched commands drive the shared narration controller;
//! navigation intents are forwarded as [`ServiceEvent::NavigationRequested`].

use crate::clock::SharedClock;
use crate::commands::{
    CommandMatcher, HELP_TEXT, VoiceCommand, VoiceCommandPattern, VoiceCommandType,
};
use crate::config::{VoiceConfig, VoiceConfigUpdate};
use crate::defaults::{
    ADJUST_STEP, DEBOUNCE_MS, MIN_RATE, NETWORK_RETRY_MS, RESTART_AFTER_END_MS,
    TRANSIENT_RETRY_MS, VOICE_MAX_RATE,
};
use crate::error::{Result, VoiceError};
use crate::events::{EventBus, Subscription};
use crate::narration::{NarrationEvent, NarrationHandle, SpeakOptions, SpeechState};
use crate::recognition::engine::{
    RecognitionErrorKind, RecognitionEvent, RecognizerSettings, SpeechRecognizer,
};
use crate::recognition::state::{
    CommandOutcome, RecognitionDebugInfo, RecognitionState, ServiceEvent,
};
use crate::telemetry::{TelemetryEvent, TelemetryEventType, TelemetryHandle};
use crate::timers::TimerSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecognitionTimer {
    /// Debounced processing of the transcript buffer.
    ProcessBuffer,
    /// Bring the engine back after it ended or failed.
    Restart,
}

/// Context string attached to detected commands.
const COMMAND_CONTEXT: &str = "lesson";

pub struct CommandService {
    config: VoiceConfig,
    recognizer: Box<dyn SpeechRecognizer>,
    matcher: CommandMatcher,
    narration: NarrationHandle,
    narration_events: Subscription<NarrationEvent>,
    telemetry: TelemetryHandle,
    clock: SharedClock,
    events: EventBus<ServiceEvent>,
    timers: TimerSet<RecognitionTimer>,

    state: RecognitionState,
    session_id: String,
    initialized: bool,
    /// The user wants to be listening; cleared by `stop` and terminal errors.
    listening_requested: bool,
    engine_running: bool,
    buffer: Vec<String>,
    interim: Option<String>,
    network_retried: bool,
    last_command_time: Option<i64>,
}

impl std::fmt::Debug for CommandService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandService")
            .field("state", &self.state)
            .field("session_id", &self.session_id)
            .field("listening_requested", &self.listening_requested)
            .field("engine_running", &self.engine_running)
            .finish()
    }
}

impl CommandService {
    pub fn new(
        config: VoiceConfig,
        patterns: Vec<VoiceCommandPattern>,
        recognizer: Box<dyn SpeechRecognizer>,
        narration: NarrationHandle,
        telemetry: TelemetryHandle,
        clock: SharedClock,
    ) -> Self {
        let matcher = CommandMatcher::new(patterns, config.match_policy);
        let narration_events = narration.lock().subscribe();
        Self {
            config,
            recognizer,
            matcher,
            narration,
            narration_events,
            telemetry,
            clock,
            events: EventBus::new(),
            timers: TimerSet::new(),
            state: RecognitionState::Idle,
            session_id: format!("voice_{}", Uuid::new_v4().simple()),
            initialized: false,
            listening_requested: false,
            engine_running: false,
            buffer: Vec::new(),
            interim: None,
            network_retried: false,
            last_command_time: None,
        }
    }

    pub fn subscribe(&self) -> Subscription<ServiceEvent> {
        self.events.subscribe()
    }

    /// Apply `update`, configure the engine and open the telemetry session.
    /// Returns whether speech recognition is supported.
    pub fn initialize(&mut self, update: Option<&VoiceConfigUpdate>) -> bool {
        if let Some(update) = update {
            update.apply_to(&mut self.config);
            self.matcher.set_policy(self.config.match_policy);
        }

        if !self.recognizer.is_available() {
            info!("Speech recognition is not available");
            self.set_state(RecognitionState::Unsupported);
            return false;
        }
        if self.initialized {
            return true;
        }

        if let Err(e) = self
            .recognizer
            .configure(&RecognizerSettings::from(&self.config))
        {
            warn!("Failed to configure speech recognition: {}", e);
            self.set_state(RecognitionState::Error);
            return false;
        }

        self.telemetry.lock().start_session(&self.session_id);
        self.initialized = true;
        info!(session = %self.session_id, "Voice command service initialized");
        self.set_state(RecognitionState::Idle);
        true
    }

    pub fn is_supported(&self) -> bool {
        self.recognizer.is_available()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn state(&self) -> RecognitionState {
        self.state
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    pub fn is_listening_requested(&self) -> bool {
        self.listening_requested
    }

    /// Begin listening. The engine's `Started` event moves the state to
    /// `Listening`.
    pub fn start(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(VoiceError::NotInitialized);
        }
        if !self.config.enabled {
            debug!("Voice commands disabled, not starting");
            return Ok(());
        }
        self.listening_requested = true;
        self.network_retried = false;
        if self.state == RecognitionState::Error {
            self.set_state(RecognitionState::Idle);
        }
        self.start_engine();
        Ok(())
    }

    /// Stop listening and drop anything pending. Safe from any state.
    pub fn stop(&mut self) {
        self.listening_requested = false;
        if self.engine_running {
            if let Err(e) = self.recognizer.stop() {
                warn!("Failed to stop speech recognition: {}", e);
            }
            self.engine_running = false;
        }
        self.timers.clear();
        self.buffer.clear();
        self.interim = None;
        if self.state != RecognitionState::Unsupported {
            self.set_state(RecognitionState::Idle);
        }
    }

    /// Stop, close the telemetry session and forget initialization.
    pub fn destroy(&mut self) {
        self.stop();
        if self.initialized {
            self.telemetry.lock().end_session(&self.session_id);
            self.initialized = false;
            info!(session = %self.session_id, "Voice command service destroyed");
        }
    }

    pub fn update_config(&mut self, update: &VoiceConfigUpdate) {
        update.apply_to(&mut self.config);
        self.matcher.set_policy(self.config.match_policy);

        if self.initialized
            && update.touches_recognizer()
            && let Err(e) = self
                .recognizer
                .configure(&RecognizerSettings::from(&self.config))
        {
            warn!("Failed to reconfigure speech recognition: {}", e);
        }
        if update.enabled == Some(false) {
            self.stop();
        }
    }

    pub fn available_commands(&self) -> &[VoiceCommandPattern] {
        self.matcher.patterns()
    }

    pub fn speech_state(&self) -> SpeechState {
        self.narration.lock().state()
    }

    pub fn debug_info(&self) -> RecognitionDebugInfo {
        let buffer = self
            .buffer
            .iter()
            .cloned()
            .chain(self.interim.clone())
            .collect();
        RecognitionDebugInfo {
            supported: self.is_supported(),
            initialized: self.initialized,
            state: self.state,
            config: self.config.clone(),
            session_id: self.session_id.clone(),
            listening_requested: self.listening_requested,
            engine_running: self.engine_running,
            last_command_time: self.last_command_time,
            buffer,
            armed_timers: self.timers.len(),
            speech_state: self.speech_state(),
        }
    }

    pub fn handle_recognition_event(&mut self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Started => self.on_started(),
            RecognitionEvent::Result {
                transcript,
                confidence,
                is_final,
            } => self.on_result(&transcript, confidence, is_final),
            RecognitionEvent::Error { code } => self.on_error(&code),
            RecognitionEvent::NoMatch => debug!("Recognition produced no match"),
            RecognitionEvent::Ended => self.on_ended(),
        }
        self.relay_speech_state();
    }

    pub fn poll_timers(&mut self, now: Instant) {
        for timer in self.timers.take_due(now) {
            match timer {
                RecognitionTimer::ProcessBuffer => self.process_buffer(),
                RecognitionTimer::Restart => {
                    if self.listening_requested && self.state != RecognitionState::Error {
                        self.start_engine();
                    }
                }
            }
        }
        self.relay_speech_state();
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Forward narration state changes as [`ServiceEvent::SpeechStateChanged`].
    pub fn relay_speech_state(&mut self) {
        for event in self.narration_events.drain() {
            if let NarrationEvent::StateChanged(state) = event {
                self.events.emit(ServiceEvent::SpeechStateChanged(state));
            }
        }
    }

    /// Run the action for `command`.
    ///
    /// # Errors
    ///
    /// Returns `VoiceError::CommandNotFound` for an intent with no action.
    pub fn execute_command(&mut self, command: &VoiceCommand) -> Result<CommandOutcome> {
        let outcome = self.dispatch(command);
        self.relay_speech_state();
        outcome
    }

    fn dispatch(&mut self, command: &VoiceCommand) -> Result<CommandOutcome> {
        let command_type = command.command_type;
        let mut narration = self.narration.lock();
        let speech = narration.state();
        let active = speech.is_playing || speech.is_paused;

        let outcome = match command_type {
            VoiceCommandType::Repeat => {
                let barge_in = if self.config.barge_in_enabled && active {
                    narration.barge_in(command_type)
                } else {
                    None
                };
                let restarted = narration.repeat();
                CommandOutcome::Repeated {
                    barge_in,
                    restarted,
                }
            }
            VoiceCommandType::Pause => {
                if speech.can_pause && narration.pause() {
                    CommandOutcome::Paused
                } else {
                    CommandOutcome::Ignored
                }
            }
            VoiceCommandType::Resume => {
                if speech.is_paused && narration.resume() {
                    CommandOutcome::Resumed
                } else {
                    CommandOutcome::Ignored
                }
            }
            VoiceCommandType::Stop => {
                let barge_in = if self.config.barge_in_enabled && active {
                    narration.barge_in(command_type)
                } else {
                    None
                };
                narration.cancel();
                CommandOutcome::Stopped { barge_in }
            }
            VoiceCommandType::VolumeUp => CommandOutcome::VolumeChanged {
                volume: narration.set_volume((speech.volume + ADJUST_STEP).min(1.0)),
            },
            VoiceCommandType::VolumeDown => CommandOutcome::VolumeChanged {
                volume: narration.set_volume((speech.volume - ADJUST_STEP).max(0.0)),
            },
            VoiceCommandType::Slower => CommandOutcome::RateChanged {
                rate: narration.set_rate((speech.rate - ADJUST_STEP).max(MIN_RATE)),
            },
            VoiceCommandType::Faster => CommandOutcome::RateChanged {
                rate: narration.set_rate((speech.rate + ADJUST_STEP).min(VOICE_MAX_RATE)),
            },
            VoiceCommandType::Help => {
                let barge_in = if self.config.barge_in_enabled && active {
                    narration.barge_in(command_type)
                } else {
                    None
                };
                narration.speak(HELP_TEXT, SpeakOptions::default());
                CommandOutcome::HelpAnnounced { barge_in }
            }
            VoiceCommandType::Next | VoiceCommandType::Previous | VoiceCommandType::Skip => {
                self.events
                    .emit(ServiceEvent::NavigationRequested(command.clone()));
                CommandOutcome::Forwarded
            }
            VoiceCommandType::Cancel => {
                return Err(VoiceError::CommandNotFound {
                    command: command_type.to_string(),
                });
            }
        };
        drop(narration);

        self.track_outcome(command_type, &outcome);
        debug!(command = %command_type, ?outcome, "Command dispatched");
        Ok(outcome)
    }

    fn track_outcome(&self, command_type: VoiceCommandType, outcome: &CommandOutcome) {
        let barge_in = match outcome {
            CommandOutcome::Repeated { barge_in, .. }
            | CommandOutcome::Stopped { barge_in }
            | CommandOutcome::HelpAnnounced { barge_in } => barge_in.as_ref(),
            _ => None,
        };
        if let Some(barge_in) = barge_in {
            self.track(|sid, ts| TelemetryEvent::barge_in(sid, ts, barge_in));
        }

        let event_type = match outcome {
            CommandOutcome::Repeated { .. } => TelemetryEventType::Repeat,
            CommandOutcome::Paused => TelemetryEventType::Pause,
            CommandOutcome::Resumed => TelemetryEventType::Resume,
            CommandOutcome::Stopped { .. } => TelemetryEventType::Stop,
            CommandOutcome::VolumeChanged { .. } => TelemetryEventType::VolumeChange,
            CommandOutcome::RateChanged { .. } => TelemetryEventType::RateChange,
            CommandOutcome::HelpAnnounced { .. }
            | CommandOutcome::Forwarded
            | CommandOutcome::Ignored => return,
        };
        self.track(|sid, ts| {
            let mut event = TelemetryEvent::new(event_type, sid, ts)
                .with_data("commandType", command_type.as_str())
                .with_phase("execution");
            match outcome {
                CommandOutcome::VolumeChanged { volume } => {
                    event = event.with_data("volume", f64::from(*volume));
                }
                CommandOutcome::RateChanged { rate } => {
                    event = event.with_data("rate", f64::from(*rate));
                }
                _ => {}
            }
            event
        });
    }

    fn on_started(&mut self) {
        self.engine_running = true;
        self.network_retried = false;
        if !self.listening_requested {
            // Stopped before the engine came up.
            if let Err(e) = self.recognizer.stop() {
                warn!("Failed to stop speech recognition: {}", e);
            }
            self.engine_running = false;
            return;
        }
        self.track(|sid, ts| {
            TelemetryEvent::new(TelemetryEventType::RecognitionStart, sid, ts)
                .with_data("language", self.config.language.as_str())
                .with_phase("recognition")
        });
        self.set_state(RecognitionState::Listening);
    }

    fn on_result(&mut self, transcript: &str, confidence: f32, is_final: bool) {
        if !self.listening_requested {
            return;
        }
        let text = transcript.trim().to_lowercase();
        if text.is_empty() {
            return;
        }
        if !is_final && !self.config.interim_results {
            return;
        }
        if confidence > 0.0 && confidence < self.config.noise_threshold {
            debug!(confidence, "Dropping low-confidence result");
            return;
        }
        if self.config.debug_mode {
            debug!(transcript = %text, confidence, is_final, "Recognition result");
        }

        if is_final {
            self.interim = None;
            self.buffer.push(text);
        } else {
            self.interim = Some(text);
        }
        self.timers.arm_after(
            RecognitionTimer::ProcessBuffer,
            self.clock.now(),
            Duration::from_millis(DEBOUNCE_MS),
        );
    }

    fn on_error(&mut self, code: &str) {
        let kind = RecognitionErrorKind::classify(code);
        warn!(code, ?kind, "Speech recognition error");
        self.track(|sid, ts| TelemetryEvent::recognition_error(sid, ts, code, Some(code)));

        match kind {
            RecognitionErrorKind::Permission => self.fail(),
            RecognitionErrorKind::Network => {
                if self.listening_requested && !self.network_retried {
                    self.network_retried = true;
                    self.schedule_restart(NETWORK_RETRY_MS);
                } else {
                    self.fail();
                }
            }
            RecognitionErrorKind::Transient => {
                if self.continuous() {
                    self.schedule_restart(TRANSIENT_RETRY_MS);
                } else {
                    self.fail();
                }
            }
        }
    }

    fn on_ended(&mut self) {
        self.engine_running = false;
        self.track(|sid, ts| {
            TelemetryEvent::new(TelemetryEventType::RecognitionEnd, sid, ts)
                .with_phase("recognition")
        });

        if self.state == RecognitionState::Error {
            return;
        }
        if self.continuous() {
            if !self.timers.is_armed(RecognitionTimer::Restart) {
                self.schedule_restart(RESTART_AFTER_END_MS);
            }
        } else {
            self.listening_requested = false;
            if self.state == RecognitionState::Listening {
                self.set_state(RecognitionState::Idle);
            }
        }
    }

    fn process_buffer(&mut self) {
        let mut parts = std::mem::take(&mut self.buffer);
        parts.extend(self.interim.take());
        if parts.is_empty() {
            return;
        }
        let transcript = parts.join(" ");
        self.set_state(RecognitionState::Processing);

        match self
            .matcher
            .detect(&transcript, COMMAND_CONTEXT, self.clock.epoch_millis())
        {
            Some(command) => {
                info!(
                    command = %command.command_type,
                    confidence = command.confidence,
                    "Voice command detected"
                );
                self.track(|sid, ts| {
                    TelemetryEvent::command_detected(
                        sid,
                        ts,
                        command.command_type,
                        command.confidence,
                        &command.raw_text,
                    )
                });
                self.events
                    .emit(ServiceEvent::CommandDetected(command.clone()));
                self.execute_detected(command);
            }
            None => {
                if self.config.debug_mode {
                    debug!(transcript = %transcript, "No command in transcript");
                }
            }
        }

        let next = if self.listening_requested {
            RecognitionState::Listening
        } else {
            RecognitionState::Idle
        };
        if self.state != RecognitionState::Error {
            self.set_state(next);
        }
    }

    fn execute_detected(&mut self, command: VoiceCommand) {
        self.set_state(RecognitionState::Executing);
        let started = self.clock.now();
        let result = self.dispatch(&command);
        let execution_ms = self.clock.now().saturating_duration_since(started).as_secs_f64() * 1000.0;

        match result {
            Ok(outcome) => {
                self.track(|sid, ts| {
                    TelemetryEvent::command_executed(sid, ts, command.command_type, true, execution_ms)
                });
                self.track(|sid, ts| {
                    TelemetryEvent::latency_measurement(sid, ts, "command_execution", execution_ms)
                });
                self.last_command_time = Some(self.clock.epoch_millis());
                self.events.emit(ServiceEvent::CommandExecuted {
                    command,
                    outcome,
                    execution_ms,
                });
            }
            Err(e) => {
                warn!(command = %command.command_type, "Command failed: {}", e);
                self.track(|sid, ts| {
                    TelemetryEvent::command_executed(sid, ts, command.command_type, false, execution_ms)
                        .with_data("error", e.to_string())
                });
                self.events.emit(ServiceEvent::CommandFailed {
                    command,
                    error: e.to_string(),
                });
            }
        }
    }

    fn start_engine(&mut self) {
        if self.engine_running {
            return;
        }
        match self.recognizer.start() {
            Ok(()) => {
                self.engine_running = true;
                debug!("Speech recognition starting");
            }
            Err(e) => {
                warn!("Failed to start speech recognition: {}", e);
                self.fail();
            }
        }
    }

    fn schedule_restart(&mut self, delay_ms: u64) {
        self.timers.arm_after(
            RecognitionTimer::Restart,
            self.clock.now(),
            Duration::from_millis(delay_ms),
        );
    }

    /// Terminal for this listening session; `start` recovers.
    fn fail(&mut self) {
        self.listening_requested = false;
        self.timers.cancel(RecognitionTimer::Restart);
        self.set_state(RecognitionState::Error);
    }

    fn continuous(&self) -> bool {
        self.listening_requested && self.config.continuous
    }

    fn track(&self, build: impl FnOnce(&str, i64) -> TelemetryEvent) {
        let mut telemetry = self.telemetry.lock();
        let event = build(&self.session_id, telemetry.now_millis());
        telemetry.track_event(event);
    }

    fn set_state(&mut self, state: RecognitionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Recognition state changed");
            self.state = state;
            self.events.emit(ServiceEvent::StateChanged(state));
        }
    }
}
