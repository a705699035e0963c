//! One voice session: narration, command service, telemetry and the UI
//! helpers wired together explicitly.
//!
//! Everything is constructed here and passed down; there are no global
//! instances. Hosts feed engine events and timer polls in, and read state
//! back through [`VoiceSession::snapshot`] or the event subscriptions.

use crate::clock::SharedClock;
use crate::commands::{VoiceCommand, VoiceCommandType};
use crate::config::Config;
use crate::error::Result;
use crate::events::Subscription;
use crate::narration::{
    NarrationController, NarrationDebugInfo, NarrationEvent, NarrationHandle, SpeakOptions,
    SpeechInput, SpeechState, SpeechSynthesizer, SynthEvent,
};
use crate::recognition::{
    CommandOutcome, CommandService, RecognitionDebugInfo, RecognitionEvent, RecognitionState,
    ServiceEvent, SpeechRecognizer,
};
use crate::telemetry::{KeyValueStore, MemoryStore, TelemetryHandle, TelemetryService};
use crate::ui::{AutoHideControls, ResumeChip, Shortcut};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// Context string for commands that did not come from speech.
const MANUAL_CONTEXT: &str = "manual";

/// The external collaborators a session needs.
pub struct SessionEngines {
    pub synthesizer: Box<dyn SpeechSynthesizer>,
    pub recognizer: Box<dyn SpeechRecognizer>,
    pub store: Box<dyn KeyValueStore>,
}

impl SessionEngines {
    /// Engines with in-memory telemetry storage.
    pub fn new(
        synthesizer: Box<dyn SpeechSynthesizer>,
        recognizer: Box<dyn SpeechRecognizer>,
    ) -> Self {
        Self {
            synthesizer,
            recognizer,
            store: Box::new(MemoryStore::new()),
        }
    }

    pub fn with_store(mut self, store: Box<dyn KeyValueStore>) -> Self {
        self.store = store;
        self
    }
}

/// What the UI renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub is_listening: bool,
    pub is_supported: bool,
    pub recognition_state: RecognitionState,
    pub speech_state: SpeechState,
    pub controls_visible: bool,
    pub last_command: Option<VoiceCommand>,
    pub show_resume_chip: bool,
    pub paused_since: Option<i64>,
    /// "Paused for" text of the resume chip.
    pub paused_for: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDebugInfo {
    pub service: RecognitionDebugInfo,
    pub narration: NarrationDebugInfo,
    pub session: SessionSnapshot,
}

pub struct VoiceSession {
    clock: SharedClock,
    narration: NarrationHandle,
    telemetry: TelemetryHandle,
    service: CommandService,
    controls: AutoHideControls,
    resume_chip: ResumeChip,
    service_events: Subscription<ServiceEvent>,
    last_command: Option<VoiceCommand>,
}

impl std::fmt::Debug for VoiceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceSession")
            .field("service", &self.service)
            .field("narration", &self.narration)
            .field("controls_visible", &self.controls.is_visible())
            .finish()
    }
}

impl VoiceSession {
    pub fn new(config: Config, engines: SessionEngines, clock: SharedClock) -> Self {
        let narration = NarrationHandle::new(NarrationController::new(
            engines.synthesizer,
            clock.clone(),
            &config.narration,
            &config.voice.language,
        ));
        let telemetry = TelemetryHandle::new(TelemetryService::new(
            config.telemetry.clone(),
            engines.store,
            clock.clone(),
        ));
        let controls = AutoHideControls::new(config.voice.auto_hide_delay_ms, telemetry.clone());
        let service = CommandService::new(
            config.voice.clone(),
            config.command_patterns(),
            engines.recognizer,
            narration.clone(),
            telemetry.clone(),
            clock.clone(),
        );
        let service_events = service.subscribe();

        Self {
            clock,
            narration,
            telemetry,
            service,
            controls,
            resume_chip: ResumeChip::new(),
            service_events,
            last_command: None,
        }
    }

    /// Initialize the command service. Returns whether recognition is
    /// supported.
    pub fn initialize(&mut self) -> bool {
        let supported = self.service.initialize(None);
        self.sync();
        supported
    }

    pub fn narration(&self) -> &NarrationHandle {
        &self.narration
    }

    pub fn telemetry(&self) -> &TelemetryHandle {
        &self.telemetry
    }

    pub fn service(&self) -> &CommandService {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut CommandService {
        &mut self.service
    }

    pub fn subscribe(&self) -> Subscription<ServiceEvent> {
        self.service.subscribe()
    }

    pub fn subscribe_narration(&self) -> Subscription<NarrationEvent> {
        self.narration.lock().subscribe()
    }

    pub fn is_listening(&self) -> bool {
        self.service.state() == RecognitionState::Listening
    }

    /// Start listening when supported and not already busy.
    pub fn start_listening(&mut self) -> Result<()> {
        if !self.service.is_supported() {
            return Ok(());
        }
        if matches!(
            self.service.state(),
            RecognitionState::Idle | RecognitionState::Error
        ) {
            self.service.start()?;
            self.show_controls();
        }
        self.sync();
        Ok(())
    }

    pub fn stop_listening(&mut self) {
        self.service.stop();
        self.sync();
    }

    /// Returns whether listening was requested afterwards.
    pub fn toggle_listening(&mut self) -> Result<bool> {
        if self.service.is_listening_requested() {
            self.stop_listening();
        } else {
            self.start_listening()?;
        }
        Ok(self.service.is_listening_requested())
    }

    /// Run a command as if it had been spoken.
    pub fn execute_command(&mut self, command_type: VoiceCommandType) -> Result<CommandOutcome> {
        let command = VoiceCommand::manual(command_type, MANUAL_CONTEXT, self.clock.epoch_millis());
        let outcome = self.service.execute_command(&command);
        self.show_controls();
        self.sync();
        outcome
    }

    pub fn speak(&mut self, text: impl Into<SpeechInput>, options: SpeakOptions) -> Vec<String> {
        let ids = self.narration.lock().speak(text, options);
        self.sync();
        ids
    }

    pub fn pause_speech(&mut self) -> bool {
        let paused = self.narration.lock().pause();
        self.after_speech_control();
        paused
    }

    pub fn resume_speech(&mut self) -> bool {
        let resumed = self.narration.lock().resume();
        self.after_speech_control();
        resumed
    }

    pub fn stop_speech(&mut self) {
        self.narration.lock().cancel();
        self.after_speech_control();
    }

    pub fn repeat_speech(&mut self) -> bool {
        let repeated = self.narration.lock().repeat();
        self.after_speech_control();
        repeated
    }

    pub fn set_volume(&mut self, volume: f32) -> f32 {
        let volume = self.narration.lock().set_volume(volume);
        self.after_speech_control();
        volume
    }

    pub fn set_rate(&mut self, rate: f32) -> f32 {
        let rate = self.narration.lock().set_rate(rate);
        self.after_speech_control();
        rate
    }

    pub fn show_controls(&mut self) {
        self.controls.show(self.clock.now());
    }

    pub fn hide_controls(&mut self) {
        self.controls.hide();
    }

    /// Pointer movement over the lesson.
    pub fn pointer_activity(&mut self) {
        let engaged = self.is_listening() || self.narration.lock().is_playing();
        self.controls.activity(self.clock.now(), engaged);
    }

    pub fn handle_shortcut(&mut self, shortcut: Shortcut) -> Result<()> {
        debug!(%shortcut, "Keyboard shortcut");
        match shortcut {
            Shortcut::ToggleListening => {
                self.toggle_listening()?;
            }
            Shortcut::Repeat => {
                self.repeat_speech();
            }
            Shortcut::TogglePause => {
                let speech = self.narration.lock().state();
                if speech.is_paused {
                    self.resume_speech();
                } else if speech.is_playing {
                    self.pause_speech();
                }
            }
            Shortcut::Stop => self.stop_speech(),
        }
        Ok(())
    }

    /// First example phrase of every pattern.
    pub fn available_commands(&self) -> Vec<String> {
        self.service
            .available_commands()
            .iter()
            .filter_map(|p| p.examples.first().cloned())
            .collect()
    }

    pub fn is_command_available(&self, command_type: VoiceCommandType) -> bool {
        self.service
            .available_commands()
            .iter()
            .any(|p| p.command_type == command_type)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let now_ms = self.clock.epoch_millis();
        SessionSnapshot {
            is_listening: self.is_listening(),
            is_supported: self.service.is_supported(),
            recognition_state: self.service.state(),
            speech_state: self.narration.lock().state(),
            controls_visible: self.controls.is_visible(),
            last_command: self.last_command.clone(),
            show_resume_chip: self.resume_chip.is_visible(),
            paused_since: self.resume_chip.paused_since(),
            paused_for: self.resume_chip.timer_text(now_ms),
        }
    }

    pub fn debug_info(&self) -> SessionDebugInfo {
        let narration = self.narration.lock().debug_info();
        SessionDebugInfo {
            service: self.service.debug_info(),
            narration,
            session: self.snapshot(),
        }
    }

    pub fn handle_synth_event(&mut self, event: SynthEvent) {
        self.narration.lock().handle_synth_event(event);
        self.sync();
    }

    pub fn handle_recognition_event(&mut self, event: RecognitionEvent) {
        self.service.handle_recognition_event(event);
        self.sync();
    }

    /// Fire every timed transition due at `now`.
    pub fn poll_timers(&mut self, now: Instant) {
        self.narration.lock().poll_timers(now);
        self.service.poll_timers(now);
        self.controls.poll_timers(now);
        self.sync();
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        let narration = self.narration.lock().next_deadline();
        [
            narration,
            self.service.next_deadline(),
            self.controls.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Stop everything and close the telemetry session.
    pub fn shutdown(&mut self) {
        self.service.destroy();
        self.narration.lock().cancel();
        self.controls.hide();
        self.sync();
    }

    fn after_speech_control(&mut self) {
        self.show_controls();
        self.sync();
    }

    /// Relay narration changes and react to detected commands.
    fn sync(&mut self) {
        self.service.relay_speech_state();
        let mut detected = false;
        for event in self.service_events.drain() {
            if let ServiceEvent::CommandDetected(command) = event {
                self.last_command = Some(command);
                detected = true;
            }
        }
        if detected {
            self.show_controls();
        }
        let speech = self.narration.lock().state();
        self.resume_chip.update(&speech, self.clock.epoch_millis());
    }
}
