//! Sequential text-to-speech playback with pause, resume, repeat and barge-in.
//!
//! The controller is driven from outside: engine callbacks arrive through
//! [`NarrationController::handle_synth_event`] and timed transitions through
//! [`NarrationController::poll_timers`]. It never blocks and never returns
//! engine errors; those surface as [`NarrationEvent::Error`].
//!
//! Rate and pitch are fixed per utterance by the engine. Changing the rate
//! while a segment is being spoken restarts that segment from its beginning.

use crate::clock::SharedClock;
use crate::commands::{BargeInEvent, VoiceCommandType};
use crate::config::NarrationConfig;
use crate::defaults::{
    CHARS_PER_SECOND, MAX_PITCH, MAX_RATE, MIN_RATE, SEGMENT_GAP_MS,
};
use crate::events::{EventBus, Subscription};
use crate::narration::state::{
    NarrationDebugInfo, NarrationEvent, NarrationSegment, NarrationStatus, SpeakOptions,
    SpeechInput, SpeechState,
};
use crate::narration::synth::{SpeechSynthesizer, SynthEvent, Utterance, UtteranceId, VoiceInfo};
use crate::timers::TimerSet;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NarrationTimer {
    /// Gap between the end of one segment and the start of the next.
    NextSegment,
}

pub struct NarrationController {
    synth: Box<dyn SpeechSynthesizer>,
    clock: SharedClock,
    events: EventBus<NarrationEvent>,
    timers: TimerSet<NarrationTimer>,

    current: Option<NarrationSegment>,
    pending: VecDeque<NarrationSegment>,
    /// Last segment that finished or was interrupted; the repeat fallback.
    last_played: Option<NarrationSegment>,
    last_queued: Option<NarrationSegment>,

    playing: bool,
    paused: bool,
    active_utterance: Option<UtteranceId>,
    next_utterance: UtteranceId,
    next_segment: u64,

    segment_started: Option<Instant>,
    paused_at: Option<Instant>,
    paused_for: Duration,

    volume: f32,
    rate: f32,
    pitch: f32,
    voice: Option<String>,
    language: String,
}

impl std::fmt::Debug for NarrationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NarrationController")
            .field("status", &self.status())
            .field("current", &self.current.as_ref().map(|s| &s.id))
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl NarrationController {
    pub fn new(
        synth: Box<dyn SpeechSynthesizer>,
        clock: SharedClock,
        config: &NarrationConfig,
        language: &str,
    ) -> Self {
        Self {
            synth,
            clock,
            events: EventBus::new(),
            timers: TimerSet::new(),
            current: None,
            pending: VecDeque::new(),
            last_played: None,
            last_queued: None,
            playing: false,
            paused: false,
            active_utterance: None,
            next_utterance: 1,
            next_segment: 1,
            segment_started: None,
            paused_at: None,
            paused_for: Duration::ZERO,
            volume: config.volume.clamp(0.0, 1.0),
            rate: config.rate.clamp(MIN_RATE, MAX_RATE),
            pitch: config.pitch.clamp(0.0, MAX_PITCH),
            voice: config.voice.clone(),
            language: language.to_string(),
        }
    }

    pub fn subscribe(&self) -> Subscription<NarrationEvent> {
        self.events.subscribe()
    }

    pub fn is_supported(&self) -> bool {
        self.synth.is_available()
    }

    /// Enqueue text. Each string becomes its own segment; blank strings are
    /// dropped. Returns the ids of the new segments.
    pub fn speak(&mut self, input: impl Into<SpeechInput>, options: SpeakOptions) -> Vec<String> {
        let texts: Vec<String> = input
            .into()
            .into_segments()
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if texts.is_empty() {
            debug!("Ignoring empty speak request");
            return Vec::new();
        }

        let segments = self.make_segments(texts, options.segment_id.as_deref());
        let ids = segments.iter().map(|s| s.id.clone()).collect();

        if options.queue {
            debug!(count = segments.len(), "Appending segments to queue");
        } else if options.interrupt {
            self.cancel();
        } else {
            self.pending.clear();
        }

        self.last_queued = segments.last().cloned();
        self.pending.extend(segments);

        if !self.playing {
            self.advance();
        } else {
            self.emit_state();
        }
        ids
    }

    pub fn add_to_queue(&mut self, text: impl Into<SpeechInput>) -> Vec<String> {
        self.speak(text, SpeakOptions::queued())
    }

    /// Drop the segments that have not started. The current one keeps playing.
    pub fn clear_queue(&mut self) {
        self.pending.clear();
        if self.playing && self.current.is_none() {
            self.finish_queue();
        } else {
            self.emit_state();
        }
    }

    /// Returns false unless something is actively being spoken.
    pub fn pause(&mut self) -> bool {
        if !self.playing || self.paused {
            return false;
        }
        if self.current.is_some()
            && let Err(e) = self.synth.pause()
        {
            self.report_engine_error("pause", &e.to_string());
            return false;
        }
        self.paused = true;
        self.paused_at = Some(self.clock.now());
        self.timers.cancel(NarrationTimer::NextSegment);
        debug!("Narration paused");
        self.emit_state();
        true
    }

    /// Returns false unless paused.
    pub fn resume(&mut self) -> bool {
        if !self.paused {
            return false;
        }
        if self.current.is_some()
            && let Err(e) = self.synth.resume()
        {
            self.report_engine_error("resume", &e.to_string());
            return false;
        }
        self.paused = false;
        if let Some(at) = self.paused_at.take() {
            self.paused_for += self.clock.now().saturating_duration_since(at);
        }
        debug!("Narration resumed");
        if self.current.is_none() {
            // Paused in the gap between segments.
            self.advance();
        } else {
            self.emit_state();
        }
        true
    }

    /// Stop everything and empty the queue. Safe from any state.
    pub fn cancel(&mut self) {
        if let Err(e) = self.synth.cancel() {
            self.report_engine_error("cancel", &e.to_string());
        }
        let was_active = self.playing || self.current.is_some() || !self.pending.is_empty();

        if let Some(segment) = self.current.take() {
            self.last_played = Some(segment);
        }
        self.pending.clear();
        self.timers.clear();
        self.active_utterance = None;
        self.playing = false;
        self.paused = false;
        self.segment_started = None;
        self.paused_at = None;
        self.paused_for = Duration::ZERO;

        if was_active {
            debug!("Narration cancelled");
            self.emit_state();
        }
    }

    /// Re-speak the current segment, else the last played one, else the last
    /// queued one. Returns false when there is nothing to repeat.
    pub fn repeat(&mut self) -> bool {
        let target = self
            .current
            .as_ref()
            .or(self.last_played.as_ref())
            .or(self.last_queued.as_ref())
            .map(|s| (s.id.clone(), s.text.clone()));
        let Some((id, text)) = target else {
            return false;
        };

        let repeat_id = if id.starts_with("repeat_") {
            id
        } else {
            format!("repeat_{id}")
        };
        info!(segment = %repeat_id, "Repeating narration");
        self.cancel();
        !self
            .speak(text, SpeakOptions::default().with_segment_id(repeat_id))
            .is_empty()
    }

    /// Snapshot what is being interrupted, then cancel.
    ///
    /// Returns `None` when nothing is playing or paused.
    pub fn barge_in(&mut self, command_type: VoiceCommandType) -> Option<BargeInEvent> {
        if !self.playing {
            return None;
        }
        let position_ms = self.position_ms(self.clock.now());
        let interrupted = self.current.as_ref().or(self.last_played.as_ref());
        let event = BargeInEvent {
            interrupted_at: self.clock.epoch_millis(),
            original_content: interrupted.map(|s| s.text.clone()).unwrap_or_default(),
            segment_id: interrupted.map(|s| s.id.clone()),
            position_ms,
            was_paused: self.paused,
            command_type,
        };
        info!(command = %command_type, segment = ?event.segment_id, "Barge-in");
        self.events.emit(NarrationEvent::BargeIn(event.clone()));
        self.cancel();
        Some(event)
    }

    /// Clamp to [0, 1] and apply to the utterance in flight.
    pub fn set_volume(&mut self, volume: f32) -> f32 {
        if volume.is_nan() {
            return self.volume;
        }
        self.volume = volume.clamp(0.0, 1.0);
        if self.current.is_some()
            && let Err(e) = self.synth.set_volume(self.volume)
        {
            self.report_engine_error("set_volume", &e.to_string());
        }
        self.emit_state();
        self.volume
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Clamp to [0.1, 10]. While speaking, the current segment restarts from
    /// its beginning at the new rate; while paused, the next segment uses it.
    pub fn set_rate(&mut self, rate: f32) -> f32 {
        if rate.is_nan() {
            return self.rate;
        }
        let rate = rate.clamp(MIN_RATE, MAX_RATE);
        let changed = (rate - self.rate).abs() > f32::EPSILON;
        self.rate = rate;

        if changed
            && self.playing
            && !self.paused
            && let Some(segment) = self.current.take()
        {
            self.restart_segment(segment);
        } else {
            self.emit_state();
        }
        self.rate
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Clamp to [0, 2]. Applies from the next utterance.
    pub fn set_pitch(&mut self, pitch: f32) -> f32 {
        if pitch.is_nan() {
            return self.pitch;
        }
        self.pitch = pitch.clamp(0.0, MAX_PITCH);
        self.emit_state();
        self.pitch
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn set_voice(&mut self, voice: Option<String>) {
        self.voice = voice;
    }

    pub fn set_language(&mut self, language: &str) {
        self.language = language.to_string();
    }

    pub fn voices(&self) -> Vec<VoiceInfo> {
        self.synth.voices()
    }

    /// Feed an engine callback back into the state machine.
    pub fn handle_synth_event(&mut self, event: SynthEvent) {
        match event {
            SynthEvent::Started { id } => {
                if self.active_utterance != Some(id) {
                    return;
                }
                let now = self.clock.now();
                let epoch = self.clock.epoch_millis();
                if let Some(segment) = self.current.as_mut() {
                    segment.start_time = Some(epoch);
                    self.segment_started = Some(now);
                    self.paused_for = Duration::ZERO;
                    let started = segment.clone();
                    self.events.emit(NarrationEvent::SegmentStarted(started));
                }
            }
            SynthEvent::Ended { id } => {
                if self.active_utterance != Some(id) {
                    debug!(utterance = id, "Ignoring end of stale utterance");
                    return;
                }
                self.active_utterance = None;
                if let Some(mut segment) = self.current.take() {
                    let end = self.clock.epoch_millis();
                    segment.end_time = Some(end);
                    segment.duration = segment
                        .start_time
                        .map(|start| end.saturating_sub(start).max(0) as u64);
                    self.last_played = Some(segment.clone());
                    self.events.emit(NarrationEvent::SegmentEnded(segment));
                }
                self.segment_done();
            }
            SynthEvent::Failed { id, message } => {
                if self.active_utterance != Some(id) {
                    return;
                }
                self.active_utterance = None;
                let skipped = self.current.take();
                warn!(
                    segment = ?skipped.as_ref().map(|s| &s.id),
                    error = %message,
                    "Speech synthesis failed, skipping segment"
                );
                self.events.emit(NarrationEvent::Error(message));
                self.segment_done();
            }
        }
    }

    /// Run timed transitions that are due at `now`.
    pub fn poll_timers(&mut self, now: Instant) {
        for timer in self.timers.take_due(now) {
            match timer {
                NarrationTimer::NextSegment => {
                    if self.playing && !self.paused && self.current.is_none() {
                        self.advance();
                    }
                }
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn status(&self) -> NarrationStatus {
        match (self.playing, self.paused) {
            (_, true) => NarrationStatus::Paused,
            (true, false) => NarrationStatus::Playing,
            (false, false) => NarrationStatus::Idle,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn current_segment(&self) -> Option<&NarrationSegment> {
        self.current.as_ref()
    }

    /// Engine id of the utterance being spoken, if any.
    pub fn active_utterance(&self) -> Option<UtteranceId> {
        self.active_utterance
    }

    /// Segments not yet finished, the current one included.
    pub fn queue_len(&self) -> usize {
        self.pending.len() + usize::from(self.current.is_some())
    }

    pub fn queued_text(&self) -> Vec<String> {
        self.current
            .iter()
            .chain(self.pending.iter())
            .map(|s| s.text.clone())
            .collect()
    }

    pub fn state(&self) -> SpeechState {
        let now = self.clock.now();
        let remaining_chars: usize = self
            .current
            .iter()
            .chain(self.pending.iter())
            .map(|s| s.text.chars().count())
            .sum();
        let duration_ms =
            (remaining_chars as f32 / (CHARS_PER_SECOND * self.rate) * 1000.0).round() as u64;

        SpeechState {
            is_playing: self.playing,
            is_paused: self.paused,
            current_text: self.current.as_ref().map(|s| s.text.clone()),
            current_segment_id: self.current.as_ref().map(|s| s.id.clone()),
            position_ms: self.position_ms(now),
            duration_ms,
            volume: self.volume,
            rate: self.rate,
            pitch: self.pitch,
            queue_length: self.queue_len(),
            can_pause: self.playing && !self.paused,
            can_resume: self.paused,
            can_stop: self.playing,
        }
    }

    pub fn debug_info(&self) -> NarrationDebugInfo {
        NarrationDebugInfo {
            supported: self.is_supported(),
            engine_active: self.synth.is_active(),
            state: self.state(),
            queued_text: self.queued_text(),
            last_played: self.last_played.as_ref().map(|s| s.text.clone()),
            voice: self.voice.clone(),
            language: self.language.clone(),
            armed_timers: self.timers.len(),
        }
    }

    fn position_ms(&self, now: Instant) -> u64 {
        match self.segment_started {
            Some(start) => {
                let end = self.paused_at.unwrap_or(now);
                end.saturating_duration_since(start)
                    .saturating_sub(self.paused_for)
                    .as_millis() as u64
            }
            None => 0,
        }
    }

    fn make_segments(&mut self, texts: Vec<String>, base_id: Option<&str>) -> Vec<NarrationSegment> {
        let many = texts.len() > 1;
        texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let id = match base_id {
                    Some(base) if many => format!("{base}-{i}"),
                    Some(base) => base.to_string(),
                    None => {
                        let n = self.next_segment;
                        self.next_segment += 1;
                        format!("segment_{n}")
                    }
                };
                NarrationSegment::new(id, text)
            })
            .collect()
    }

    /// Start the next pending segment, skipping ones the engine rejects.
    fn advance(&mut self) {
        self.timers.cancel(NarrationTimer::NextSegment);
        while let Some(segment) = self.pending.pop_front() {
            if self.start_segment(segment) {
                return;
            }
        }
        self.finish_queue();
    }

    fn start_segment(&mut self, segment: NarrationSegment) -> bool {
        let id = self.next_utterance;
        self.next_utterance += 1;
        let utterance = Utterance {
            id,
            text: segment.text.clone(),
            volume: self.volume,
            rate: self.rate,
            pitch: self.pitch,
            voice: self.voice.clone(),
            language: self.language.clone(),
        };

        match self.synth.speak(&utterance) {
            Ok(()) => {
                debug!(segment = %segment.id, utterance = id, "Speaking segment");
                self.playing = true;
                self.paused = false;
                self.active_utterance = Some(id);
                self.segment_started = Some(self.clock.now());
                self.paused_at = None;
                self.paused_for = Duration::ZERO;
                self.current = Some(segment);
                self.emit_state();
                true
            }
            Err(e) => {
                warn!(segment = %segment.id, error = %e, "Speech synthesis failed to start, skipping segment");
                self.events.emit(NarrationEvent::Error(e.to_string()));
                false
            }
        }
    }

    fn restart_segment(&mut self, segment: NarrationSegment) {
        debug!(segment = %segment.id, rate = self.rate, "Restarting segment at new rate");
        if let Err(e) = self.synth.cancel() {
            self.report_engine_error("cancel", &e.to_string());
        }
        self.active_utterance = None;
        let fresh = NarrationSegment::new(segment.id, segment.text);
        if !self.start_segment(fresh) {
            self.advance();
        }
    }

    fn segment_done(&mut self) {
        self.segment_started = None;
        if self.pending.is_empty() {
            self.finish_queue();
        } else if !self.paused {
            self.timers.arm_after(
                NarrationTimer::NextSegment,
                self.clock.now(),
                Duration::from_millis(SEGMENT_GAP_MS),
            );
            self.emit_state();
        }
    }

    fn finish_queue(&mut self) {
        let was_playing = self.playing;
        self.timers.cancel(NarrationTimer::NextSegment);
        self.current = None;
        self.active_utterance = None;
        self.playing = false;
        self.paused = false;
        self.segment_started = None;
        self.paused_at = None;
        if was_playing {
            debug!("Narration queue complete");
            self.events.emit(NarrationEvent::Completed);
            self.emit_state();
        }
    }

    fn report_engine_error(&self, operation: &str, message: &str) {
        warn!(operation, error = %message, "Speech synthesis call failed");
        self.events.emit(NarrationEvent::Error(message.to_string()));
    }

    fn emit_state(&self) {
        self.events.emit(NarrationEvent::StateChanged(self.state()));
    }
}
