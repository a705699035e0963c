//! End-to-end behaviour of a voice session driven through the public API
//! with mock engines and a manual clock.

use lesson_voice::commands::{
    CommandMatcher, DEFAULT_PATTERNS, MatchPolicy, VoiceCommandPattern, VoiceCommandType,
};
use lesson_voice::config::{Config, NarrationConfig};
use lesson_voice::error::{ErrorCode, VoiceError};
use lesson_voice::narration::{
    MockSynthesizer, NarrationController, NarrationEvent, SpeakOptions, SynthCall, SynthEvent,
    SynthLog,
};
use lesson_voice::recognition::{
    CommandOutcome, MockRecognizer, RecognitionEvent, RecognitionState, ServiceEvent,
};
use lesson_voice::session::{SessionEngines, VoiceSession};
use lesson_voice::telemetry::TelemetryEventType;
use lesson_voice::{Clock, ManualClock};

struct Lesson {
    session: VoiceSession,
    clock: ManualClock,
    synth: SynthLog,
}

impl Lesson {
    fn new() -> Self {
        let clock = ManualClock::new();
        let synth = MockSynthesizer::new();
        let log = synth.log();
        let mut session = VoiceSession::new(
            Config::default(),
            SessionEngines::new(Box::new(synth), Box::new(MockRecognizer::new())),
            clock.shared(),
        );
        assert!(session.initialize());
        Self {
            session,
            clock,
            synth: log,
        }
    }

    fn listening() -> Self {
        let mut lesson = Self::new();
        lesson.session.start_listening().unwrap();
        lesson
            .session
            .handle_recognition_event(RecognitionEvent::Started);
        assert_eq!(
            lesson.session.snapshot().recognition_state,
            RecognitionState::Listening
        );
        lesson
    }

    /// Speak `text` and report the engine start.
    fn narrate(&mut self, text: &str) {
        self.session.speak(text, SpeakOptions::default());
        self.engine_started();
    }

    fn engine_started(&mut self) {
        let id = self.session.narration().lock().active_utterance().unwrap();
        self.session.handle_synth_event(SynthEvent::Started { id });
    }

    fn say(&mut self, transcript: &str) {
        self.session
            .handle_recognition_event(RecognitionEvent::final_result(transcript, 0.95));
        self.advance(500);
    }

    fn advance(&mut self, ms: u64) {
        self.clock.advance_ms(ms);
        self.session.poll_timers(self.clock.now());
    }
}

fn controller() -> (NarrationController, SynthLog, ManualClock) {
    let clock = ManualClock::new();
    let synth = MockSynthesizer::new();
    let log = synth.log();
    let controller = NarrationController::new(
        Box::new(synth),
        clock.shared(),
        &NarrationConfig::default(),
        "en-US",
    );
    (controller, log, clock)
}

fn start_active(controller: &mut NarrationController) {
    let id = controller.active_utterance().unwrap();
    controller.handle_synth_event(SynthEvent::Started { id });
}

fn end_active(controller: &mut NarrationController) {
    let id = controller.active_utterance().unwrap();
    controller.handle_synth_event(SynthEvent::Ended { id });
}

#[test]
fn spoken_repeat_barges_in_and_respeaks_segment() {
    let mut lesson = Lesson::listening();
    let events = lesson.session.subscribe();
    lesson.narrate("Plants turn light into sugar.");

    lesson.say("repeat");

    let executed = events
        .drain()
        .into_iter()
        .find_map(|e| match e {
            ServiceEvent::CommandExecuted { command, outcome, .. } => Some((command, outcome)),
            _ => None,
        })
        .expect("repeat executed");
    assert_eq!(executed.0.command_type, VoiceCommandType::Repeat);
    match executed.1 {
        CommandOutcome::Repeated {
            barge_in: Some(barge_in),
            restarted: true,
        } => assert_eq!(barge_in.original_content, "Plants turn light into sugar."),
        other => panic!("Expected repeat with barge-in, got {:?}", other),
    }
    assert_eq!(
        lesson.synth.spoken_texts(),
        vec![
            "Plants turn light into sugar.",
            "Plants turn light into sugar."
        ]
    );
}

#[test]
fn listed_variant_matches_repeat() {
    let matcher = CommandMatcher::default();
    let found = matcher.find("can you repeat").unwrap();
    assert_eq!(found.command_type, VoiceCommandType::Repeat);
    assert!(found.confidence >= 0.7);

    let mut lesson = Lesson::listening();
    lesson.narrate("Water boils at one hundred degrees.");
    lesson.say("can you repeat");
    assert_eq!(
        lesson
            .session
            .snapshot()
            .last_command
            .map(|c| c.command_type),
        Some(VoiceCommandType::Repeat)
    );
    assert_eq!(lesson.synth.spoken_texts().len(), 2);
}

#[test]
fn interrupting_speak_cancels_previous_segment() {
    let (mut narration, synth, _clock) = controller();
    let events = narration.subscribe();

    narration.speak("Hello", SpeakOptions::default());
    let hello = narration.active_utterance().unwrap();
    narration.handle_synth_event(SynthEvent::Started { id: hello });
    narration.speak("World", SpeakOptions::default());
    narration.handle_synth_event(SynthEvent::Ended { id: hello });
    start_active(&mut narration);
    end_active(&mut narration);

    let ended: Vec<String> = events
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            NarrationEvent::SegmentEnded(segment) => Some(segment.text),
            _ => None,
        })
        .collect();
    assert_eq!(ended, vec!["World"]);
    assert!(synth.calls().contains(&SynthCall::Cancel));
    assert_eq!(synth.last_spoken().map(|u| u.text).as_deref(), Some("World"));
}

#[test]
fn segments_play_in_order_one_at_a_time() {
    let (mut narration, synth, clock) = controller();
    let events = narration.subscribe();
    narration.speak(vec!["A", "B", "C"], SpeakOptions::default());

    for _ in 0..3 {
        start_active(&mut narration);
        end_active(&mut narration);
        clock.advance_ms(100);
        narration.poll_timers(clock.now());
    }

    let order: Vec<String> = events
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            NarrationEvent::SegmentStarted(s) => Some(format!("start {}", s.text)),
            NarrationEvent::SegmentEnded(s) => Some(format!("end {}", s.text)),
            _ => None,
        })
        .collect();
    assert_eq!(
        order,
        vec!["start A", "end A", "start B", "end B", "start C", "end C"]
    );
    assert_eq!(synth.spoken_texts(), vec!["A", "B", "C"]);
    assert!(!narration.is_playing());
}

#[test]
fn pause_then_resume_keeps_queue_and_segment() {
    let (mut narration, _synth, _clock) = controller();
    narration.speak(vec!["One", "Two", "Three"], SpeakOptions::default());
    start_active(&mut narration);
    let segment = narration.current_segment().map(|s| s.id.clone());
    let queued = narration.queued_text();

    assert!(narration.pause());
    assert!(narration.resume());

    let state = narration.state();
    assert!(state.is_playing);
    assert!(!state.is_paused);
    assert_eq!(narration.current_segment().map(|s| s.id.clone()), segment);
    assert_eq!(narration.queued_text(), queued);
}

#[test]
fn pause_while_idle_is_refused() {
    let (mut narration, synth, _clock) = controller();
    let before = narration.state();
    assert!(!narration.pause());
    assert_eq!(narration.state(), before);
    assert!(synth.calls().is_empty());
}

#[test]
fn cancel_is_idempotent() {
    let (mut narration, _synth, _clock) = controller();
    narration.cancel();
    let idle = narration.state();

    narration.speak(vec!["One", "Two"], SpeakOptions::default());
    start_active(&mut narration);
    narration.cancel();
    let once = narration.state();
    narration.cancel();

    assert_eq!(narration.state(), once);
    assert_eq!(once, idle);
    assert_eq!(narration.queue_len(), 0);
}

#[test]
fn levels_are_clamped() {
    let mut lesson = Lesson::new();
    assert_eq!(lesson.session.set_volume(-5.0), 0.0);
    assert_eq!(lesson.session.set_volume(5.0), 1.0);
    assert_eq!(lesson.session.set_rate(0.0), 0.1);
    assert_eq!(lesson.session.set_rate(50.0), 10.0);
    let speech = lesson.session.snapshot().speech_state;
    assert_eq!(speech.volume, 1.0);
    assert_eq!(speech.rate, 10.0);
}

#[test]
fn matches_respect_minimum_confidence() {
    let transcripts = [
        "repeat",
        "please say it again now",
        "hold on a second",
        "could you go on with the lesson please because I was distracted",
        "louder",
        "help",
        "next",
        "completely unrelated chatter",
    ];
    for policy in [MatchPolicy::FirstMatch, MatchPolicy::BestMatch] {
        let matcher = CommandMatcher::new(DEFAULT_PATTERNS.clone(), policy);
        for transcript in transcripts {
            if let Some(found) = matcher.find(transcript) {
                let pattern = DEFAULT_PATTERNS
                    .iter()
                    .find(|p| p.command_type == found.command_type)
                    .unwrap();
                assert!(
                    found.confidence >= pattern.min_confidence,
                    "{transcript}: {} < {}",
                    found.confidence,
                    pattern.min_confidence
                );
            }
        }
    }

    let unreachable = VoiceCommandPattern {
        command_type: VoiceCommandType::Next,
        patterns: vec!["next".to_string()],
        min_confidence: 1.5,
        description: String::new(),
        examples: Vec::new(),
    };
    let matcher = CommandMatcher::new(vec![unreachable], MatchPolicy::BestMatch);
    assert!(matcher.find("next").is_none());
}

#[test]
fn command_without_dispatcher_is_typed_error() {
    let mut lesson = Lesson::new();
    let err = lesson
        .session
        .execute_command(VoiceCommandType::Cancel)
        .unwrap_err();
    assert!(matches!(err, VoiceError::CommandNotFound { .. }));
    assert_eq!(err.code(), ErrorCode::CommandNotFound);
}

#[test]
fn session_telemetry_brackets_activity() {
    let mut lesson = Lesson::listening();
    lesson.narrate("Hello");
    lesson.say("pause");
    lesson.say("resume");

    let session_id = lesson.session.service().session_id().to_string();
    lesson.session.shutdown();

    let telemetry = lesson.session.telemetry().lock();
    let events = telemetry.session(&session_id);
    assert_eq!(
        events.first().map(|e| e.event_type),
        Some(TelemetryEventType::SessionStart)
    );
    assert_eq!(
        events.last().map(|e| e.event_type),
        Some(TelemetryEventType::SessionEnd)
    );
    let types: Vec<_> = events.iter().map(|e| e.event_type).collect();
    assert!(types.contains(&TelemetryEventType::Pause));
    assert!(types.contains(&TelemetryEventType::Resume));

    let stats = telemetry.session_stats(&session_id);
    assert_eq!(stats.total_events + 2, events.len());
    assert_eq!(stats.commands_detected, 2);
    assert_eq!(stats.command_types.get("pause"), Some(&1));
}

#[test]
fn navigation_is_forwarded_to_lesson() {
    let mut lesson = Lesson::listening();
    let events = lesson.session.subscribe();
    lesson.say("next");

    let forwarded = events.drain().into_iter().any(|e| {
        matches!(e, ServiceEvent::NavigationRequested(c) if c.command_type == VoiceCommandType::Next)
    });
    assert!(forwarded);
}
