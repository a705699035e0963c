//! Terminal engines: narration is printed, commands are typed.

use crate::defaults::CHARS_PER_SECOND;
use crate::error::{Result, VoiceError};
use crate::narration::{SpeechSynthesizer, SynthEvent, Utterance, UtteranceId};
use crate::recognition::{RecognitionEvent, RecognizerSettings, SpeechRecognizer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;

fn runtime_handle(engine: &str) -> Result<tokio::runtime::Handle> {
    tokio::runtime::Handle::try_current()
        .map_err(|e| VoiceError::Other(format!("{engine} needs a tokio runtime: {e}")))
}

/// Speaking time of `text` at `rate`.
pub fn estimated_duration(text: &str, rate: f32) -> Duration {
    let seconds = text.chars().count() as f32 / (CHARS_PER_SECOND * rate.max(f32::EPSILON));
    Duration::from_secs_f32(seconds)
}

struct Playback {
    id: UtteranceId,
    remaining: Duration,
    resumed_at: Instant,
    /// `None` while paused.
    timer: Option<JoinHandle<()>>,
}

/// Prints each utterance and reports its end after the estimated speaking
/// time.
pub struct ConsoleSynthesizer {
    events: UnboundedSender<SynthEvent>,
    playback: Option<Playback>,
    quiet: bool,
}

impl ConsoleSynthesizer {
    pub fn new(events: UnboundedSender<SynthEvent>) -> Self {
        Self {
            events,
            playback: None,
            quiet: false,
        }
    }

    /// Keep timing but print nothing.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    fn send(&self, event: SynthEvent) {
        if self.events.send(event).is_err() {
            debug!("Narration event receiver dropped");
        }
    }

    fn spawn_end(&self, id: UtteranceId, after: Duration) -> Result<JoinHandle<()>> {
        let events = self.events.clone();
        Ok(runtime_handle("ConsoleSynthesizer")?.spawn(async move {
            tokio::time::sleep(after).await;
            if events.send(SynthEvent::Ended { id }).is_err() {
                debug!("Narration event receiver dropped");
            }
        }))
    }

    fn abort(&mut self) {
        if let Some(timer) = self.playback.take().and_then(|p| p.timer) {
            timer.abort();
        }
    }
}

impl SpeechSynthesizer for ConsoleSynthesizer {
    fn speak(&mut self, utterance: &Utterance) -> Result<()> {
        self.abort();
        if !self.quiet {
            println!("[narration] {}", utterance.text);
        }
        let duration = estimated_duration(&utterance.text, utterance.rate);
        self.send(SynthEvent::Started { id: utterance.id });
        let timer = self.spawn_end(utterance.id, duration)?;
        self.playback = Some(Playback {
            id: utterance.id,
            remaining: duration,
            resumed_at: Instant::now(),
            timer: Some(timer),
        });
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        if let Some(playback) = self.playback.as_mut()
            && let Some(timer) = playback.timer.take()
        {
            timer.abort();
            playback.remaining = playback
                .remaining
                .saturating_sub(playback.resumed_at.elapsed());
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        let Some((id, remaining)) = self
            .playback
            .as_ref()
            .filter(|p| p.timer.is_none())
            .map(|p| (p.id, p.remaining))
        else {
            return Ok(());
        };
        let timer = self.spawn_end(id, remaining)?;
        if let Some(playback) = self.playback.as_mut() {
            playback.resumed_at = Instant::now();
            playback.timer = Some(timer);
        }
        Ok(())
    }

    fn cancel(&mut self) -> Result<()> {
        self.abort();
        Ok(())
    }

    fn set_volume(&mut self, _volume: f32) -> Result<()> {
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| p.timer.as_ref().is_none_or(|t| !t.is_finished()))
    }
}

impl Drop for ConsoleSynthesizer {
    fn drop(&mut self) {
        self.abort();
    }
}

type LineSource = Box<dyn AsyncBufRead + Unpin + Send>;

/// Turns non-empty input lines into final transcripts while listening.
pub struct LineRecognizer {
    events: UnboundedSender<RecognitionEvent>,
    listening: Arc<AtomicBool>,
    source: Option<LineSource>,
    reader: Option<JoinHandle<()>>,
}

impl LineRecognizer {
    pub fn new(source: LineSource, events: UnboundedSender<RecognitionEvent>) -> Self {
        Self {
            events,
            listening: Arc::new(AtomicBool::new(false)),
            source: Some(source),
            reader: None,
        }
    }

    /// Reads commands from standard input.
    pub fn stdin(events: UnboundedSender<RecognitionEvent>) -> Self {
        Self::new(Box::new(BufReader::new(tokio::io::stdin())), events)
    }

    fn send(&self, event: RecognitionEvent) {
        if self.events.send(event).is_err() {
            debug!("Recognition event receiver dropped");
        }
    }

    fn spawn_reader(&mut self) -> Result<()> {
        let Some(source) = self.source.take() else {
            return Ok(());
        };
        let events = self.events.clone();
        let listening = Arc::clone(&self.listening);
        self.reader = Some(runtime_handle("LineRecognizer")?.spawn(async move {
            let mut lines = source.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let Some(text) = transcript(&line) else {
                    continue;
                };
                if !listening.load(Ordering::SeqCst) {
                    continue;
                }
                if events
                    .send(RecognitionEvent::final_result(text, 1.0))
                    .is_err()
                {
                    break;
                }
            }
            debug!("Line input closed");
        }));
        Ok(())
    }
}

/// A typed line as a transcript: surrounding whitespace and trailing
/// sentence punctuation removed. `None` when nothing is left.
fn transcript(line: &str) -> Option<&str> {
    let text = line
        .trim()
        .trim_end_matches(['.', ',', '!', '?', ';', ':'])
        .trim_end();
    (!text.is_empty()).then_some(text)
}

impl SpeechRecognizer for LineRecognizer {
    fn configure(&mut self, settings: &RecognizerSettings) -> Result<()> {
        debug!(language = %settings.language, "Line recognizer configured");
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.listening.store(true, Ordering::SeqCst);
        self.spawn_reader()?;
        self.send(RecognitionEvent::Started);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.listening.swap(false, Ordering::SeqCst) {
            self.send(RecognitionEvent::Ended);
        }
        Ok(())
    }
}

impl Drop for LineRecognizer {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
