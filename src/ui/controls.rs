//! Floating voice controls that hide themselves after a quiet period.

use crate::telemetry::{TelemetryEventType, TelemetryHandle};
use crate::timers::TimerSet;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlsTimer {
    AutoHide,
}

/// Visibility of the controls plus the countdown that hides them.
///
/// Every show or activity restarts the countdown; expiry hides.
#[derive(Debug)]
pub struct AutoHideControls {
    visible: bool,
    delay: Duration,
    timers: TimerSet<ControlsTimer>,
    telemetry: TelemetryHandle,
}

impl AutoHideControls {
    pub fn new(delay_ms: u64, telemetry: TelemetryHandle) -> Self {
        Self {
            visible: false,
            delay: Duration::from_millis(delay_ms),
            timers: TimerSet::new(),
            telemetry,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Takes effect from the next show.
    pub fn set_delay(&mut self, delay_ms: u64) {
        self.delay = Duration::from_millis(delay_ms);
    }

    pub fn show(&mut self, now: Instant) {
        if !self.visible {
            self.visible = true;
            self.telemetry.track(TelemetryEventType::ControlsShow);
        }
        self.timers.arm_after(ControlsTimer::AutoHide, now, self.delay);
    }

    pub fn hide(&mut self) {
        self.timers.clear();
        if self.visible {
            self.visible = false;
            self.telemetry.track(TelemetryEventType::ControlsHide);
        }
    }

    /// Pointer movement. Only counts while something is listening or
    /// speaking.
    pub fn activity(&mut self, now: Instant, engaged: bool) {
        if engaged {
            self.show(now);
        }
    }

    pub fn poll_timers(&mut self, now: Instant) {
        if !self.timers.take_due(now).is_empty() {
            self.hide();
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::config::TelemetryConfig;
    use crate::telemetry::TelemetryService;

    fn controls() -> (AutoHideControls, ManualClock, TelemetryHandle) {
        let clock = ManualClock::new();
        let telemetry = TelemetryHandle::new(TelemetryService::in_memory(
            TelemetryConfig::default(),
            clock.shared(),
        ));
        telemetry.lock().start_session("ui");
        (AutoHideControls::new(5000, telemetry.clone()), clock, telemetry)
    }

    #[test]
    fn hides_after_delay() {
        let (mut controls, clock, _telemetry) = controls();
        controls.show(clock.now());
        assert!(controls.is_visible());

        clock.advance_ms(4999);
        controls.poll_timers(clock.now());
        assert!(controls.is_visible());

        clock.advance_ms(1);
        controls.poll_timers(clock.now());
        assert!(!controls.is_visible());
        assert!(controls.next_deadline().is_none());
    }

    #[test]
    fn activity_restarts_countdown() {
        let (mut controls, clock, _telemetry) = controls();
        controls.show(clock.now());
        clock.advance_ms(4000);
        controls.activity(clock.now(), true);
        clock.advance_ms(4000);
        controls.poll_timers(clock.now());
        assert!(controls.is_visible());

        // Idle pointer movement does not keep them up.
        controls.activity(clock.now(), false);
        clock.advance_ms(1000);
        controls.poll_timers(clock.now());
        assert!(!controls.is_visible());
    }

    #[test]
    fn show_and_hide_are_tracked_once() {
        let (mut controls, clock, telemetry) = controls();
        controls.show(clock.now());
        controls.show(clock.now());
        controls.hide();
        controls.hide();

        let types: Vec<_> = telemetry
            .lock()
            .session("ui")
            .iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            types,
            vec![
                TelemetryEventType::SessionStart,
                TelemetryEventType::ControlsShow,
                TelemetryEventType::ControlsHide,
            ]
        );
    }
}
