//! Time sources for the state machines.
//!
//! Monotonic instants drive timers; epoch milliseconds stamp records.
//! Tests swap in [`ManualClock`] so no test ever sleeps.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    /// Monotonic now, used for deadlines and elapsed time.
    fn now(&self) -> Instant;

    /// Wall-clock milliseconds since the Unix epoch.
    fn epoch_millis(&self) -> i64;
}

pub type SharedClock = Arc<dyn Clock>;

/// Real time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[derive(Debug)]
struct ManualTime {
    instant: Instant,
    epoch_millis: i64,
}

/// Hand-advanced clock for deterministic tests.
///
/// Clones share the same time, so a test keeps one copy and hands the other
/// to the component under test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    time: Arc<Mutex<ManualTime>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Starts at a fixed epoch so timestamps are reproducible.
    pub fn new() -> Self {
        Self::starting_at(1_700_000_000_000)
    }

    pub fn starting_at(epoch_millis: i64) -> Self {
        Self {
            time: Arc::new(Mutex::new(ManualTime {
                instant: Instant::now(),
                epoch_millis,
            })),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut time = self.time.lock().unwrap_or_else(|e| e.into_inner());
        time.instant += by;
        time.epoch_millis += by.as_millis() as i64;
    }

    pub fn advance_ms(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.time.lock().unwrap_or_else(|e| e.into_inner()).instant
    }

    fn epoch_millis(&self) -> i64 {
        self.time
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .epoch_millis
    }
}
