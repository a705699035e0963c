//! Named timed transitions owned by a state machine.
//!
//! Each key has at most one deadline. Arming an armed key replaces its
//! deadline, which is how debouncing works. Owners clear the whole set on
//! teardown, so nothing can fire afterwards.

use std::fmt::Debug;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct TimerSet<K> {
    deadlines: Vec<(K, Instant)>,
}

impl<K> Default for TimerSet<K> {
    fn default() -> Self {
        Self {
            deadlines: Vec::new(),
        }
    }
}

impl<K: Copy + Eq + Debug> TimerSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `key` to fire at `at`, replacing any earlier deadline for it.
    pub fn arm(&mut self, key: K, at: Instant) {
        match self.deadlines.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = at,
            None => self.deadlines.push((key, at)),
        }
    }

    pub fn arm_after(&mut self, key: K, now: Instant, delay: Duration) {
        self.arm(key, now + delay);
    }

    /// Returns true if the key was armed.
    pub fn cancel(&mut self, key: K) -> bool {
        let before = self.deadlines.len();
        self.deadlines.retain(|(k, _)| *k != key);
        self.deadlines.len() != before
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
    }

    pub fn is_armed(&self, key: K) -> bool {
        self.deadlines.iter().any(|(k, _)| *k == key)
    }

    pub fn deadline(&self, key: K) -> Option<Instant> {
        self.deadlines
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, at)| *at)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.iter().map(|(_, at)| *at).min()
    }

    /// Disarm and return every key due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<K> {
        let mut due: Vec<(K, Instant)> = Vec::new();
        self.deadlines.retain(|&(k, at)| {
            if at <= now {
                due.push((k, at));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(_, at)| *at);
        due.into_iter().map(|(k, _)| k).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }
}
