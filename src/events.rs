//! Multi-subscriber event fan-out.
//!
//! Every subscriber gets its own crossbeam channel. Subscriptions unregister
//! themselves on drop, so observers never overwrite one another.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

type Registry<E> = Mutex<Vec<(u64, Sender<E>)>>;

pub struct EventBus<E> {
    subscribers: Arc<Registry<E>>,
    next_id: AtomicU64,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl<E: Clone> EventBus<E> {
    pub fn subscribe(&self) -> Subscription<E> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, tx));
        Subscription {
            id,
            receiver: rx,
            registry: Arc::downgrade(&self.subscribers),
        }
    }

    /// Deliver to every live subscriber. Disconnected ones are pruned.
    pub fn emit(&self, event: E) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }
}

/// Receiving end of an [`EventBus`]. Dropping it unsubscribes.
pub struct Subscription<E> {
    id: u64,
    receiver: Receiver<E>,
    registry: Weak<Registry<E>>,
}

impl<E> Subscription<E> {
    pub fn try_recv(&self) -> Option<E> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<E> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Everything delivered so far, oldest first.
    pub fn drain(&self) -> Vec<E> {
        self.receiver.try_iter().collect()
    }

    pub fn receiver(&self) -> &Receiver<E> {
        &self.receiver
    }

    /// Explicit form of dropping the subscription.
    pub fn dispose(self) {}
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|(id, _)| *id != self.id);
        }
    }
}
