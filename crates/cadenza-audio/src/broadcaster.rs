//! Single-subscriber event fan-out.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::debug;

use cadenza_core::{EventState, PlaybackEvent};

/// Delivers events to at most one subscriber.
///
/// Subscribing again replaces the previous subscriber. Emitting with no
/// subscriber (or a subscriber that hung up) drops the event.
pub struct EventBroadcaster<T> {
    subscriber: Mutex<Option<Sender<T>>>,
}

impl<T> Default for EventBroadcaster<T> {
    fn default() -> Self {
        Self {
            subscriber: Mutex::new(None),
        }
    }
}

impl<T: Send> EventBroadcaster<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new subscriber, replacing any previous one.
    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = unbounded();
        if self.subscriber.lock().replace(tx).is_some() {
            debug!("Replaced existing event subscriber");
        }
        rx
    }

    pub fn has_subscriber(&self) -> bool {
        self.subscriber.lock().is_some()
    }

    /// Deliver `item` to the subscriber. Returns whether it was delivered.
    pub fn emit(&self, item: T) -> bool {
        let mut subscriber = self.subscriber.lock();
        let Some(tx) = subscriber.as_ref() else {
            return false;
        };
        if tx.send(item).is_ok() {
            return true;
        }
        debug!("Event subscriber hung up");
        *subscriber = None;
        false
    }
}

impl EventBroadcaster<PlaybackEvent> {
    pub fn emit_state(&self, state: EventState, position_ms: u64, duration_ms: u64) -> bool {
        self.emit(PlaybackEvent::new(state, position_ms, duration_ms))
    }
}
