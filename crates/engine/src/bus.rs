//! Event bus
//!
//! Each subscriber owns the receiving end of its own channel and chooses
//! the event kinds it wants. Publishing copies the event into every
//! interested channel; a subscriber that dropped its receiver is forgotten
//! on the next publish. Events published from one thread reach each
//! subscriber in publication order.

use datamill_core::{Event, EventKind};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use tracing::trace;

struct Subscriber {
    kinds: Option<Vec<EventKind>>,
    sender: Sender<Event>,
}

impl Subscriber {
    fn wants(&self, kind: EventKind) -> bool {
        self.kinds.as_ref().map_or(true, |k| k.contains(&kind))
    }
}

/// Fan-out of pipeline events to subscribers
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    published: AtomicU64,
}

impl EventBus {
    /// Bus without subscribers
    pub fn new() -> Self {
        EventBus::default()
    }

    /// Receive events of one kind
    pub fn subscribe(&self, kind: EventKind) -> Receiver<Event> {
        self.subscribe_to(Some(vec![kind]))
    }

    /// Receive events of several kinds on one channel
    pub fn subscribe_many(&self, kinds: &[EventKind]) -> Receiver<Event> {
        self.subscribe_to(Some(kinds.to_vec()))
    }

    /// Receive every event
    pub fn subscribe_all(&self) -> Receiver<Event> {
        self.subscribe_to(None)
    }

    fn subscribe_to(&self, kinds: Option<Vec<EventKind>>) -> Receiver<Event> {
        let (sender, receiver) = channel();
        self.subscribers.lock().push(Subscriber { kinds, sender });
        receiver
    }

    /// Deliver an event to every interested subscriber
    pub fn publish(&self, event: impl Into<Event>) {
        let event = event.into();
        let kind = event.kind();
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| !s.wants(kind) || s.sender.send(event).is_ok());
        self.published.fetch_add(1, Ordering::Relaxed);
        trace!(target: "datamill::bus", ?kind, subscribers = subscribers.len(), "Published event");
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Events published since the bus was created
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}
