//! # Event bus for broadcasting store events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from multiple sources (the dispatch loop,
//! intent executors, the side-job supervisor, the store itself).
//!
//! ## Architecture
//! ```text
//! Publishers (many):                    Subscriber (one):
//!   executor  ──┐
//!   side-jobs ──┼──────► Bus ───────► interceptor listener ────► SubscriberSet
//!   store     ──┤  (broadcast chan)       (in Store)
//!   dispatch  ──┘
//! ```
//!
//! The store uses a single internal subscriber (the interceptor listener)
//! that fans out events to user interceptors via
//! [`SubscriberSet`](crate::SubscriberSet); tests and tooling may subscribe
//! directly.
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls
//!   `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent events for all
//!   receivers; when full, the oldest events are dropped.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip the
//!   `n` oldest items.
//! - **No persistence**: events are lost if there are no active subscribers
//!   at send time.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for store events.
///
/// Thin wrapper over [`tokio::sync::broadcast`] that provides a
/// `publish`/`subscribe` API. Multiple publishers can publish concurrently;
/// subscribers receive clones of each event.
///
/// ### Properties
/// - **Non-blocking**: `publish()` returns immediately.
/// - **Fire-and-forget**: no delivery or durability guarantees.
/// - **Cloneable**: cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity.
    ///
    /// ### Notes
    /// - Capacity is **shared** across all receivers (not per-subscriber).
    /// - When receivers lag, they will observe `RecvError::Lagged`.
    /// - The minimum capacity is 1 (clamped).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active subscribers.
    ///
    /// - Takes ownership of the event; the broadcast channel clones it for
    ///   each receiver.
    /// - If there are no receivers, the event is dropped (this function still
    ///   returns immediately).
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    ///
    /// - Each call creates an **independent** receiver.
    /// - A receiver only gets events **sent after** it subscribes.
    /// - Slow receivers get `RecvError::Lagged(n)` and skip over missed items.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publishes a borrowed event by cloning it.
    ///
    /// Shorthand for `publish(ev.clone())`, useful when you already have a
    /// reference.
    pub fn publish_ref(&self, ev: &Event) {
        let _ = self.tx.send(ev.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_publish_and_subscribe() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(Event::now(EventKind::Started).with_store("s"));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::Started);
        assert_eq!(ev.store.as_deref(), Some("s"));
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let bus = Bus::new(16);
        bus.publish(Event::now(EventKind::IntentQueued));

        let mut rx = bus.subscribe();
        bus.publish(Event::now(EventKind::IntentHandled));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::IntentHandled);
    }

    #[tokio::test]
    async fn test_capacity_is_clamped_to_one() {
        let bus = Bus::new(0);
        let mut rx = bus.subscribe();
        bus.publish(Event::now(EventKind::Started));
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::Started);
    }
}
