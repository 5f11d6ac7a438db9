//! # Dispatch queue with pluggable capacity and overflow behavior.
//!
//! The store's ingress funnels every intent request through one of three
//! channel backends behind a single sender/receiver pair:
//!
//! - **Unbounded** — `mpsc::unbounded_channel`, never full. Default for the
//!   sequential strategy.
//! - **Bounded + [`OverflowPolicy::Suspend`]** — `mpsc::channel(n)`; the
//!   async `send` suspends the producer until space frees up, `try_send`
//!   reports `Full`.
//! - **Bounded + [`OverflowPolicy::DropOldest`]** — a ring buffer; producing
//!   over capacity displaces the **oldest** unconsumed item and hands it back
//!   to the producer for drop handling. Capacity 1 of this backend is the
//!   conflating queue used by the queue-backed superseding strategy (newest
//!   overwrites oldest).
//!
//! ## Rules
//! - Multi-producer, single-consumer.
//! - `close()` is receiver-side: racing producers get their item back and
//!   report it undeliverable at the ingress boundary.
//! - `drain()` empties whatever remained after close so the store can fail
//!   the leftover completion handles deterministically.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::{Notify, mpsc};

/// Capacity of the dispatch queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueCapacity {
    /// No bound; producers never wait. (Backpressure is the consumer's pace.)
    Unbounded,
    /// At most `n` queued requests; behavior on overflow is governed by
    /// [`OverflowPolicy`]. Clamped to a minimum of 1.
    Bounded(usize),
}

/// Policy controlling what happens when a bounded queue is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Suspend the producer until space is available (`try_send` fails fast
    /// with `Full` instead).
    #[default]
    Suspend,
    /// Displace the oldest unconsumed item to make room. The displaced item
    /// is returned to the producer, which reports it dropped (or cancelled,
    /// under a superseding strategy).
    DropOldest,
}

/// Error returned by [`IntentSender::try_send`], carrying the item back.
pub(crate) enum QueueSendError<T> {
    /// Queue is full (bounded, suspending policy).
    Full(T),
    /// Queue was closed by the receiver.
    Closed(T),
}

impl<T> QueueSendError<T> {
    pub(crate) fn into_item(self) -> T {
        match self {
            QueueSendError::Full(item) | QueueSendError::Closed(item) => item,
        }
    }
}

struct RingState<T> {
    buf: VecDeque<T>,
    cap: usize,
    closed: bool,
}

/// Drop-oldest ring shared between the sender and receiver halves.
struct Ring<T> {
    state: Mutex<RingState<T>>,
    notify: Notify,
}

/// Producer half of the dispatch queue.
pub(crate) enum IntentSender<T> {
    Unbounded(mpsc::UnboundedSender<T>),
    Bounded(mpsc::Sender<T>),
    Ring(Arc<Ring<T>>),
}

/// Consumer half of the dispatch queue.
pub(crate) enum IntentReceiver<T> {
    Unbounded(mpsc::UnboundedReceiver<T>),
    Bounded(mpsc::Receiver<T>),
    Ring(Arc<Ring<T>>),
}

/// Creates a queue for the given capacity/overflow combination.
pub(crate) fn channel<T>(
    capacity: QueueCapacity,
    overflow: OverflowPolicy,
) -> (IntentSender<T>, IntentReceiver<T>) {
    match (capacity, overflow) {
        (QueueCapacity::Unbounded, _) => {
            let (tx, rx) = mpsc::unbounded_channel();
            (IntentSender::Unbounded(tx), IntentReceiver::Unbounded(rx))
        }
        (QueueCapacity::Bounded(n), OverflowPolicy::Suspend) => {
            let (tx, rx) = mpsc::channel(n.max(1));
            (IntentSender::Bounded(tx), IntentReceiver::Bounded(rx))
        }
        (QueueCapacity::Bounded(n), OverflowPolicy::DropOldest) => {
            let ring = Arc::new(Ring {
                state: Mutex::new(RingState {
                    buf: VecDeque::with_capacity(n.max(1)),
                    cap: n.max(1),
                    closed: false,
                }),
                notify: Notify::new(),
            });
            (IntentSender::Ring(ring.clone()), IntentReceiver::Ring(ring))
        }
    }
}

/// Creates the conflating single-slot queue (newest displaces oldest).
pub(crate) fn conflated<T>() -> (IntentSender<T>, IntentReceiver<T>) {
    channel(QueueCapacity::Bounded(1), OverflowPolicy::DropOldest)
}

impl<T> IntentSender<T> {
    /// Non-suspending send.
    ///
    /// Returns `Ok(Some(displaced))` when a drop-oldest queue displaced an
    /// older item to make room.
    pub(crate) fn try_send(&self, item: T) -> Result<Option<T>, QueueSendError<T>> {
        match self {
            IntentSender::Unbounded(tx) => tx
                .send(item)
                .map(|()| None)
                .map_err(|e| QueueSendError::Closed(e.0)),
            IntentSender::Bounded(tx) => match tx.try_send(item) {
                Ok(()) => Ok(None),
                Err(mpsc::error::TrySendError::Full(item)) => Err(QueueSendError::Full(item)),
                Err(mpsc::error::TrySendError::Closed(item)) => Err(QueueSendError::Closed(item)),
            },
            IntentSender::Ring(ring) => {
                let mut state = ring.state.lock().unwrap();
                if state.closed {
                    return Err(QueueSendError::Closed(item));
                }
                let displaced = if state.buf.len() == state.cap {
                    state.buf.pop_front()
                } else {
                    None
                };
                state.buf.push_back(item);
                drop(state);
                ring.notify.notify_one();
                Ok(displaced)
            }
        }
    }

    /// Suspending send: waits for space on a bounded suspending queue.
    ///
    /// On a closed queue the item is handed back via `Err`.
    pub(crate) async fn send(&self, item: T) -> Result<Option<T>, T> {
        match self {
            IntentSender::Bounded(tx) => tx.send(item).await.map(|()| None).map_err(|e| e.0),
            // Unbounded and drop-oldest queues never exert backpressure.
            _ => self.try_send(item).map_err(QueueSendError::into_item),
        }
    }
}

impl<T> IntentReceiver<T> {
    /// Receives the next request, or `None` once the queue is closed and
    /// empty.
    pub(crate) async fn recv(&mut self) -> Option<T> {
        match self {
            IntentReceiver::Unbounded(rx) => rx.recv().await,
            IntentReceiver::Bounded(rx) => rx.recv().await,
            IntentReceiver::Ring(ring) => loop {
                {
                    let mut state = ring.state.lock().unwrap();
                    if let Some(item) = state.buf.pop_front() {
                        return Some(item);
                    }
                    if state.closed {
                        return None;
                    }
                }
                // notify_one stores a permit, so a send racing this gap is
                // not lost.
                ring.notify.notified().await;
            },
        }
    }

    /// Closes the queue from the consumer side. Subsequent sends fail and
    /// return the item to the producer.
    pub(crate) fn close(&mut self) {
        match self {
            IntentReceiver::Unbounded(rx) => rx.close(),
            IntentReceiver::Bounded(rx) => rx.close(),
            IntentReceiver::Ring(ring) => {
                ring.state.lock().unwrap().closed = true;
            }
        }
    }

    /// Empties everything still buffered. Intended for undelivered-element
    /// handling after [`IntentReceiver::close`].
    pub(crate) fn drain(&mut self) -> Vec<T> {
        match self {
            IntentReceiver::Unbounded(rx) => {
                let mut out = Vec::new();
                while let Ok(item) = rx.try_recv() {
                    out.push(item);
                }
                out
            }
            IntentReceiver::Bounded(rx) => {
                let mut out = Vec::new();
                while let Ok(item) = rx.try_recv() {
                    out.push(item);
                }
                out
            }
            IntentReceiver::Ring(ring) => {
                let mut state = ring.state.lock().unwrap();
                state.buf.drain(..).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unbounded_keeps_order() {
        let (tx, mut rx) = channel(QueueCapacity::Unbounded, OverflowPolicy::Suspend);
        for i in 0..4 {
            assert!(tx.try_send(i).is_ok());
        }
        for i in 0..4 {
            assert_eq!(rx.recv().await, Some(i));
        }
    }

    #[tokio::test]
    async fn test_bounded_suspend_reports_full() {
        let (tx, mut rx) = channel(QueueCapacity::Bounded(2), OverflowPolicy::Suspend);
        assert!(tx.try_send(1).is_ok());
        assert!(tx.try_send(2).is_ok());
        assert!(matches!(tx.try_send(3), Err(QueueSendError::Full(3))));

        assert_eq!(rx.recv().await, Some(1));
        assert!(tx.try_send(3).is_ok());
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test]
    async fn test_drop_oldest_displaces_in_fifo_order() {
        let (tx, mut rx) = channel(QueueCapacity::Bounded(2), OverflowPolicy::DropOldest);
        assert!(matches!(tx.try_send(1), Ok(None)));
        assert!(matches!(tx.try_send(2), Ok(None)));
        assert!(matches!(tx.try_send(3), Ok(Some(1))));

        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test]
    async fn test_conflated_keeps_only_newest() {
        let (tx, mut rx) = conflated();
        assert!(matches!(tx.try_send("a"), Ok(None)));
        assert!(matches!(tx.try_send("b"), Ok(Some("a"))));
        assert!(matches!(tx.try_send("c"), Ok(Some("b"))));
        assert_eq!(rx.recv().await, Some("c"));
    }

    #[tokio::test]
    async fn test_close_hands_item_back_and_drains() {
        let (tx, mut rx) = channel(QueueCapacity::Unbounded, OverflowPolicy::Suspend);
        assert!(tx.try_send(1).is_ok());
        assert!(tx.try_send(2).is_ok());

        rx.close();
        assert!(matches!(tx.try_send(3), Err(QueueSendError::Closed(3))));
        assert_eq!(rx.drain(), vec![1, 2]);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_ring_close_ends_pending_recv() {
        let (tx, mut rx) = conflated::<u8>();
        rx.close();
        assert!(matches!(tx.try_send(1), Err(QueueSendError::Closed(1))));
        assert_eq!(rx.recv().await, None);
    }
}
