//! # State cell: CAS-swapped current value with change observation.
//!
//! The store holds exactly one authoritative state value at any instant.
//! [`StateCell`] keeps it in a `tokio::sync::watch` channel over `Arc<S>`:
//!
//! - readers take cheap `Arc` snapshots;
//! - writers go through a compare-and-swap against the snapshot they
//!   observed (`Arc::ptr_eq`), retrying on a lost race — never holding a
//!   lock across user code;
//! - observers see the latest value on subscribe and a notification only
//!   when the committed value actually differs (`PartialEq`).
//!
//! Single-writer strategies win the CAS on the first try by construction;
//! the unordered-concurrent strategy relies on the retry loop.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Marker for state types held by a store.
///
/// Blanket-implemented for every `Clone + PartialEq + Send + Sync + 'static`
/// type. `PartialEq` is what lets the store suppress no-op change
/// notifications.
pub trait StoreState: Clone + PartialEq + Send + Sync + 'static {}

impl<T: Clone + PartialEq + Send + Sync + 'static> StoreState for T {}

/// The store's single authoritative state slot.
pub(crate) struct StateCell<S> {
    tx: watch::Sender<Arc<S>>,
}

impl<S: StoreState> StateCell<S> {
    pub(crate) fn new(initial: S) -> Self {
        Self {
            tx: watch::Sender::new(Arc::new(initial)),
        }
    }

    /// Snapshot of the current value.
    pub(crate) fn get(&self) -> Arc<S> {
        self.tx.borrow().clone()
    }

    /// Subscribes an observer; the receiver sees the current value
    /// immediately and is notified on actual changes.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<S>> {
        self.tx.subscribe()
    }

    /// Compare-and-swap against the snapshot the writer observed.
    ///
    /// Returns `(swapped, changed)`: `swapped` is whether this writer won,
    /// `changed` whether the committed value differs from the previous one
    /// (observers are only notified when it does).
    pub(crate) fn compare_and_swap(&self, expected: &Arc<S>, next: Arc<S>) -> (bool, bool) {
        let mut swapped = false;
        let mut changed = false;
        self.tx.send_if_modified(|cur| {
            if Arc::ptr_eq(cur, expected) {
                swapped = true;
                changed = **cur != *next;
                *cur = next;
                changed
            } else {
                false
            }
        });
        (swapped, changed)
    }

    /// Applies `f` to the current value, retrying the CAS until it commits.
    ///
    /// Returns `(previous, committed, changed)`.
    pub(crate) fn update<F: FnMut(&S) -> S>(&self, mut f: F) -> (Arc<S>, Arc<S>, bool) {
        loop {
            let cur = self.get();
            let next = Arc::new(f(&cur));
            let (swapped, changed) = self.compare_and_swap(&cur, Arc::clone(&next));
            if swapped {
                return (cur, next, changed);
            }
        }
    }

    /// Unconditionally restores a snapshot (rollback-on-cancellation).
    ///
    /// Returns whether the value actually changed; observers are notified
    /// only in that case.
    pub(crate) fn restore(&self, snapshot: Arc<S>) -> bool {
        let mut changed = false;
        self.tx.send_if_modified(|cur| {
            changed = **cur != *snapshot;
            *cur = snapshot;
            changed
        });
        changed
    }
}

/// Observable stream of committed state values.
///
/// Replays the latest value to a new observer, then yields only on actual
/// change, and terminates once the store closes.
pub struct StateStream<S> {
    rx: watch::Receiver<Arc<S>>,
    token: CancellationToken,
    replayed: bool,
}

impl<S: StoreState> StateStream<S> {
    pub(crate) fn new(rx: watch::Receiver<Arc<S>>, token: CancellationToken) -> Self {
        Self {
            rx,
            token,
            replayed: false,
        }
    }

    /// Yields the next state value, or `None` once the store is closed.
    pub async fn next(&mut self) -> Option<Arc<S>> {
        if !self.replayed {
            self.replayed = true;
            return Some(self.rx.borrow_and_update().clone());
        }
        tokio::select! {
            _ = self.token.cancelled() => None,
            changed = self.rx.changed() => match changed {
                Ok(()) => Some(self.rx.borrow_and_update().clone()),
                Err(_) => None,
            },
        }
    }
}
