//! # Lifecycle and processing events emitted by the store.
//!
//! The [`EventKind`] enum is the closed set of event variants across five
//! categories:
//! - **Lifecycle events**: store start and terminal close
//! - **Intent events**: queueing, admission, execution outcome
//! - **State events**: committed state changes
//! - **Side-effect events**: action queueing and emission
//! - **Side-job events**: background task lifecycle
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the
//! store name, side-job keys, and failure reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically across all stores in the process. Use `seq` to restore the
//! exact emission order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use statevisor::{Event, EventKind};
//!
//! let ev = Event::now(EventKind::SideJobStarted)
//!     .with_store("demo-store")
//!     .with_key("refresh");
//!
//! assert_eq!(ev.kind, EventKind::SideJobStarted);
//! assert_eq!(ev.key.as_deref(), Some("refresh"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::jobs::RestartState;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of store events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Lifecycle events ===
    /// The store transitioned from `Idle` to `Started`.
    ///
    /// Sets:
    /// - `store`: store name
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    Started,

    /// The store transitioned to `Closed`. Terminal sentinel: this is the
    /// last event a subscriber observes for a store.
    ///
    /// Sets:
    /// - `store`: store name
    Closed,

    // === Intent events ===
    /// An intent was accepted into the dispatch queue.
    IntentQueued,

    /// An intent passed the filter and is about to execute.
    IntentAccepted,

    /// The intent filter rejected an intent before admission.
    IntentRejected,

    /// An intent could not be delivered (overflow with a dropping policy,
    /// queue closed, or failed re-delivery).
    ///
    /// Sets:
    /// - `reason`: why delivery failed
    IntentDropped,

    /// An intent executed to completion successfully.
    IntentHandled,

    /// An in-flight intent was cancelled (superseded or store shutdown).
    /// State was rolled back if the strategy allows it.
    IntentCancelled,

    /// An intent body failed with a handler error.
    ///
    /// Sets:
    /// - `reason`: failure message
    IntentError,

    // === State events ===
    /// The committed state value changed. Emitted only when the new value
    /// actually differs from the previous one.
    StateChanged,

    // === Side-effect events ===
    /// A side-effect was requested by an intent body.
    SideEffectQueued,

    /// A side-effect was made available to subscribers.
    SideEffectEmitted,

    // === Side-job events ===
    /// A side-job request was queued for the supervisor.
    ///
    /// Sets:
    /// - `key`: side-job key
    SideJobQueued,

    /// A side-job began executing.
    ///
    /// Sets:
    /// - `key`: side-job key
    /// - `restart`: `Initial` or `Restarted`
    SideJobStarted,

    /// A side-job ran to completion.
    ///
    /// Sets:
    /// - `key`: side-job key
    SideJobCompleted,

    /// A side-job was cancelled (superseded under its key, cancelled with
    /// its issuing intent, or store shutdown).
    ///
    /// Sets:
    /// - `key`: side-job key
    SideJobCancelled,

    /// A side-job body failed.
    ///
    /// Sets:
    /// - `key`: side-job key
    /// - `reason`: failure message
    SideJobError,

    // === Error events ===
    /// A failure had no error handler to consume it.
    ///
    /// Sets:
    /// - `reason`: failure message
    UnhandledError,
}

/// Store event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the emitting store.
    pub store: Option<Arc<str>>,
    /// Side-job key, if applicable.
    pub key: Option<Arc<str>>,
    /// Human-readable reason (errors, drop details, etc.).
    pub reason: Option<Arc<str>>,
    /// Restart state for side-job start events.
    pub restart: Option<RestartState>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// the next global sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            store: None,
            key: None,
            reason: None,
            restart: None,
        }
    }

    /// Attaches the emitting store's name.
    #[inline]
    pub fn with_store(mut self, store: impl Into<Arc<str>>) -> Self {
        self.store = Some(store.into());
        self
    }

    /// Attaches a side-job key.
    #[inline]
    pub fn with_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a side-job restart state.
    #[inline]
    pub fn with_restart(mut self, restart: RestartState) -> Self {
        self.restart = Some(restart);
        self
    }

    /// True for the terminal [`EventKind::Closed`] sentinel: subscribers stop
    /// after observing it.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::now(EventKind::IntentQueued);
        let b = Event::now(EventKind::IntentQueued);
        let c = Event::now(EventKind::StateChanged);
        assert!(a.seq < b.seq);
        assert!(b.seq < c.seq);
    }

    #[test]
    fn test_builders_attach_metadata() {
        let ev = Event::now(EventKind::SideJobError)
            .with_store("s")
            .with_key("k")
            .with_reason("boom");
        assert_eq!(ev.store.as_deref(), Some("s"));
        assert_eq!(ev.key.as_deref(), Some("k"));
        assert_eq!(ev.reason.as_deref(), Some("boom"));
        assert!(ev.restart.is_none());
    }

    #[test]
    fn test_terminal_classification() {
        assert!(Event::now(EventKind::Closed).is_terminal());
        assert!(!Event::now(EventKind::Started).is_terminal());
    }
}
