//! # Completion handle for a dispatched intent.
//!
//! [`IntentHandle`] is the future-like handle returned by `send`/`try_send`.
//! It resolves exactly once with the intent's outcome:
//!
//! - `Ok(())` — the intent executed to completion;
//! - `Err(IntentError::Canceled)` — superseded, displaced, or store shutdown;
//! - `Err(..)` — handler failure, rejection, or delivery failure.
//!
//! ## Rules
//! - Clonable; every clone observes the same single resolution.
//! - [`IntentHandle::cancel`] resolves the handle with a cancellation *before
//!   execution starts*; the executor skips a request whose handle is already
//!   resolved.
//! - Callers compose timeouts by racing [`IntentHandle::wait`] against
//!   `tokio::time::timeout`; the store has no built-in deadline.

use std::sync::Arc;
use std::sync::OnceLock;

use tokio::sync::Notify;

use crate::error::IntentError;

struct HandleInner {
    outcome: OnceLock<Result<(), IntentError>>,
    notify: Notify,
}

/// Awaitable, clonable handle resolved once per intent.
#[derive(Clone)]
pub struct IntentHandle {
    inner: Arc<HandleInner>,
}

impl IntentHandle {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(HandleInner {
                outcome: OnceLock::new(),
                notify: Notify::new(),
            }),
        }
    }

    /// Waits until the intent finishes, successfully or not.
    pub async fn wait(&self) -> Result<(), IntentError> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(outcome) = self.inner.outcome.get() {
                return outcome.clone();
            }
            notified.await;
        }
    }

    /// True once the handle has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.inner.outcome.get().is_some()
    }

    /// Returns the outcome without waiting, if already resolved.
    pub fn outcome(&self) -> Option<Result<(), IntentError>> {
        self.inner.outcome.get().cloned()
    }

    /// Cancels the intent before it runs.
    ///
    /// If the request has not been consumed by an admission strategy yet, the
    /// executor will skip it entirely. A handle that already resolved is
    /// unaffected.
    pub fn cancel(&self) {
        self.resolve(Err(IntentError::Canceled));
    }

    /// Resolves the handle; only the first resolution wins.
    pub(crate) fn resolve(&self, outcome: Result<(), IntentError>) -> bool {
        let won = self.inner.outcome.set(outcome).is_ok();
        if won {
            self.inner.notify.notify_waiters();
        }
        won
    }
}

impl std::fmt::Debug for IntentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentHandle")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_observes_resolution() {
        let handle = IntentHandle::new();
        let waiter = handle.clone();
        let join = tokio::spawn(async move { waiter.wait().await });

        // Give the waiter a chance to park first.
        tokio::task::yield_now().await;
        assert!(handle.resolve(Ok(())));

        assert!(join.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_first_resolution_wins() {
        let handle = IntentHandle::new();
        assert!(handle.resolve(Err(IntentError::Canceled)));
        assert!(!handle.resolve(Ok(())));

        assert!(matches!(handle.wait().await, Err(IntentError::Canceled)));
        assert!(handle.is_resolved());
    }

    #[tokio::test]
    async fn test_cancel_resolves_with_cancellation() {
        let handle = IntentHandle::new();
        handle.cancel();
        assert!(matches!(handle.outcome(), Some(Err(IntentError::Canceled))));
    }

    #[tokio::test]
    async fn test_wait_after_resolution_returns_immediately() {
        let handle = IntentHandle::new();
        handle.resolve(Ok(()));
        assert!(handle.wait().await.is_ok());
        // Clones share the same resolution.
        assert!(handle.clone().wait().await.is_ok());
    }
}
