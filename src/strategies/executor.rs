//! # Shared execution wrapper for one intent.
//!
//! Every admission strategy funnels each admitted request through
//! [`execute_intent`], which owns the per-invocation semantics the
//! strategies have in common:
//!
//! ```text
//! request ──► already resolved? ──► skip (cancelled before it ever ran)
//!         ──► filter(state, intent)? ──► IntentRejected, handle ← Rejected
//!         ──► snapshot state
//!         ──► run reducer ⟂ invocation token
//!               │
//!               ├─ Ok        ──► guardian close-check ──► IntentHandled
//!               ├─ Canceled  ──► rollback to snapshot (per strategy)
//!               │                └─► IntentCancelled, handle ← Canceled
//!               ├─ Contract  ──► IntentError event, handle ← Contract
//!               └─ Err       ──► IntentError event, handle ← err,
//!                                error handler / UnhandledError,
//!                                close store if close_on_exceptions
//! ```
//!
//! ## Rules
//! - Exactly one terminal event per request: `IntentRejected`,
//!   `IntentHandled`, `IntentCancelled`, or `IntentError`.
//! - The completion handle resolves exactly once, on every path.
//! - Rollback happens only for cancellation, never for failure.
//! - Contract violations bypass `close_on_exceptions` entirely.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::actions::StoreAction;
use crate::core::store::StoreInner;
use crate::core::{IntentContext, StoreState};
use crate::error::IntentError;
use crate::events::EventKind;
use crate::guardian::Guardian;
use crate::intents::{IntentRequest, StoreIntent};

/// Executes one intent request to its terminal outcome.
///
/// `rollback` is the strategy's `rollback_on_cancellation()` flag, passed in
/// by the dispatch loop that admitted the request.
pub(crate) async fn execute_intent<S, I, A>(
    inner: Arc<StoreInner<S, I, A>>,
    req: IntentRequest<I>,
    token: CancellationToken,
    rollback: bool,
) where
    S: StoreState,
    I: StoreIntent,
    A: StoreAction,
{
    let IntentRequest { intent, handle, .. } = req;

    // Cancelled before it ever ran.
    if handle.is_resolved() {
        return;
    }

    let before = inner.state.get();

    if let Some(filter) = &inner.filter {
        if !filter(&before, &intent) {
            inner.publish(inner.event(EventKind::IntentRejected));
            handle.resolve(Err(IntentError::Rejected));
            return;
        }
    }
    inner.publish(inner.event(EventKind::IntentAccepted));

    let guardian = Arc::new(Guardian::new(
        inner.cfg.debug_checks,
        inner.cfg.strategy.is_parallel(),
    ));
    let ctx = IntentContext::new(Arc::clone(&inner), Arc::clone(&guardian), token.clone());

    let body = inner.reducer.reduce(ctx, intent);
    let res = tokio::select! {
        res = body => res,
        _ = token.cancelled() => Err(IntentError::Canceled),
    };
    // The did-nothing check applies only to bodies that returned cleanly.
    let res = match res {
        Ok(()) => guardian.close(),
        err => err,
    };

    match res {
        Ok(()) => {
            inner.publish(inner.event(EventKind::IntentHandled));
            handle.resolve(Ok(()));
        }
        Err(IntentError::Canceled) => {
            if rollback && inner.state.restore(before) {
                inner.publish(inner.event(EventKind::StateChanged));
            }
            inner.publish(inner.event(EventKind::IntentCancelled));
            handle.resolve(Err(IntentError::Canceled));
        }
        Err(err) if err.is_contract_violation() => {
            inner.publish(inner.event(EventKind::IntentError).with_reason(err.as_message()));
            handle.resolve(Err(err));
        }
        Err(err) => {
            inner.publish(inner.event(EventKind::IntentError).with_reason(err.as_message()));
            handle.resolve(Err(err.clone()));
            inner.report_failure(&err);
        }
    }
}
