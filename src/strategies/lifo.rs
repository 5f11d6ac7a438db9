//! # Superseding (LIFO) dispatch loop, simple variant.
//!
//! Maintains a single "current execution" cell. Each new request cancels the
//! previous execution's token and spawns the new one immediately, without
//! waiting for the cancellation to finish — the outgoing intent may run
//! briefly in parallel while it unwinds.
//!
//! ## Guarantees
//! - The last submitted intent always executes.
//! - A superseded intent is cancelled, never silently completed after a
//!   newer one started: its completion handle resolves with `Canceled` and
//!   its state effects are rolled back to its own pre-execution snapshot.
//! - No queueing: requests are consumed as fast as they arrive.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::actions::StoreAction;
use crate::core::store::StoreInner;
use crate::core::StoreState;
use crate::intents::{IntentRequest, StoreIntent};
use crate::queue::IntentReceiver;

use super::executor::execute_intent;

pub(crate) async fn run<S, I, A>(
    inner: Arc<StoreInner<S, I, A>>,
    mut rx: IntentReceiver<IntentRequest<I>>,
    token: CancellationToken,
) where
    S: StoreState,
    I: StoreIntent,
    A: StoreAction,
{
    let mut current: Option<CancellationToken> = None;
    let mut unwinding: Vec<JoinHandle<()>> = Vec::new();

    loop {
        let req = tokio::select! {
            _ = token.cancelled() => break,
            req = rx.recv() => match req {
                Some(req) => req,
                None => break,
            },
        };

        // Cancel the incumbent and start the newcomer right away; the old
        // execution unwinds concurrently.
        if let Some(prev) = current.take() {
            prev.cancel();
        }
        unwinding.retain(|join| !join.is_finished());

        let exec = token.child_token();
        unwinding.push(tokio::spawn(execute_intent(
            Arc::clone(&inner),
            req,
            exec.clone(),
            true,
        )));
        current = Some(exec);
    }

    // Every execution must reach its terminal outcome before the store's
    // final Closed event.
    if let Some(prev) = current.take() {
        prev.cancel();
    }
    for join in unwinding {
        let _ = join.await;
    }

    super::drain_undelivered(&inner, &mut rx);
}
