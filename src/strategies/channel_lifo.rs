//! # Superseding dispatch loop, queue-backed (conflating) variant.
//!
//! Requests flow through a conflating capacity-1 queue: a newer submission
//! displaces an older unconsumed one (the displaced request resolves as
//! cancelled at the ingress boundary). The consumer loop cancels the
//! previous execution on every new item.
//!
//! ## Ordered sub-mode
//! - `ordered = false`: the new execution starts immediately and may overlap
//!   with the outgoing one while it unwinds.
//! - `ordered = true`: the loop **joins** the cancelled execution before
//!   starting the next one — no overlap ever, at the cost of the outgoing
//!   intent delaying the incoming one.

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
    ordered: bool,
) where
    S: StoreState,
    I: StoreIntent,
    A: StoreAction,
{
    let mut current: Option<(CancellationToken, JoinHandle<()>)> = None;
    let mut unwinding: Vec<JoinHandle<()>> = Vec::new();

    loop {
        let req = tokio::select! {
            _ = token.cancelled() => break,
            req = rx.recv() => match req {
                Some(req) => req,
                None => break,
            },
        };

        if let Some((prev, join)) = current.take() {
            prev.cancel();
            if ordered {
                // Wait for the rollback to finish so executions never
                // overlap.
                let _ = join.await;
            } else {
                unwinding.push(join);
            }
        }
        unwinding.retain(|join| !join.is_finished());

        let exec = token.child_token();
        let join = tokio::spawn(execute_intent(
            Arc::clone(&inner),
            req,
            exec.clone(),
            true,
        ));
        current = Some((exec, join));
    }

    // Every execution must reach its terminal outcome before the store's
    // final Closed event.
    if let Some((prev, join)) = current.take() {
        prev.cancel();
        let _ = join.await;
    }
    for join in unwinding {
        let _ = join.await;
    }

    super::drain_undelivered(&inner, &mut rx);
}
