//! # Unordered-concurrent (parallel) dispatch loop.
//!
//! Every request is launched as an independent task with no ordering or
//! mutual-exclusion guarantee. State writers race through the store's CAS
//! loop; awaiting all completion handles guarantees all submitted mutations
//! were applied, in *some* interleaving.
//!
//! ## Direct sub-mode
//! With `direct = true` the execution future is polled once inline before
//! being spawned, so execution begins synchronously up to its first
//! suspension point. Intents that never suspend complete without a single
//! scheduler hop.
//!
//! ## Rules
//! - No rollback on cancellation: concurrent writers may already have built
//!   on top of the captured snapshot.
//! - A bounded queue that fills up suspends producers rather than dropping.

use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinSet;
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
    direct: bool,
) where
    S: StoreState,
    I: StoreIntent,
    A: StoreAction,
{
    let mut set: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            Some(_done) = set.join_next(), if !set.is_empty() => {}
            req = rx.recv() => {
                let Some(req) = req else { break };
                let exec = token.child_token();
                let fut = execute_intent(Arc::clone(&inner), req, exec, false);
                if direct {
                    let mut fut = Box::pin(fut);
                    // Begin synchronously; park in the join set only if the
                    // body actually suspended.
                    if (&mut fut).now_or_never().is_none() {
                        set.spawn(fut);
                    }
                } else {
                    set.spawn(fut);
                }
            }
        }
    }

    // In-flight executions observe their child tokens; wait for all of them
    // to reach a terminal outcome before draining.
    while set.join_next().await.is_some() {}

    super::drain_undelivered(&inner, &mut rx);
}
