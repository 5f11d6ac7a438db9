//! # Sequential (FIFO) dispatch loop.
//!
//! A single consumer reads requests one at a time and executes each to
//! completion before reading the next. New intents never preempt in-flight
//! ones; backpressure is exerted through the queue itself.
//!
//! ## Guarantees
//! - Intents execute in exact submission order.
//! - The final state equals the left-fold of all submitted intents.
//! - On closure, in-flight work finishes its cancellation path and remaining
//!   queued requests are drained through the undelivered-element handling
//!   (one guarded re-delivery attempt, then reported dropped).

use std::sync::Arc;

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
    loop {
        let req = tokio::select! {
            _ = token.cancelled() => break,
            req = rx.recv() => match req {
                Some(req) => req,
                None => break,
            },
        };
        let exec = token.child_token();
        execute_intent(Arc::clone(&inner), req, exec, true).await;
    }

    super::drain_undelivered(&inner, &mut rx);
}
