//! Admission: the policy layer deciding when a queued intent executes.
//!
//! ## Contents
//! - [`AdmissionStrategy`] the policy value stored in configuration
//! - one dispatch-loop module per built-in policy
//!   ([`fifo`], [`lifo`], [`channel_lifo`], [`parallel`])
//! - [`executor`] the shared per-intent execution wrapper
//!
//! ## Quick wiring
//! ```text
//! StoreConfig { strategy: AdmissionStrategy, .. }
//!      └─► Store::start() spawns dispatch(inner, queue receiver, token)
//!           └─► the strategy's loop pulls requests and calls
//!               executor::execute_intent for each admitted one
//! ```

mod channel_lifo;
mod fifo;
mod lifo;
mod parallel;
mod strategy;

pub(crate) mod executor;

pub use strategy::AdmissionStrategy;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::actions::StoreAction;
use crate::core::store::StoreInner;
use crate::core::StoreState;
use crate::intents::{IntentRequest, StoreIntent};
use crate::queue::IntentReceiver;

/// Runs the dispatch loop selected by the store's configuration. Owns the
/// queue receiver for the store's whole lifetime.
pub(crate) async fn dispatch<S, I, A>(
    inner: Arc<StoreInner<S, I, A>>,
    rx: IntentReceiver<IntentRequest<I>>,
    token: CancellationToken,
) where
    S: StoreState,
    I: StoreIntent,
    A: StoreAction,
{
    match inner.cfg.strategy {
        AdmissionStrategy::Fifo => fifo::run(inner, rx, token).await,
        AdmissionStrategy::Lifo => lifo::run(inner, rx, token).await,
        AdmissionStrategy::ChannelLifo { ordered } => {
            channel_lifo::run(inner, rx, token, ordered).await
        }
        AdmissionStrategy::Parallel { direct } => parallel::run(inner, rx, token, direct).await,
    }
}

/// Closes the queue and routes everything left through the store's
/// undelivered-element handling. Shared tail of every dispatch loop.
pub(crate) fn drain_undelivered<S, I, A>(
    inner: &Arc<StoreInner<S, I, A>>,
    rx: &mut IntentReceiver<IntentRequest<I>>,
) where
    S: StoreState,
    I: StoreIntent,
    A: StoreAction,
{
    rx.close();
    for req in rx.drain() {
        inner.fail_undelivered(req);
    }
}
