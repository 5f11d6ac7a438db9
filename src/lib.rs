//! # statevisor
//!
//! **Statevisor** is a lightweight intent-driven state container for Rust.
//!
//! It provides primitives to serialize or schedule state-mutation requests
//! ("intents") under a pluggable admission strategy, run keyed restartable
//! background tasks ("side-jobs"), and broadcast a lifecycle event stream to
//! observers. The crate is designed as the reactive core beneath
//! higher-level MVI/MVVM application architectures.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     caller ── try_send / send ──► IntentQueue (unbounded / bounded / conflated)
//!                                        │
//!                                        ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Store (composition root)                                         │
//! │  - StateCell (CAS-swapped current value, watch-observed)          │
//! │  - dispatch loop per AdmissionStrategy                            │
//! │  - JobSupervisor (keyed side-jobs, restart-on-conflict)           │
//! │  - Bus (broadcast events) + SubscriberSet (interceptor fan-out)   │
//! │  - ActionChannel (side-effect egress)                             │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   Fifo / Lifo      ChannelLifo{ordered}   Parallel{direct}
//!        │                  │                  │
//!        └──────────────────┴──────────────────┘
//!                           │
//!                           ▼
//!                    execute_intent
//!              (snapshot → filter → reducer →
//!               rollback-on-cancel → handle resolution)
//!                           │
//!      publishes: IntentAccepted / StateChanged / IntentHandled /
//!                 IntentCancelled / IntentError / SideJob* / ...
//!                           ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                      Bus (broadcast channel)                      │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       interceptor listener (in Store)
//!                                   ▼
//!                             SubscriberSet
//!                          ┌─────────┼─────────┐
//!                          ▼         ▼         ▼
//!                       worker1   worker2   workerN
//!                          ▼         ▼         ▼
//!                      sub1.on_  sub2.on_  subN.on_
//!                       event()   event()   event()
//! ```
//!
//! ### Lifecycle
//! ```text
//! StoreBuilder ──► Store (Idle) ──► start() / first use ──► Started
//!
//! per intent:
//!   ├─► IntentQueued
//!   ├─► admission per strategy (order, supersession, or parallel)
//!   ├─► filter? ── reject ──► IntentRejected, handle ← Rejected
//!   ├─► snapshot state, run reducer ⟂ invocation token
//!   │       ├─ Ok        ──► IntentHandled, handle ← Ok
//!   │       ├─ cancelled ──► rollback (per strategy) ──► IntentCancelled
//!   │       └─ failed    ──► IntentError (+ close if close_on_exceptions)
//!   └─► side-jobs flow through their own queue into the JobSupervisor
//!
//! close():
//!   ├─► root token cancelled → in-flight intents + side-jobs unwind
//!   ├─► queue drained through undelivered handling
//!   ├─► final Closed event, interceptors shut down
//!   └─► every further ingress fails fast with SendError::Closed
//! ```
//!
//! ## Features
//! | Area               | Description                                                            | Key types / traits                        |
//! |--------------------|------------------------------------------------------------------------|-------------------------------------------|
//! | **Admission**      | Choose order/concurrency of intent execution.                          | [`AdmissionStrategy`]                      |
//! | **State**          | CAS-swapped value with replay-latest observation.                      | [`StoreState`], [`StateStream`]            |
//! | **Handlers**       | Define intent bodies as trait impls or closures.                       | [`Reduce`], [`ReduceFn`], [`IntentContext`]|
//! | **Side-jobs**      | Keyed, restartable background tasks.                                   | [`JobContext`], [`RestartState`]           |
//! | **Side-effects**   | One-shot effects with receive/consume/share delivery.                  | [`ActionStrategy`], [`ActionReceiver`]     |
//! | **Observability**  | Broadcast lifecycle events to interceptors.                            | [`Event`], [`EventKind`], [`Subscribe`]    |
//! | **Errors**         | Typed outcomes for ingress and execution.                              | [`SendError`], [`IntentError`]             |
//! | **Configuration**  | Centralize store settings.                                             | [`StoreConfig`]                            |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use statevisor::{IntentContext, ReduceFn, Store, StoreBuilder};
//!
//! #[derive(Clone, Copy, Debug)]
//! enum Msg {
//!     Add(i64),
//!     Reset,
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let store: Store<i64, Msg> = StoreBuilder::new(
//!         0,
//!         ReduceFn::new(|ctx: IntentContext<i64, Msg, ()>, msg: Msg| async move {
//!             match msg {
//!                 Msg::Add(n) => ctx.update_state(|s| s + n)?,
//!                 Msg::Reset => ctx.update_state(|_| 0)?,
//!             };
//!             Ok(())
//!         }),
//!     )
//!     .build();
//!
//!     let done = store.try_send(Msg::Add(2)).unwrap();
//!     done.wait().await.unwrap();
//!     assert_eq!(*store.state(), 2);
//!
//!     store.close().await;
//! }
//! ```

mod actions;
mod core;
mod error;
mod events;
mod guardian;
mod intents;
mod jobs;
mod queue;
mod strategies;
mod subscribers;

// ---- Public re-exports ----

pub use actions::{ActionReceiver, ActionStream, ActionStrategy, StoreAction};
pub use core::{
    IntentContext, StateStream, Store, StoreBuilder, StoreConfig, StorePhase, StoreState,
};
pub use error::{ActionError, ContractViolation, IntentError, SendError};
pub use events::{Bus, Event, EventKind};
pub use intents::{IntentHandle, Reduce, ReduceFn, StoreIntent};
pub use jobs::{JobContext, RestartState};
pub use queue::{OverflowPolicy, QueueCapacity};
pub use strategies::AdmissionStrategy;
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logging interceptor (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
