//! Store events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to lifecycle and processing events emitted by the store,
//! the dispatch loop, intent executors, and the side-job supervisor.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Store` (lifecycle, ingress), the admission dispatch
//!   loops, `execute_intent`, and the `JobSupervisor`.
//! - **Consumers**: the store's interceptor listener (fans out to
//!   `SubscriberSet`), and direct `Store::events()` subscribers.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
