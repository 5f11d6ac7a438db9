//! # Event interceptors for the store.
//!
//! This module provides the [`Subscribe`] trait and the fan-out machinery for
//! handling events broadcast through the [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   executor ── publish(Event) ──► Bus ──► interceptor listener (in Store)
//!                                              │
//!                                              ▼
//!                                        SubscriberSet
//!                                    ┌────┴────┬─────────┐
//!                                    ▼         ▼         ▼
//!                                LogWriter  Metrics   Custom ...
//! ```
//!
//! Interceptors attach once at store start and observe every event until the
//! terminal `Closed` sentinel, after which their workers drain and stop.
//!
//! ## Implementing custom interceptors
//! ```no_run
//! use statevisor::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct MetricsSubscriber;
//!
//! #[async_trait]
//! impl Subscribe for MetricsSubscriber {
//!     async fn on_event(&self, event: &Event) {
//!         match event.kind {
//!             EventKind::IntentError => {
//!                 // increment failure counter
//!             }
//!             _ => {}
//!         }
//!     }
//! }
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
