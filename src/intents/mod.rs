//! Intents: requests, completion handles, and handler abstraction.
//!
//! ## Contents
//! - [`StoreIntent`] marker for intent payload types
//! - [`IntentHandle`] awaitable completion handle returned by ingress
//! - [`Reduce`], [`ReduceFn`] the intent handler seam
//!
//! The internal [`IntentRequest`](request::IntentRequest) pairs a payload
//! with its handle while it travels through the dispatch queue.

mod handle;
mod reduce;
pub(crate) mod request;

pub use handle::IntentHandle;
pub use reduce::{Reduce, ReduceFn};

pub(crate) use request::IntentRequest;

/// Marker for intent payload types.
///
/// Blanket-implemented for every `Send + 'static` type; exists to keep the
/// store's bounds readable at the seams.
pub trait StoreIntent: Send + 'static {}

impl<T: Send + 'static> StoreIntent for T {}
