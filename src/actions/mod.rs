//! Side-effects ("actions"): delivery strategies and egress types.
//!
//! ## Contents
//! - [`StoreAction`] marker for side-effect payload types
//! - [`ActionStrategy`] delivery policy (receive / consume / share / disable)
//! - [`ActionReceiver`], [`ActionStream`] consumer-side handles
//!
//! Intent bodies emit actions through
//! [`IntentContext::action`](crate::IntentContext::action); consumers attach
//! via [`Store::actions`](crate::Store::actions) or
//! [`Store::action_stream`](crate::Store::action_stream) depending on the
//! configured strategy.

mod channel;

pub use channel::{ActionReceiver, ActionStream, ActionStrategy};

pub(crate) use channel::ActionChannel;

/// Marker for side-effect payload types.
///
/// Blanket-implemented for every `Clone + Send + 'static` type.
pub trait StoreAction: Clone + Send + 'static {}

impl<T: Clone + Send + 'static> StoreAction for T {}
