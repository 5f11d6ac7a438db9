//! # Intent handler abstraction and function-backed implementation.
//!
//! This module defines the [`Reduce`] trait (async, cancelable) and a
//! convenient function-backed implementation [`ReduceFn`].
//!
//! A handler receives an [`IntentContext`] giving it scoped access to the
//! state cell, the side-effect channel, and the side-job supervisor, plus the
//! intent payload itself. Cancellation is cooperative: the executor races the
//! handler's future against the invocation token, so the handler is abandoned
//! at its next suspension point when superseded or during shutdown.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::actions::StoreAction;
use crate::core::IntentContext;
use crate::core::StoreState;
use crate::error::IntentError;
use crate::intents::StoreIntent;

/// # Asynchronous intent handler.
///
/// Invoked once per admitted intent with a fresh [`IntentContext`]. The
/// handler reads and updates state, emits side-effects, and posts side-jobs
/// through the context; returning `Err` fails the intent's completion handle.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use statevisor::{IntentContext, IntentError, Reduce};
///
/// struct Counter;
///
/// #[async_trait]
/// impl Reduce<i64, i64, ()> for Counter {
///     async fn reduce(
///         &self,
///         ctx: IntentContext<i64, i64, ()>,
///         intent: i64,
///     ) -> Result<(), IntentError> {
///         ctx.update_state(|n| n + intent)?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Reduce<S, I, A>: Send + Sync + 'static
where
    S: StoreState,
    I: StoreIntent,
    A: StoreAction,
{
    /// Executes one intent against the store.
    async fn reduce(&self, ctx: IntentContext<S, I, A>, intent: I) -> Result<(), IntentError>;
}

/// Function-backed handler implementation.
///
/// Wraps a closure that *creates* a new future per invocation, so there is no
/// shared mutable state between invocations; share state explicitly with
/// `Arc<...>` inside the closure when needed.
#[derive(Debug)]
pub struct ReduceFn<F> {
    f: F,
}

impl<F> ReduceFn<F> {
    /// Creates a new function-backed handler.
    ///
    /// Prefer [`ReduceFn::arc`] when you immediately need a shared handle.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the handler and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<S, I, A, F, Fut> Reduce<S, I, A> for ReduceFn<F>
where
    S: StoreState,
    I: StoreIntent,
    A: StoreAction,
    F: Fn(IntentContext<S, I, A>, I) -> Fut + Send + Sync + 'static, // Fn, not FnMut
    Fut: Future<Output = Result<(), IntentError>> + Send + 'static,
{
    async fn reduce(&self, ctx: IntentContext<S, I, A>, intent: I) -> Result<(), IntentError> {
        (self.f)(ctx, intent).await
    }
}
