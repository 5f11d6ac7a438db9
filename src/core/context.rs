//! # IntentContext: the capability handed to an intent body.
//!
//! One context exists per invocation. It scopes everything a handler may do:
//! read/update state through the CAS loop, emit side-effects, post keyed
//! side-jobs, and observe its own cancellation. Every operation passes
//! through the invocation's guardian, so usage-discipline violations surface
//! right at the offending call when `debug_checks` is on.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::actions::StoreAction;
use crate::core::StoreState;
use crate::core::store::StoreInner;
use crate::error::IntentError;
use crate::events::EventKind;
use crate::guardian::Guardian;
use crate::intents::StoreIntent;
use crate::jobs::{JobContext, JobRequest};

/// Per-invocation access to the store, handed to [`Reduce::reduce`].
///
/// Cheap to clone; clones share the same invocation guardian and token.
///
/// [`Reduce::reduce`]: crate::Reduce::reduce
pub struct IntentContext<S, I, A>
where
    S: StoreState,
    I: StoreIntent,
    A: StoreAction,
{
    inner: Arc<StoreInner<S, I, A>>,
    guardian: Arc<Guardian>,
    token: CancellationToken,
}

impl<S, I, A> Clone for IntentContext<S, I, A>
where
    S: StoreState,
    I: StoreIntent,
    A: StoreAction,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            guardian: Arc::clone(&self.guardian),
            token: self.token.clone(),
        }
    }
}

impl<S, I, A> IntentContext<S, I, A>
where
    S: StoreState,
    I: StoreIntent,
    A: StoreAction,
{
    pub(crate) fn new(
        inner: Arc<StoreInner<S, I, A>>,
        guardian: Arc<Guardian>,
        token: CancellationToken,
    ) -> Self {
        Self {
            inner,
            guardian,
            token,
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> Result<Arc<S>, IntentError> {
        self.guardian.check_state_access()?;
        Ok(self.inner.state.get())
    }

    /// Computes a new state from the current one, retrying the CAS until it
    /// commits. Emits `StateChanged` only when the committed value actually
    /// differs.
    ///
    /// Returns the committed state.
    pub fn update_state<F: FnMut(&S) -> S>(&self, f: F) -> Result<Arc<S>, IntentError> {
        self.guardian.check_state_update()?;
        let (_prev, next, changed) = self.inner.state.update(f);
        if changed {
            self.inner.publish(self.inner.event(EventKind::StateChanged));
        }
        Ok(next)
    }

    /// Emits a side-effect. Suspends when the configured channel is full.
    pub async fn action(&self, action: A) -> Result<(), IntentError> {
        self.guardian.check_not_closed()?;
        self.inner
            .publish(self.inner.event(EventKind::SideEffectQueued));
        self.inner.actions.send(action).await?;
        self.inner
            .publish(self.inner.event(EventKind::SideEffectEmitted));
        Ok(())
    }

    /// Posts a side-job under `key`, cancelling any job already running
    /// under that key.
    ///
    /// The job is scoped to this intent: cancelling the intent cancels the
    /// job too. Must be the last statement of the intent body.
    pub fn side_job<F, Fut>(&self, key: impl Into<Arc<str>>, f: F) -> Result<(), IntentError>
    where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), IntentError>> + Send + 'static,
    {
        self.guardian.check_side_job()?;
        self.inner
            .enqueue_job(JobRequest::new(key, self.token.clone(), f))
    }

    /// Like [`IntentContext::side_job`], but detached from the issuing
    /// intent: the job is scoped to the store itself and survives this
    /// intent's cancellation.
    pub fn side_job_detached<F, Fut>(
        &self,
        key: impl Into<Arc<str>>,
        f: F,
    ) -> Result<(), IntentError>
    where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), IntentError>> + Send + 'static,
    {
        self.guardian.check_side_job()?;
        self.inner
            .enqueue_job(JobRequest::new(key, self.inner.root.clone(), f))
    }

    /// This invocation's cancellation token. Observe it at suspension points
    /// in long-running bodies.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.token
    }

    /// Name of the owning store.
    pub fn store_name(&self) -> &str {
        &self.inner.name
    }
}
