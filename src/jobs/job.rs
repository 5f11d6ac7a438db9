//! Side-job building blocks: restart state, execution context, request.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::IntentError;

/// Whether a side-job invocation is the first under its key or replaced a
/// running predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartState {
    /// No job was running under this key when the job started.
    Initial,
    /// A running job under the same key was cancelled to make room.
    Restarted,
}

impl RestartState {
    /// True when the job replaced a running predecessor.
    pub fn is_restart(&self) -> bool {
        matches!(self, RestartState::Restarted)
    }
}

/// Execution context handed to a side-job body.
///
/// The token is a child of the issuing scope: cancelling the issuing intent
/// (or the store) cancels the job, unless the job was detached to the store
/// root. Bodies should observe the token at their suspension points.
pub struct JobContext {
    /// Restart state of this invocation.
    pub restart: RestartState,
    /// Cancellation token scoped to this job.
    pub token: CancellationToken,
}

/// Boxed side-job body, producing a fresh future per invocation.
pub(crate) type JobBody = Box<dyn FnOnce(JobContext) -> BoxFuture<'static, Result<(), IntentError>> + Send>;

/// A queued request to (re)start a side-job under a key.
pub(crate) struct JobRequest {
    /// Restart key: at most one job runs per key at a time.
    pub key: Arc<str>,
    /// Task body.
    pub body: JobBody,
    /// Owning scope; the job's token is derived from it.
    pub scope: CancellationToken,
}

impl JobRequest {
    pub(crate) fn new<F, Fut>(key: impl Into<Arc<str>>, scope: CancellationToken, f: F) -> Self
    where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), IntentError>> + Send + 'static,
    {
        Self {
            key: key.into(),
            body: Box::new(move |ctx| Box::pin(f(ctx))),
            scope,
        }
    }
}
