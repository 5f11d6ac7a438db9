//! Side-jobs: keyed, restartable background tasks tied to the store's
//! lifetime.
//!
//! ## Contents
//! - [`RestartState`] whether an invocation replaced a running predecessor
//! - [`JobContext`] restart flag + cancellation token handed to job bodies
//! - `JobSupervisor` (internal) the keyed registry with restart-on-conflict
//!
//! Side-jobs are posted from intent bodies via
//! [`IntentContext::side_job`](crate::IntentContext::side_job); starting a
//! job under a key that is already running cancels the incumbent first.

mod job;
mod supervisor;

pub use job::{JobContext, RestartState};

pub(crate) use job::JobRequest;
pub(crate) use supervisor::{JobSupervisor, OnJobFailure};
