//! # Side-job supervisor - keyed registry of restartable background tasks.
//!
//! The supervisor consumes [`JobRequest`]s from the store's side-job queue
//! and maintains the registry of running jobs:
//! - a new request under a busy key **cancels** the running job and marks the
//!   new one `Restarted`;
//! - finished entries are swept opportunistically on every schedule;
//! - store shutdown cancels every registered job and clears the registry.
//!
//! ## Architecture
//! ```text
//! IntentContext::side_job() ──► jobs queue ──► JobSupervisor::run()
//!                                                  │
//!                                                  ├─► sweep finished entries
//!                                                  ├─► cancel previous job under key
//!                                                  │     └─► publish SideJobCancelled
//!                                                  ├─► publish SideJobStarted{restart}
//!                                                  └─► spawn body(JobContext)
//!                                                        └─► Completed / Cancelled / Error
//! ```
//!
//! ## Rules
//! - The supersession `SideJobCancelled` is published **before** the
//!   replacement's `SideJobStarted`.
//! - One job's failure never tears down the supervisor; it is reported
//!   through the store's failure path instead.
//! - Jobs run in tasks scoped to the store's lifetime via child tokens.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::IntentError;
use crate::events::{Bus, Event, EventKind};

use super::job::{JobBody, JobContext, JobRequest, RestartState};

/// Callback invoked when a side-job body fails (wired to the store's error
/// handling, including `close_on_exceptions`).
pub(crate) type OnJobFailure = Arc<dyn Fn(IntentError) + Send + Sync>;

/// Handle to a running side-job.
struct JobEntry {
    /// Individual cancellation token for this job.
    token: CancellationToken,
    /// Join handle for the job's task.
    join: JoinHandle<()>,
    /// Restart state the job was started with.
    restart: RestartState,
    /// Set when the job was cancelled by a canceller that already published
    /// its `SideJobCancelled` event.
    superseded: Arc<AtomicBool>,
}

/// Keyed registry of currently running side-jobs.
pub(crate) struct JobSupervisor {
    name: Arc<str>,
    bus: Bus,
    jobs: RwLock<HashMap<Arc<str>, JobEntry>>,
    on_failure: OnJobFailure,
}

impl JobSupervisor {
    pub(crate) fn new(name: Arc<str>, bus: Bus, on_failure: OnJobFailure) -> Arc<Self> {
        Arc::new(Self {
            name,
            bus,
            jobs: RwLock::new(HashMap::new()),
            on_failure,
        })
    }

    /// Consumes side-job requests until the token is cancelled or the queue
    /// closes, then cancels everything left in the registry.
    pub(crate) async fn run(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<JobRequest>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                req = rx.recv() => match req {
                    Some(req) => self.schedule(req).await,
                    None => break,
                }
            }
        }
        self.cancel_all().await;
    }

    /// Starts `req` under its key, cancelling and replacing any running job.
    pub(crate) async fn schedule(self: &Arc<Self>, req: JobRequest) {
        let mut jobs = self.jobs.write().await;
        jobs.retain(|_, entry| !entry.join.is_finished());

        let restart = match jobs.remove(&req.key) {
            Some(prev) => {
                prev.superseded.store(true, Ordering::Release);
                prev.token.cancel();
                self.publish(EventKind::SideJobCancelled, &req.key);
                RestartState::Restarted
            }
            None => RestartState::Initial,
        };

        let token = req.scope.child_token();
        let superseded = Arc::new(AtomicBool::new(false));

        self.bus.publish(
            Event::now(EventKind::SideJobStarted)
                .with_store(Arc::clone(&self.name))
                .with_key(Arc::clone(&req.key))
                .with_restart(restart),
        );

        let join = tokio::spawn(run_job(
            Arc::clone(self),
            Arc::clone(&req.key),
            req.body,
            JobContext {
                restart,
                token: token.clone(),
            },
            token.clone(),
            Arc::clone(&superseded),
        ));

        jobs.insert(
            req.key,
            JobEntry {
                token,
                join,
                restart,
                superseded,
            },
        );
    }

    /// Returns the sorted `(key, restart state)` pairs of registered jobs.
    ///
    /// Entries for jobs that already finished may linger until the next
    /// sweep.
    pub(crate) async fn list(&self) -> Vec<(String, RestartState)> {
        let jobs = self.jobs.read().await;
        let mut entries: Vec<(String, RestartState)> = jobs
            .iter()
            .map(|(key, entry)| (key.to_string(), entry.restart))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// True if no job is registered.
    pub(crate) async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Cancels all registered jobs: cancel → publish → join. Idempotent.
    pub(crate) async fn cancel_all(&self) {
        let entries: Vec<(Arc<str>, JobEntry)> = {
            let mut jobs = self.jobs.write().await;
            jobs.drain().collect()
        };

        for (key, entry) in &entries {
            entry.superseded.store(true, Ordering::Release);
            entry.token.cancel();
            if !entry.join.is_finished() {
                self.publish(EventKind::SideJobCancelled, key);
            }
        }

        for (_, entry) in entries {
            let _ = entry.join.await;
        }
    }

    fn publish(&self, kind: EventKind, key: &Arc<str>) {
        self.bus.publish(
            Event::now(kind)
                .with_store(Arc::clone(&self.name))
                .with_key(Arc::clone(key)),
        );
    }
}

/// Runs one side-job body to completion with failure isolation.
async fn run_job(
    sup: Arc<JobSupervisor>,
    key: Arc<str>,
    body: JobBody,
    ctx: JobContext,
    token: CancellationToken,
    superseded: Arc<AtomicBool>,
) {
    let fut = body(ctx);
    let res = tokio::select! {
        res = fut => res,
        _ = token.cancelled() => Err(IntentError::Canceled),
    };

    match res {
        Ok(()) => {
            if !superseded.load(Ordering::Acquire) {
                sup.publish(EventKind::SideJobCompleted, &key);
            }
        }
        Err(IntentError::Canceled) => {
            // The canceller already published when it superseded us.
            if !superseded.load(Ordering::Acquire) {
                sup.publish(EventKind::SideJobCancelled, &key);
            }
        }
        Err(err) => {
            sup.bus.publish(
                Event::now(EventKind::SideJobError)
                    .with_store(Arc::clone(&sup.name))
                    .with_key(Arc::clone(&key))
                    .with_reason(err.as_message()),
            );
            (sup.on_failure)(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn supervisor(bus: &Bus) -> Arc<JobSupervisor> {
        JobSupervisor::new("test-store".into(), bus.clone(), Arc::new(|_err| {}))
    }

    fn collect(kinds: &Mutex<Vec<(EventKind, Option<String>)>>) -> Vec<EventKind> {
        kinds.lock().unwrap().iter().map(|(k, _)| *k).collect()
    }

    fn drain_events(
        rx: &mut tokio::sync::broadcast::Receiver<Event>,
        out: &Mutex<Vec<(EventKind, Option<String>)>>,
    ) {
        while let Ok(ev) = rx.try_recv() {
            out.lock()
                .unwrap()
                .push((ev.kind, ev.key.as_deref().map(str::to_owned)));
        }
    }

    #[tokio::test]
    async fn test_restart_states_and_event_order() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let sup = supervisor(&bus);
        let root = CancellationToken::new();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let started = Arc::new(Notify::new());

        for _ in 0..2 {
            let seen = Arc::clone(&seen);
            let started_job = Arc::clone(&started);
            sup.schedule(JobRequest::new("k", root.clone(), move |ctx: JobContext| {
                async move {
                    seen.lock().unwrap().push(ctx.restart);
                    started_job.notify_one();
                    // Run until cancelled.
                    ctx.token.cancelled().await;
                    Err(IntentError::Canceled)
                }
            }))
            .await;
            started.notified().await;
        }

        assert_eq!(
            *seen.lock().unwrap(),
            vec![RestartState::Initial, RestartState::Restarted]
        );

        let events = Mutex::new(Vec::new());
        drain_events(&mut rx, &events);
        let kinds = collect(&events);
        // First start, then the supersession cancellation *before* the
        // replacement's start.
        assert_eq!(
            kinds,
            vec![
                EventKind::SideJobStarted,
                EventKind::SideJobCancelled,
                EventKind::SideJobStarted,
            ]
        );

        sup.cancel_all().await;
    }

    #[tokio::test]
    async fn test_completed_job_publishes_and_is_swept() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let sup = supervisor(&bus);
        let root = CancellationToken::new();

        sup.schedule(JobRequest::new("once", root.clone(), |_ctx| async { Ok(()) }))
            .await;

        // Wait for the completion event.
        loop {
            let ev = rx.recv().await.unwrap();
            if ev.kind == EventKind::SideJobCompleted {
                assert_eq!(ev.key.as_deref(), Some("once"));
                break;
            }
        }

        // A later schedule under another key sweeps the finished entry.
        sup.schedule(JobRequest::new("other", root.clone(), |ctx: JobContext| {
            async move {
                ctx.token.cancelled().await;
                Err(IntentError::Canceled)
            }
        }))
        .await;
        assert_eq!(
            sup.list().await,
            vec![("other".to_string(), RestartState::Initial)]
        );

        sup.cancel_all().await;
        assert!(sup.is_empty().await);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_and_reported() {
        let bus = Bus::new(64);
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&failures);
        let sup = JobSupervisor::new(
            "test-store".into(),
            bus.clone(),
            Arc::new(move |err| sink.lock().unwrap().push(err.as_label())),
        );
        let mut rx = bus.subscribe();
        let root = CancellationToken::new();

        sup.schedule(JobRequest::new("bad", root.clone(), |_ctx| async {
            Err(IntentError::fail("boom"))
        }))
        .await;

        loop {
            let ev = rx.recv().await.unwrap();
            if ev.kind == EventKind::SideJobError {
                assert!(ev.reason.as_deref().unwrap().contains("boom"));
                break;
            }
        }
        assert_eq!(*failures.lock().unwrap(), vec!["intent_failed"]);

        // The supervisor still schedules new jobs afterwards.
        sup.schedule(JobRequest::new("good", root.clone(), |_ctx| async { Ok(()) }))
            .await;
        loop {
            let ev = rx.recv().await.unwrap();
            if ev.kind == EventKind::SideJobCompleted {
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_cancel_all_stops_running_jobs() {
        let bus = Bus::new(64);
        let sup = supervisor(&bus);
        let root = CancellationToken::new();
        let mut rx = bus.subscribe();

        let started = Arc::new(Notify::new());
        let flag = Arc::clone(&started);
        sup.schedule(JobRequest::new("long", root.clone(), move |ctx: JobContext| {
            async move {
                flag.notify_one();
                ctx.token.cancelled().await;
                Err(IntentError::Canceled)
            }
        }))
        .await;
        started.notified().await;

        sup.cancel_all().await;
        assert!(sup.is_empty().await);

        let mut cancelled = false;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::SideJobCancelled {
                cancelled = true;
            }
        }
        assert!(cancelled);
        // No stray events after teardown.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancelling_issuing_scope_cancels_job() {
        let bus = Bus::new(64);
        let sup = supervisor(&bus);
        let scope = CancellationToken::new();
        let mut rx = bus.subscribe();

        let started = Arc::new(Notify::new());
        let flag = Arc::clone(&started);
        sup.schedule(JobRequest::new("scoped", scope.clone(), move |ctx: JobContext| {
            async move {
                flag.notify_one();
                ctx.token.cancelled().await;
                Err(IntentError::Canceled)
            }
        }))
        .await;
        started.notified().await;

        scope.cancel();
        loop {
            let ev = rx.recv().await.unwrap();
            if ev.kind == EventKind::SideJobCancelled {
                assert_eq!(ev.key.as_deref(), Some("scoped"));
                break;
            }
        }
    }
}
