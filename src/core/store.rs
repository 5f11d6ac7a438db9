//! # Store: the composition root.
//!
//! The [`Store`] owns the state cell, the dispatch queue, the side-job queue
//! and supervisor, the event bus, the side-effect channel, and the root
//! cancellation token for all of the above.
//!
//! ## Lifecycle
//! ```text
//! Idle ──► Started ──► Closed (terminal)
//!
//! Idle → Started:
//!   - explicit start(), or the first send/state observation when lazy
//!   - CAS-guarded: only the first caller spawns the runtime tasks
//!   - spawns: interceptor listener, dispatch loop, side-job supervisor
//!   - publishes Started
//!
//! * → Closed:
//!   - close(), or an unhandled failure with close_on_exceptions
//!   - cancels the root token → every in-flight intent and side-job
//!   - dispatch loop drains the queue through undelivered handling
//!   - publishes the final Closed event, then shuts the interceptors down
//!   - all further ingress fails fast with SendError::Closed
//! ```
//!
//! ## Ingress pair
//! [`Store::try_send`] is the fire-and-forget variant (fails fast with
//! `Full` on a saturated suspending queue); [`Store::send`] suspends until
//! queue space is available. Both return an [`IntentHandle`] resolved with
//! the intent's terminal outcome.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{Notify, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::actions::{ActionChannel, ActionReceiver, ActionStream, StoreAction};
use crate::core::config::StoreConfig;
use crate::core::state::{StateCell, StateStream, StoreState};
use crate::error::{ActionError, IntentError, SendError};
use crate::events::{Bus, Event, EventKind};
use crate::intents::{IntentHandle, IntentRequest, Reduce, StoreIntent};
use crate::jobs::{JobRequest, JobSupervisor, RestartState};
use crate::queue::{IntentReceiver, IntentSender, QueueSendError};
use crate::strategies;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Process-wide counter for default store names.
///
/// Lives for the whole process and is never reset; it only feeds the
/// `"store-N"` fallback in [`StoreBuilder`](crate::StoreBuilder) when no
/// explicit name is configured.
static STORE_COUNTER: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_store_name() -> String {
    format!("store-{}", STORE_COUNTER.fetch_add(1, Ordering::Relaxed))
}

const PHASE_IDLE: u8 = 0;
const PHASE_STARTED: u8 = 1;
const PHASE_CLOSED: u8 = 2;

/// Lifecycle phase of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorePhase {
    /// Built, not yet running.
    Idle,
    /// Runtime tasks spawned; accepting intents.
    Started,
    /// Terminal: every ingress fails fast.
    Closed,
}

pub(crate) type IntentFilter<S, I> = Arc<dyn Fn(&S, &I) -> bool + Send + Sync>;
pub(crate) type ErrorHook = Arc<dyn Fn(&IntentError) + Send + Sync>;
pub(crate) type UndeliveredHook<I> = Arc<dyn Fn(I) + Send + Sync>;

/// Shared internals: everything the dispatch loops, executors, context, and
/// supervisor reach through.
pub(crate) struct StoreInner<S, I, A>
where
    S: StoreState,
    I: StoreIntent,
    A: StoreAction,
{
    pub(crate) name: Arc<str>,
    pub(crate) cfg: StoreConfig,
    phase: AtomicU8,

    pub(crate) state: StateCell<S>,
    pub(crate) bus: Bus,
    pub(crate) reducer: Arc<dyn Reduce<S, I, A>>,
    pub(crate) filter: Option<IntentFilter<S, I>>,
    on_error: Option<ErrorHook>,
    on_undelivered: Option<UndeliveredHook<I>>,

    intents: IntentSender<IntentRequest<I>>,
    intents_rx: Mutex<Option<IntentReceiver<IntentRequest<I>>>>,

    pub(crate) jobs: Arc<JobSupervisor>,
    jobs_tx: Mutex<Option<mpsc::UnboundedSender<JobRequest>>>,
    jobs_rx: Mutex<Option<mpsc::UnboundedReceiver<JobRequest>>>,

    pub(crate) actions: ActionChannel<A>,
    subscribers: Mutex<Vec<Arc<dyn Subscribe>>>,

    pub(crate) root: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    listener: Mutex<Option<JoinHandle<()>>>,

    closed_done: AtomicBool,
    closed_notify: Notify,
}

impl<S, I, A> StoreInner<S, I, A>
where
    S: StoreState,
    I: StoreIntent,
    A: StoreAction,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: Arc<str>,
        cfg: StoreConfig,
        state: StateCell<S>,
        bus: Bus,
        reducer: Arc<dyn Reduce<S, I, A>>,
        filter: Option<IntentFilter<S, I>>,
        on_error: Option<ErrorHook>,
        on_undelivered: Option<UndeliveredHook<I>>,
        intents: IntentSender<IntentRequest<I>>,
        intents_rx: IntentReceiver<IntentRequest<I>>,
        jobs: Arc<JobSupervisor>,
        jobs_tx: mpsc::UnboundedSender<JobRequest>,
        jobs_rx: mpsc::UnboundedReceiver<JobRequest>,
        actions: ActionChannel<A>,
        subscribers: Vec<Arc<dyn Subscribe>>,
        root: CancellationToken,
    ) -> Self {
        Self {
            name,
            cfg,
            phase: AtomicU8::new(PHASE_IDLE),
            state,
            bus,
            reducer,
            filter,
            on_error,
            on_undelivered,
            intents,
            intents_rx: Mutex::new(Some(intents_rx)),
            jobs,
            jobs_tx: Mutex::new(Some(jobs_tx)),
            jobs_rx: Mutex::new(Some(jobs_rx)),
            actions,
            subscribers: Mutex::new(subscribers),
            root,
            tasks: Mutex::new(Vec::new()),
            listener: Mutex::new(None),
            closed_done: AtomicBool::new(false),
            closed_notify: Notify::new(),
        }
    }

    pub(crate) fn phase(&self) -> StorePhase {
        match self.phase.load(Ordering::Acquire) {
            PHASE_IDLE => StorePhase::Idle,
            PHASE_STARTED => StorePhase::Started,
            _ => StorePhase::Closed,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.phase.load(Ordering::Acquire) == PHASE_CLOSED
    }

    /// Builds an event stamped with this store's name.
    pub(crate) fn event(&self, kind: EventKind) -> Event {
        Event::now(kind).with_store(Arc::clone(&self.name))
    }

    pub(crate) fn publish(&self, ev: Event) {
        self.bus.publish(ev);
    }

    /// Performs the `Idle → Started` transition; only the CAS winner spawns
    /// the runtime tasks and publishes `Started`.
    pub(crate) fn start(self: &Arc<Self>) -> bool {
        if self
            .phase
            .compare_exchange(
                PHASE_IDLE,
                PHASE_STARTED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        // Interceptors attach before Started so they observe it.
        let subs = std::mem::take(&mut *self.subscribers.lock().unwrap());
        if !subs.is_empty() {
            let set = SubscriberSet::new(subs);
            let rx = self.bus.subscribe();
            *self.listener.lock().unwrap() = Some(tokio::spawn(subscriber_listener(rx, set)));
        }

        if let Some(rx) = self.intents_rx.lock().unwrap().take() {
            let h = tokio::spawn(strategies::dispatch(
                Arc::clone(self),
                rx,
                self.root.clone(),
            ));
            self.tasks.lock().unwrap().push(h);
        }

        if let Some(jobs_rx) = self.jobs_rx.lock().unwrap().take() {
            let h = tokio::spawn(Arc::clone(&self.jobs).run(jobs_rx, self.root.clone()));
            self.tasks.lock().unwrap().push(h);
        }

        tracing::debug!(
            store = &*self.name,
            strategy = self.cfg.strategy.as_label(),
            "store started"
        );
        self.publish(self.event(EventKind::Started));
        true
    }

    /// Starts the store on first use.
    pub(crate) fn ensure_started(self: &Arc<Self>) {
        if self.phase.load(Ordering::Acquire) == PHASE_IDLE {
            self.start();
        }
    }

    /// Flips the phase to `Closed` and cancels the root token. Returns
    /// whether this caller won and must run the teardown.
    pub(crate) fn begin_close(&self) -> bool {
        let prev = self.phase.swap(PHASE_CLOSED, Ordering::AcqRel);
        if prev == PHASE_CLOSED {
            return false;
        }
        self.root.cancel();
        true
    }

    /// Tears the store down after [`StoreInner::begin_close`] won:
    /// joins the runtime tasks, drains undelivered requests, cancels
    /// side-jobs, emits the final `Closed` event, and releases waiters.
    pub(crate) async fn teardown(self: &Arc<Self>) {
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().unwrap().drain(..).collect();
        for h in handles {
            let _ = h.await;
        }

        // The store never started: the dispatch loop did not exist to drain
        // the queue, so do it here.
        let leftover = self.intents_rx.lock().unwrap().take();
        if let Some(mut rx) = leftover {
            rx.close();
            for req in rx.drain() {
                self.fail_undelivered(req);
            }
        }

        self.jobs_tx.lock().unwrap().take();
        self.jobs.cancel_all().await;
        self.actions.close();

        self.publish(self.event(EventKind::Closed));
        tracing::debug!(store = &*self.name, "store closed");

        let listener = self.listener.lock().unwrap().take();
        if let Some(h) = listener {
            let _ = h.await;
        }

        self.closed_done.store(true, Ordering::Release);
        self.closed_notify.notify_waiters();
    }

    /// Waits until the winning closer finished the teardown.
    pub(crate) async fn wait_closed(&self) {
        loop {
            let notified = self.closed_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.closed_done.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    /// Initiates close without waiting (failure path and supervisors).
    pub(crate) fn spawn_close(self: &Arc<Self>) {
        if self.begin_close() {
            let me = Arc::clone(self);
            tokio::spawn(async move {
                me.teardown().await;
            });
        }
    }

    /// Routes a handler failure: error hook if present, `UnhandledError`
    /// event otherwise, then optionally closes the whole store.
    pub(crate) fn report_failure(self: &Arc<Self>, err: &IntentError) {
        match &self.on_error {
            Some(hook) => hook(err),
            None => {
                self.publish(
                    self.event(EventKind::UnhandledError)
                        .with_reason(err.as_message()),
                );
            }
        }
        if self.cfg.close_on_exceptions {
            self.spawn_close();
        }
    }

    /// Undelivered-element handling: one guarded re-delivery attempt while
    /// the store is still open, then report the request dropped.
    pub(crate) fn fail_undelivered(&self, mut req: IntentRequest<I>) {
        if req.handle.is_resolved() {
            return;
        }
        if !self.is_closed() && !req.redelivered {
            req.redelivered = true;
            match self.intents.try_send(req) {
                Ok(None) => return,
                Ok(Some(displaced)) => {
                    self.handle_displaced(displaced);
                    return;
                }
                Err(e) => req = e.into_item(),
            }
        }

        let err = if self.is_closed() {
            IntentError::Closed
        } else {
            IntentError::Dropped {
                reason: "undeliverable".into(),
            }
        };
        self.publish(
            self.event(EventKind::IntentDropped)
                .with_reason(err.as_message()),
        );
        req.handle.resolve(Err(err));
        if let Some(hook) = &self.on_undelivered {
            hook(req.intent);
        }
    }

    /// Resolves a request displaced from a drop-oldest queue: supersession
    /// under a LIFO strategy, plain overflow otherwise.
    pub(crate) fn handle_displaced(&self, req: IntentRequest<I>) {
        if self.cfg.strategy.is_superseding() {
            self.publish(self.event(EventKind::IntentCancelled));
            req.handle.resolve(Err(IntentError::Canceled));
        } else {
            self.publish(
                self.event(EventKind::IntentDropped)
                    .with_reason("displaced by overflow"),
            );
            req.handle.resolve(Err(IntentError::Dropped {
                reason: "displaced by overflow".into(),
            }));
            if let Some(hook) = &self.on_undelivered {
                hook(req.intent);
            }
        }
    }

    /// Queues a side-job request for the supervisor.
    pub(crate) fn enqueue_job(&self, req: JobRequest) -> Result<(), IntentError> {
        let tx = self.jobs_tx.lock().unwrap().clone();
        match tx {
            Some(tx) => {
                self.publish(
                    self.event(EventKind::SideJobQueued)
                        .with_key(Arc::clone(&req.key)),
                );
                tx.send(req).map_err(|_| IntentError::Closed)
            }
            None => Err(IntentError::Closed),
        }
    }
}

/// Forwards bus events to the interceptor set until the `Closed` sentinel.
async fn subscriber_listener(mut rx: broadcast::Receiver<Event>, set: SubscriberSet) {
    loop {
        match rx.recv().await {
            Ok(ev) => {
                let terminal = ev.is_terminal();
                set.emit(&ev);
                if terminal {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "interceptor listener lagged; events skipped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    set.shutdown().await;
}

/// Single-writer, event-driven state container.
///
/// Composes the state cell, dispatch queue, admission strategy, side-job
/// supervisor, event bus, and side-effect channel behind one handle. Build
/// one with [`StoreBuilder`](crate::StoreBuilder).
///
/// Cloning is cheap and shares the same store.
pub struct Store<S, I, A = ()>
where
    S: StoreState,
    I: StoreIntent,
    A: StoreAction,
{
    inner: Arc<StoreInner<S, I, A>>,
}

impl<S, I, A> Clone for Store<S, I, A>
where
    S: StoreState,
    I: StoreIntent,
    A: StoreAction,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, I, A> Store<S, I, A>
where
    S: StoreState,
    I: StoreIntent,
    A: StoreAction,
{
    pub(crate) fn from_inner(inner: Arc<StoreInner<S, I, A>>) -> Self {
        Self { inner }
    }

    /// The store's name (configured or auto-generated).
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> StorePhase {
        self.inner.phase()
    }

    /// True once the store reached its terminal phase.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Eagerly performs the `Idle → Started` transition.
    ///
    /// Idempotent: returns `true` only for the caller that actually started
    /// the store. Must be called within a tokio runtime.
    pub fn start(&self) -> bool {
        self.inner.start()
    }

    /// Fire-and-forget ingress.
    ///
    /// Fails fast with [`SendError::Closed`] on a closed store and
    /// [`SendError::Full`] on a saturated suspending queue. Starts a lazy
    /// store on first use.
    pub fn try_send(&self, intent: I) -> Result<IntentHandle, SendError> {
        self.inner.ensure_started();
        if self.inner.is_closed() {
            return Err(SendError::Closed);
        }

        let (req, handle) = IntentRequest::new(intent);
        self.inner.publish(self.inner.event(EventKind::IntentQueued));
        match self.inner.intents.try_send(req) {
            Ok(None) => Ok(handle),
            Ok(Some(displaced)) => {
                self.inner.handle_displaced(displaced);
                Ok(handle)
            }
            Err(QueueSendError::Full(req)) => {
                self.inner.publish(
                    self.inner
                        .event(EventKind::IntentDropped)
                        .with_reason("queue full"),
                );
                req.handle.resolve(Err(IntentError::Dropped {
                    reason: "queue full".into(),
                }));
                Err(SendError::Full)
            }
            Err(QueueSendError::Closed(req)) => {
                req.handle.resolve(Err(IntentError::Closed));
                Err(SendError::Closed)
            }
        }
    }

    /// Suspending ingress: waits for queue space instead of failing fast.
    pub async fn send(&self, intent: I) -> Result<IntentHandle, SendError> {
        self.inner.ensure_started();
        if self.inner.is_closed() {
            return Err(SendError::Closed);
        }

        let (req, handle) = IntentRequest::new(intent);
        self.inner.publish(self.inner.event(EventKind::IntentQueued));
        match self.inner.intents.send(req).await {
            Ok(None) => Ok(handle),
            Ok(Some(displaced)) => {
                self.inner.handle_displaced(displaced);
                Ok(handle)
            }
            Err(req) => {
                req.handle.resolve(Err(IntentError::Closed));
                Err(SendError::Closed)
            }
        }
    }

    /// Snapshot of the current state. Starts a lazy store on first use.
    pub fn state(&self) -> Arc<S> {
        self.inner.ensure_started();
        self.inner.state.get()
    }

    /// Observable state stream: replays the latest value, then yields on
    /// actual change, and terminates once the store closes.
    pub fn states(&self) -> StateStream<S> {
        self.inner.ensure_started();
        StateStream::new(self.inner.state.subscribe(), self.inner.root.clone())
    }

    /// Takes the side-effect mailbox receiver (`Receive`/`Consume`
    /// strategies).
    pub fn actions(&self) -> Result<ActionReceiver<A>, ActionError> {
        self.inner.ensure_started();
        self.inner.actions.take_receiver()
    }

    /// Subscribes to the shared side-effect stream (`Share` strategy).
    pub fn action_stream(&self) -> Result<ActionStream<A>, ActionError> {
        self.inner.ensure_started();
        self.inner.actions.subscribe()
    }

    /// Raw event bus subscription. Interceptors registered at build time are
    /// usually the better tool; this is the escape hatch for tests and
    /// tooling.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.inner.bus.subscribe()
    }

    /// Sorted `(key, restart state)` pairs of currently registered
    /// side-jobs.
    pub async fn side_jobs(&self) -> Vec<(String, RestartState)> {
        self.inner.jobs.list().await
    }

    /// Closes the store: cancels every in-flight intent and side-job, drains
    /// the queue through undelivered handling, emits the final `Closed`
    /// event, and tears the event pipeline down.
    ///
    /// Idempotent; every caller returns after the teardown finished.
    pub async fn close(&self) {
        if self.inner.begin_close() {
            self.inner.teardown().await;
        } else {
            self.inner.wait_closed().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionStrategy;
    use crate::core::builder::StoreBuilder;
    use crate::core::context::IntentContext;
    use crate::intents::ReduceFn;
    use crate::queue::{OverflowPolicy, QueueCapacity};
    use crate::strategies::AdmissionStrategy;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    type Ctx<S, I, A = ()> = IntentContext<S, I, A>;

    fn config(strategy: AdmissionStrategy) -> StoreConfig {
        StoreConfig {
            strategy,
            ..StoreConfig::default()
        }
    }

    async fn wait_for_event(
        rx: &mut broadcast::Receiver<Event>,
        kind: EventKind,
    ) -> Event {
        loop {
            let ev = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for event")
                .expect("bus closed before the event arrived");
            if ev.kind == kind {
                return ev;
            }
        }
    }

    #[tokio::test]
    async fn test_fifo_applies_intents_as_a_left_fold() {
        let observed = Arc::new(StdMutex::new(vec![0i64]));
        let sink = Arc::clone(&observed);
        let store: Store<i64, i64> = StoreBuilder::new(
            0i64,
            ReduceFn::new(move |ctx: Ctx<i64, i64>, n: i64| {
                let sink = Arc::clone(&sink);
                async move {
                    let next = ctx.update_state(|s| s + n)?;
                    sink.lock().unwrap().push(*next);
                    Ok(())
                }
            }),
        )
        .build();

        let handles: Vec<_> = [1, 2, 3]
            .into_iter()
            .map(|n| store.try_send(n).unwrap())
            .collect();
        for h in &handles {
            h.wait().await.unwrap();
        }

        assert_eq!(*store.state(), 6);
        assert_eq!(*observed.lock().unwrap(), vec![0, 1, 3, 6]);
        store.close().await;
    }

    #[derive(Clone, Copy, Debug)]
    enum SetCmd {
        Slow(&'static str),
        Fast(&'static str),
    }

    fn set_store(
        strategy: AdmissionStrategy,
        started: Arc<Notify>,
    ) -> Store<String, SetCmd> {
        StoreBuilder::new(
            "a".to_string(),
            ReduceFn::new(move |ctx: Ctx<String, SetCmd>, cmd: SetCmd| {
                let started = Arc::clone(&started);
                async move {
                    match cmd {
                        SetCmd::Slow(v) => {
                            ctx.update_state(|_| v.to_string())?;
                            started.notify_one();
                            std::future::pending::<()>().await;
                            Ok(())
                        }
                        SetCmd::Fast(v) => {
                            ctx.update_state(|_| v.to_string())?;
                            Ok(())
                        }
                    }
                }
            }),
        )
        .with_config(config(strategy))
        .build()
    }

    #[tokio::test]
    async fn test_superseding_last_intent_wins_and_cancels_the_slow_one() {
        let started = Arc::new(Notify::new());
        let store = set_store(
            AdmissionStrategy::ChannelLifo { ordered: true },
            Arc::clone(&started),
        );

        let slow = store.try_send(SetCmd::Slow("b")).unwrap();
        started.notified().await; // "b" is mid-execution

        let fast = store.try_send(SetCmd::Fast("c")).unwrap();
        fast.wait().await.unwrap();

        assert_eq!(&**store.state(), "c");
        // Never resolved with success.
        assert!(matches!(slow.wait().await, Err(IntentError::Canceled)));
        store.close().await;
    }

    #[tokio::test]
    async fn test_rollback_restores_the_pre_execution_snapshot() {
        let started = Arc::new(Notify::new());
        let gate = Arc::clone(&started);
        let store: Store<i64, i64> = StoreBuilder::new(
            0i64,
            ReduceFn::new(move |ctx: Ctx<i64, i64>, n: i64| {
                let gate = Arc::clone(&gate);
                async move {
                    ctx.update_state(|s| s + n)?;
                    if n == 10 {
                        // Stall mid-execution so a newer intent supersedes us.
                        gate.notify_one();
                        std::future::pending::<()>().await;
                    }
                    Ok(())
                }
            }),
        )
        .with_config(config(AdmissionStrategy::ChannelLifo { ordered: true }))
        .build();

        let stalled = store.try_send(10).unwrap();
        started.notified().await;
        assert_eq!(*store.state(), 10); // effect applied, not yet rolled back

        let winner = store.try_send(1).unwrap();
        winner.wait().await.unwrap();

        // The cancelled intent was rolled back before the winner started.
        assert_eq!(*store.state(), 1);
        assert!(matches!(stalled.wait().await, Err(IntentError::Canceled)));

        // Re-running the identical intent fresh behaves as if the cancelled
        // run never happened.
        store.try_send(10).unwrap().wait().await.unwrap();
        assert_eq!(*store.state(), 11);
        store.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_applies_every_mutation() {
        let store: Store<i64, i64> = StoreBuilder::new(
            0i64,
            ReduceFn::new(|ctx: Ctx<i64, i64>, n: i64| async move {
                tokio::task::yield_now().await;
                ctx.update_state(|s| s + n)?;
                Ok(())
            }),
        )
        .with_config(config(AdmissionStrategy::Parallel { direct: false }))
        .build();

        let handles: Vec<_> = (1..=50).map(|n| store.try_send(n).unwrap()).collect();
        for h in &handles {
            h.wait().await.unwrap();
        }

        assert_eq!(*store.state(), (1..=50).sum::<i64>());
        store.close().await;
    }

    #[tokio::test]
    async fn test_parallel_direct_completes_synchronous_bodies_inline() {
        let store: Store<i64, i64> = StoreBuilder::new(
            0i64,
            ReduceFn::new(|ctx: Ctx<i64, i64>, n: i64| async move {
                ctx.update_state(|s| s + n)?;
                Ok(())
            }),
        )
        .with_config(config(AdmissionStrategy::Parallel { direct: true }))
        .build();

        let handles: Vec<_> = (1..=10).map(|n| store.try_send(n).unwrap()).collect();
        for h in &handles {
            h.wait().await.unwrap();
        }
        assert_eq!(*store.state(), 55);
        store.close().await;
    }

    #[tokio::test]
    async fn test_pre_cancelled_intent_is_skipped_entirely() {
        let gate = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());
        let (g, s) = (Arc::clone(&gate), Arc::clone(&started));
        let store: Store<Vec<i64>, i64> = StoreBuilder::new(
            Vec::new(),
            ReduceFn::new(move |ctx: Ctx<Vec<i64>, i64>, n: i64| {
                let (gate, started) = (Arc::clone(&g), Arc::clone(&s));
                async move {
                    ctx.update_state(|v| {
                        let mut v = v.clone();
                        v.push(n);
                        v
                    })?;
                    if n == 1 {
                        started.notify_one();
                        gate.notified().await;
                    }
                    Ok(())
                }
            }),
        )
        .build();

        let first = store.try_send(1).unwrap();
        started.notified().await;

        let second = store.try_send(2).unwrap();
        second.cancel(); // resolved before it ever ran
        let third = store.try_send(3).unwrap();

        gate.notify_one();
        first.wait().await.unwrap();
        third.wait().await.unwrap();

        assert_eq!(*store.state(), vec![1, 3]);
        assert!(matches!(second.wait().await, Err(IntentError::Canceled)));
        store.close().await;
    }

    #[tokio::test]
    async fn test_side_job_restart_discipline() {
        let restarts = Arc::new(StdMutex::new(Vec::new()));
        let started = Arc::new(Notify::new());
        let (sink, flag) = (Arc::clone(&restarts), Arc::clone(&started));
        let store: Store<i64, &'static str> = StoreBuilder::new(
            0i64,
            ReduceFn::new(move |ctx: Ctx<i64, &'static str>, key: &'static str| {
                let (sink, flag) = (Arc::clone(&sink), Arc::clone(&flag));
                async move {
                    ctx.side_job_detached(key, move |job| async move {
                        sink.lock().unwrap().push(job.restart);
                        flag.notify_one();
                        job.token.cancelled().await;
                        Err(IntentError::Canceled)
                    })?;
                    Ok(())
                }
            }),
        )
        .build();

        let mut events = store.events();

        store.try_send("k").unwrap().wait().await.unwrap();
        started.notified().await;
        store.try_send("k").unwrap().wait().await.unwrap();
        started.notified().await;

        assert_eq!(
            *restarts.lock().unwrap(),
            vec![
                crate::jobs::RestartState::Initial,
                crate::jobs::RestartState::Restarted
            ]
        );
        assert_eq!(
            store.side_jobs().await,
            vec![("k".to_string(), crate::jobs::RestartState::Restarted)]
        );

        // The supersession cancellation precedes the replacement's start.
        let first_start = wait_for_event(&mut events, EventKind::SideJobStarted).await;
        let cancelled = wait_for_event(&mut events, EventKind::SideJobCancelled).await;
        let second_start = wait_for_event(&mut events, EventKind::SideJobStarted).await;
        assert!(first_start.seq < cancelled.seq);
        assert!(cancelled.seq < second_start.seq);
        assert_eq!(second_start.restart, Some(crate::jobs::RestartState::Restarted));

        store.close().await;
    }

    #[tokio::test]
    async fn test_closed_store_is_terminal() {
        let store: Store<i64, i64> = StoreBuilder::new(
            0i64,
            ReduceFn::new(|ctx: Ctx<i64, i64>, n: i64| async move {
                ctx.update_state(|s| s + n)?;
                Ok(())
            }),
        )
        .build();

        let mut events = store.events();
        store.try_send(5).unwrap().wait().await.unwrap();
        store.close().await;

        assert!(store.is_closed());
        assert!(matches!(store.try_send(1), Err(SendError::Closed)));
        assert!(matches!(store.send(1).await, Err(SendError::Closed)));

        // State observers see the last committed value, then terminate.
        let mut states = store.states();
        assert_eq!(*states.next().await.unwrap(), 5);
        assert!(states.next().await.is_none());

        // Closed is the final event on the bus.
        wait_for_event(&mut events, EventKind::Closed).await;
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));

        // close() is idempotent.
        store.close().await;
    }

    #[tokio::test]
    async fn test_lazy_store_starts_on_first_send() {
        let store: Store<i64, i64> = StoreBuilder::new(
            0i64,
            ReduceFn::new(|ctx: Ctx<i64, i64>, n: i64| async move {
                ctx.update_state(|s| s + n)?;
                Ok(())
            }),
        )
        .build();

        assert_eq!(store.phase(), StorePhase::Idle);
        let mut events = store.events();

        store.try_send(1).unwrap().wait().await.unwrap();
        assert_eq!(store.phase(), StorePhase::Started);

        let started = wait_for_event(&mut events, EventKind::Started).await;
        let queued = wait_for_event(&mut events, EventKind::IntentQueued).await;
        assert!(started.seq < queued.seq);

        store.close().await;
    }

    #[tokio::test]
    async fn test_eager_store_starts_at_build() {
        let cfg = StoreConfig {
            lazy: false,
            ..StoreConfig::default()
        };
        let store: Store<i64, i64> = StoreBuilder::new(
            0i64,
            ReduceFn::new(|ctx: Ctx<i64, i64>, n: i64| async move {
                ctx.update_state(|s| s + n)?;
                Ok(())
            }),
        )
        .with_config(cfg)
        .build();

        assert_eq!(store.phase(), StorePhase::Started);
        store.close().await;
    }

    #[tokio::test]
    async fn test_filter_rejects_before_admission() {
        let store: Store<i64, i64> = StoreBuilder::new(
            0i64,
            ReduceFn::new(|ctx: Ctx<i64, i64>, n: i64| async move {
                ctx.update_state(|s| s + n)?;
                Ok(())
            }),
        )
        .with_filter(|_state, intent| *intent >= 0)
        .build();

        let rejected = store.try_send(-3).unwrap();
        assert!(matches!(rejected.wait().await, Err(IntentError::Rejected)));

        store.try_send(4).unwrap().wait().await.unwrap();
        assert_eq!(*store.state(), 4);
        store.close().await;
    }

    #[tokio::test]
    async fn test_handler_failure_is_isolated_by_default() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let store: Store<i64, i64> = StoreBuilder::new(
            0i64,
            ReduceFn::new(|ctx: Ctx<i64, i64>, n: i64| async move {
                if n < 0 {
                    return Err(IntentError::fail("negative"));
                }
                ctx.update_state(|s| s + n)?;
                Ok(())
            }),
        )
        .with_error_handler(move |err| sink.lock().unwrap().push(err.as_label()))
        .build();

        let failed = store.try_send(-1).unwrap();
        assert!(matches!(failed.wait().await, Err(IntentError::Fail { .. })));

        // The store keeps processing subsequent intents.
        store.try_send(2).unwrap().wait().await.unwrap();
        assert_eq!(*store.state(), 2);
        assert_eq!(*seen.lock().unwrap(), vec!["intent_failed"]);
        store.close().await;
    }

    #[tokio::test]
    async fn test_close_on_exceptions_makes_failures_fatal() {
        let cfg = StoreConfig {
            close_on_exceptions: true,
            ..StoreConfig::default()
        };
        let store: Store<i64, i64> = StoreBuilder::new(
            0i64,
            ReduceFn::new(|_ctx: Ctx<i64, i64>, _n: i64| async move {
                Err(IntentError::fail("boom"))
            }),
        )
        .with_config(cfg)
        .build();

        let mut events = store.events();
        let failed = store.try_send(1).unwrap();
        assert!(matches!(failed.wait().await, Err(IntentError::Fail { .. })));

        wait_for_event(&mut events, EventKind::Closed).await;
        assert!(store.is_closed());
        assert!(matches!(store.try_send(2), Err(SendError::Closed)));
    }

    #[tokio::test]
    async fn test_unhandled_failures_surface_as_events() {
        let store: Store<i64, i64> = StoreBuilder::new(
            0i64,
            ReduceFn::new(|_ctx: Ctx<i64, i64>, _n: i64| async move {
                Err(IntentError::fail("boom"))
            }),
        )
        .build();

        let mut events = store.events();
        store.try_send(1).unwrap();
        let ev = wait_for_event(&mut events, EventKind::UnhandledError).await;
        assert!(ev.reason.as_deref().unwrap().contains("boom"));
        store.close().await;
    }

    #[tokio::test]
    async fn test_guardian_flags_double_state_access_under_parallel() {
        let cfg = StoreConfig {
            strategy: AdmissionStrategy::Parallel { direct: false },
            debug_checks: true,
            ..StoreConfig::default()
        };
        let store: Store<i64, i64> = StoreBuilder::new(
            0i64,
            ReduceFn::new(|ctx: Ctx<i64, i64>, n: i64| async move {
                ctx.update_state(|s| s + n)?;
                ctx.update_state(|s| s + n)?; // second touch: contract violation
                Ok(())
            }),
        )
        .with_config(cfg)
        .build();

        let handle = store.try_send(1).unwrap();
        assert!(matches!(
            handle.wait().await,
            Err(IntentError::Contract { .. })
        ));
        store.close().await;
    }

    #[tokio::test]
    async fn test_drop_oldest_overflow_reports_displaced_intents() {
        let gate = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());
        let dropped = Arc::new(StdMutex::new(Vec::new()));
        let (g, s) = (Arc::clone(&gate), Arc::clone(&started));
        let hook_sink = Arc::clone(&dropped);

        let cfg = StoreConfig {
            capacity: QueueCapacity::Bounded(1),
            overflow: OverflowPolicy::DropOldest,
            ..StoreConfig::default()
        };
        let store: Store<i64, i64> = StoreBuilder::new(
            0i64,
            ReduceFn::new(move |ctx: Ctx<i64, i64>, n: i64| {
                let (gate, started) = (Arc::clone(&g), Arc::clone(&s));
                async move {
                    ctx.update_state(|v| v + n)?;
                    if n == 1 {
                        started.notify_one();
                        gate.notified().await;
                    }
                    Ok(())
                }
            }),
        )
        .with_config(cfg)
        .on_undelivered(move |intent| hook_sink.lock().unwrap().push(intent))
        .build();

        let first = store.try_send(1).unwrap();
        started.notified().await; // consumer is busy; queue is empty

        let second = store.try_send(2).unwrap(); // fills the single slot
        let third = store.try_send(4).unwrap(); // displaces `2`

        assert!(matches!(
            second.wait().await,
            Err(IntentError::Dropped { .. })
        ));
        assert_eq!(*dropped.lock().unwrap(), vec![2]);

        gate.notify_one();
        first.wait().await.unwrap();
        third.wait().await.unwrap();
        assert_eq!(*store.state(), 5);
        store.close().await;
    }

    #[tokio::test]
    async fn test_bounded_suspend_send_waits_for_space() {
        let gate = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());
        let (g, s) = (Arc::clone(&gate), Arc::clone(&started));

        let cfg = StoreConfig {
            capacity: QueueCapacity::Bounded(1),
            overflow: OverflowPolicy::Suspend,
            ..StoreConfig::default()
        };
        let store: Store<i64, i64> = StoreBuilder::new(
            0i64,
            ReduceFn::new(move |ctx: Ctx<i64, i64>, n: i64| {
                let (gate, started) = (Arc::clone(&g), Arc::clone(&s));
                async move {
                    ctx.update_state(|v| v + n)?;
                    if n == 1 {
                        started.notify_one();
                        gate.notified().await;
                    }
                    Ok(())
                }
            }),
        )
        .with_config(cfg)
        .build();

        let first = store.try_send(1).unwrap();
        started.notified().await;
        let _second = store.try_send(2).unwrap(); // occupies the slot
        assert!(matches!(store.try_send(4), Err(SendError::Full)));

        // The suspending variant parks until the consumer frees the slot.
        let sender = store.clone();
        let suspended = tokio::spawn(async move { sender.send(8).await });
        tokio::task::yield_now().await;
        assert!(!suspended.is_finished());

        gate.notify_one();
        first.wait().await.unwrap();
        let handle = suspended.await.unwrap().unwrap();
        handle.wait().await.unwrap();

        assert_eq!(*store.state(), 11);
        store.close().await;
    }

    #[derive(Clone, Debug, PartialEq)]
    enum Toast {
        Show(&'static str),
    }

    #[tokio::test]
    async fn test_side_effects_reach_the_mailbox_receiver() {
        let store: Store<i64, i64, Toast> = StoreBuilder::new(
            0i64,
            ReduceFn::new(|ctx: Ctx<i64, i64, Toast>, n: i64| async move {
                ctx.update_state(|s| s + n)?;
                ctx.action(Toast::Show("saved")).await?;
                Ok(())
            }),
        )
        .build();

        let mut events = store.events();
        let mut actions = store.actions().unwrap();

        store.try_send(1).unwrap().wait().await.unwrap();
        assert_eq!(actions.recv().await, Some(Toast::Show("saved")));

        wait_for_event(&mut events, EventKind::SideEffectQueued).await;
        wait_for_event(&mut events, EventKind::SideEffectEmitted).await;

        store.close().await;
        assert_eq!(actions.recv().await, None);
    }

    #[tokio::test]
    async fn test_shared_side_effects_replay_to_late_subscribers() {
        let cfg = StoreConfig {
            action_strategy: ActionStrategy::Share { replay: 1 },
            ..StoreConfig::default()
        };
        let store: Store<i64, i64, Toast> = StoreBuilder::new(
            0i64,
            ReduceFn::new(|ctx: Ctx<i64, i64, Toast>, n: i64| async move {
                ctx.update_state(|s| s + n)?;
                ctx.action(Toast::Show("ping")).await?;
                Ok(())
            }),
        )
        .with_config(cfg)
        .build();

        store.try_send(1).unwrap().wait().await.unwrap();

        let mut late = store.action_stream().unwrap();
        assert_eq!(late.recv().await, Some(Toast::Show("ping")));
        store.close().await;
    }

    #[tokio::test]
    async fn test_states_stream_observes_sequential_changes() {
        let store: Store<i64, i64> = StoreBuilder::new(
            0i64,
            ReduceFn::new(|ctx: Ctx<i64, i64>, n: i64| async move {
                ctx.update_state(|s| s + n)?;
                Ok(())
            }),
        )
        .build();

        let mut states = store.states();
        assert_eq!(*states.next().await.unwrap(), 0); // replay of the latest

        store.try_send(7).unwrap().wait().await.unwrap();
        assert_eq!(*states.next().await.unwrap(), 7);

        store.close().await;
        assert!(states.next().await.is_none());
    }

    #[tokio::test]
    async fn test_auto_generated_names_are_unique() {
        let reducer = || {
            ReduceFn::new(|ctx: Ctx<i64, i64>, n: i64| async move {
                ctx.update_state(|s| s + n)?;
                Ok(())
            })
        };
        let a: Store<i64, i64> = StoreBuilder::new(0i64, reducer()).build();
        let b: Store<i64, i64> = StoreBuilder::new(0i64, reducer()).build();
        assert_ne!(a.name(), b.name());
        assert!(a.name().starts_with("store-"));

        let named: Store<i64, i64> = StoreBuilder::new(0i64, reducer())
            .with_config(StoreConfig {
                name: Some("checkout".into()),
                ..StoreConfig::default()
            })
            .build();
        assert_eq!(named.name(), "checkout");

        a.close().await;
        b.close().await;
        named.close().await;
    }
}
