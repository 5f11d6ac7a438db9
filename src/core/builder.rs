//! Builder wiring all store components together.

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::actions::{ActionChannel, StoreAction};
use crate::core::config::StoreConfig;
use crate::core::state::{StateCell, StoreState};
use crate::core::store::{next_store_name, Store, StoreInner};
use crate::error::IntentError;
use crate::events::Bus;
use crate::intents::{Reduce, StoreIntent};
use crate::jobs::JobSupervisor;
use crate::queue;
use crate::strategies::AdmissionStrategy;
use crate::subscribers::Subscribe;

/// Builder for constructing a [`Store`] with optional collaborators.
///
/// ## Example
/// ```
/// use statevisor::{IntentContext, ReduceFn, Store, StoreBuilder};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store: Store<i64, i64> = StoreBuilder::new(
///     0,
///     ReduceFn::new(|ctx: IntentContext<i64, i64, ()>, n: i64| async move {
///         ctx.update_state(|s| s + n)?;
///         Ok(())
///     }),
/// )
/// .build();
///
/// store.try_send(2).unwrap().wait().await.unwrap();
/// assert_eq!(*store.state(), 2);
/// store.close().await;
/// # }
/// ```
pub struct StoreBuilder<S, I, A = ()>
where
    S: StoreState,
    I: StoreIntent,
    A: StoreAction,
{
    initial: S,
    cfg: StoreConfig,
    reducer: Arc<dyn Reduce<S, I, A>>,
    filter: Option<crate::core::store::IntentFilter<S, I>>,
    on_error: Option<crate::core::store::ErrorHook>,
    on_undelivered: Option<crate::core::store::UndeliveredHook<I>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl<S, I, A> StoreBuilder<S, I, A>
where
    S: StoreState,
    I: StoreIntent,
    A: StoreAction,
{
    /// Creates a builder from the initial state and the intent handler.
    pub fn new(initial: S, reducer: impl Reduce<S, I, A>) -> Self {
        Self {
            initial,
            cfg: StoreConfig::default(),
            reducer: Arc::new(reducer),
            filter: None,
            on_error: None,
            on_undelivered: None,
            subscribers: Vec::new(),
        }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, cfg: StoreConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets the intent filter, evaluated against the current state before
    /// admission. Rejected intents resolve with
    /// [`IntentError::Rejected`](crate::IntentError::Rejected).
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&S, &I) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Sets the global error handler for intent and side-job failures.
    ///
    /// Without one, failures surface as `UnhandledError` events.
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&IntentError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Sets the hook invoked with intents that could not be delivered
    /// (after the single re-delivery attempt failed).
    pub fn on_undelivered<F>(mut self, hook: F) -> Self
    where
        F: Fn(I) + Send + Sync + 'static,
    {
        self.on_undelivered = Some(Arc::new(hook));
        self
    }

    /// Adds one event interceptor.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Sets the event interceptors, replacing any added so far.
    ///
    /// Interceptors receive every event from store start until the terminal
    /// `Closed` sentinel through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the store, wiring all runtime components.
    ///
    /// A non-lazy store starts immediately, so the builder must run within a
    /// tokio runtime in that case (a lazy store defers the requirement to
    /// first use).
    pub fn build(self) -> Store<S, I, A> {
        let name: Arc<str> = match &self.cfg.name {
            Some(name) => name.as_str().into(),
            None => next_store_name().into(),
        };

        let bus = Bus::new(self.cfg.bus_capacity_clamped());

        // The queue-backed superseding strategy always conflates; everything
        // else follows the configured capacity/overflow pair.
        let (intents_tx, intents_rx) = match self.cfg.strategy {
            AdmissionStrategy::ChannelLifo { .. } => queue::conflated(),
            _ => queue::channel(self.cfg.capacity, self.cfg.overflow),
        };

        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let actions = ActionChannel::new(
            self.cfg.action_strategy,
            self.cfg.action_capacity_clamped(),
        );
        let root = CancellationToken::new();
        let lazy = self.cfg.lazy;

        let inner = Arc::new_cyclic(|weak: &Weak<StoreInner<S, I, A>>| {
            let failure_hook = {
                let weak = weak.clone();
                Arc::new(move |err: IntentError| {
                    if let Some(inner) = weak.upgrade() {
                        inner.report_failure(&err);
                    }
                })
            };
            let jobs = JobSupervisor::new(Arc::clone(&name), bus.clone(), failure_hook);

            StoreInner::new(
                name,
                self.cfg,
                StateCell::new(self.initial),
                bus,
                self.reducer,
                self.filter,
                self.on_error,
                self.on_undelivered,
                intents_tx,
                intents_rx,
                jobs,
                jobs_tx,
                jobs_rx,
                actions,
                self.subscribers,
                root,
            )
        });

        let store = Store::from_inner(inner);
        if !lazy {
            store.start();
        }
        store
    }
}
