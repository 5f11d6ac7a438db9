//! # Store configuration.
//!
//! Provides [`StoreConfig`], the centralized settings consumed by
//! [`StoreBuilder`](crate::StoreBuilder).
//!
//! ## Sentinel values
//! - `name = None` → an auto-generated `"store-N"` name (process-wide
//!   counter)
//! - `bus_capacity` and `action_capacity` are clamped to a minimum of 1 by
//!   their consumers

use crate::actions::ActionStrategy;
use crate::queue::{OverflowPolicy, QueueCapacity};
use crate::strategies::AdmissionStrategy;

/// Global configuration for one store.
///
/// Defines:
/// - **Lifecycle**: lazy start, failure fatality
/// - **Admission**: which strategy drives the dispatch loop
/// - **Queueing**: dispatch queue capacity and overflow policy
/// - **Egress**: side-effect strategy and buffer size, event bus capacity
/// - **Diagnostics**: debug guardian checks
///
/// ## Field semantics
/// - `lazy`: defer the `Idle → Started` transition to the first
///   `send`/state observation (`true`) or start at build time (`false`)
/// - `close_on_exceptions`: treat any handler failure as fatal to the whole
///   store (`true`) or isolate it to the failing intent (`false`)
/// - `debug_checks`: enable the per-invocation guardian; diagnostics only
/// - `strategy`: admission policy (see [`AdmissionStrategy`])
/// - `capacity`/`overflow`: dispatch queue shape; ignored for
///   `ChannelLifo`, which always uses the conflating single-slot queue
/// - `action_strategy`/`action_capacity`: side-effect delivery
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped)
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Store name used in events and logs. `None` auto-generates
    /// `"store-N"`.
    pub name: Option<String>,

    /// Defer the `Idle → Started` transition until first use.
    pub lazy: bool,

    /// Close the whole store on an unhandled intent/side-job failure.
    ///
    /// Contract violations are exempt: they always stay with the offending
    /// invocation.
    pub close_on_exceptions: bool,

    /// Enable the debug guardian (usage-discipline checks).
    ///
    /// Defaults to `cfg!(debug_assertions)`: checks run in debug builds and
    /// vanish in release builds without changing runtime behavior.
    pub debug_checks: bool,

    /// Admission policy for the dispatch loop.
    pub strategy: AdmissionStrategy,

    /// Dispatch queue capacity.
    pub capacity: QueueCapacity,

    /// Overflow behavior for a bounded dispatch queue.
    pub overflow: OverflowPolicy,

    /// Side-effect delivery strategy.
    pub action_strategy: ActionStrategy,

    /// Side-effect channel buffer size (min 1; clamped).
    pub action_capacity: usize,

    /// Capacity of the event bus broadcast ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` events skip
    /// the oldest ones. Minimum value is 1 (enforced by the bus).
    pub bus_capacity: usize,
}

impl StoreConfig {
    /// Returns the action buffer size clamped to a minimum of 1.
    #[inline]
    pub fn action_capacity_clamped(&self) -> usize {
        self.action_capacity.max(1)
    }

    /// Returns the bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for StoreConfig {
    /// Default configuration:
    ///
    /// - `name = None` (auto-generated)
    /// - `lazy = true` (start on first use)
    /// - `close_on_exceptions = false` (failures stay with their intent)
    /// - `debug_checks = cfg!(debug_assertions)`
    /// - `strategy = Fifo`
    /// - `capacity = Unbounded`, `overflow = Suspend`
    /// - `action_strategy = Receive`, `action_capacity = 64`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            name: None,
            lazy: true,
            close_on_exceptions: false,
            debug_checks: cfg!(debug_assertions),
            strategy: AdmissionStrategy::default(),
            capacity: QueueCapacity::Unbounded,
            overflow: OverflowPolicy::default(),
            action_strategy: ActionStrategy::default(),
            action_capacity: 64,
            bus_capacity: 1024,
        }
    }
}
