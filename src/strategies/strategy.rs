//! # Admission strategies: order/concurrency policy for intent execution.
//!
//! The store treats admission as a **value**: one [`AdmissionStrategy`]
//! variant is stored in the configuration and drives which dispatch loop the
//! store runs. At any given time one loop owns the dispatch queue.
//!
//! ## Variants
//! - `Fifo`: strict submission order, one intent at a time to completion.
//! - `Lifo`: newest wins immediately; the superseded execution unwinds in
//!   the background.
//! - `ChannelLifo`: newest wins through a conflating single-slot queue;
//!   `ordered` additionally joins the superseded execution before starting
//!   the next one.
//! - `Parallel`: no ordering or mutual exclusion at all.
//!
//! ## Invariants
//! - Cancellation rolls the state back to the pre-execution snapshot for
//!   every strategy except `Parallel` (concurrent writers may already have
//!   observed values past the snapshot, so rolling back there would corrupt
//!   rather than repair).
//! - No guarantee holds across strategies; each loop documents its own.

/// Policy controlling when and how a queued intent actually executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmissionStrategy {
    /// Strict FIFO: a single consumer executes each intent to completion
    /// before reading the next. New intents never preempt in-flight ones.
    ///
    /// Use when:
    /// - Every submission must take effect
    /// - Order matters
    /// - Example: an editor applying keystrokes
    Fifo,

    /// LIFO supersession without a queue: each new intent cancels the
    /// in-flight one and starts immediately. The outgoing execution may
    /// overlap briefly while it unwinds.
    ///
    /// Use when:
    /// - Only the latest request matters
    /// - Starting latency beats strict isolation
    /// - Example: type-ahead search
    Lifo,

    /// LIFO supersession through a conflating capacity-1 queue: an
    /// unconsumed older request is displaced (and resolved as cancelled) by
    /// a newer one.
    ChannelLifo {
        /// When `true`, the loop joins the cancelled execution before
        /// starting the next, guaranteeing no overlap at the cost of the
        /// outgoing intent delaying the incoming one.
        ordered: bool,
    },

    /// Unordered-concurrent: every intent runs as an independent task with
    /// no ordering or mutual-exclusion guarantee. State writers race through
    /// the CAS loop.
    ///
    /// When the underlying queue is bounded and full, producers suspend.
    Parallel {
        /// When `true`, execution begins synchronously up to the first
        /// suspension point to minimize scheduling latency.
        direct: bool,
    },
}

impl Default for AdmissionStrategy {
    /// Returns [`AdmissionStrategy::Fifo`].
    fn default() -> Self {
        AdmissionStrategy::Fifo
    }
}

impl AdmissionStrategy {
    /// Whether a cancelled intent restores the pre-execution state snapshot.
    ///
    /// `true` for every strategy except `Parallel`, which cannot roll back
    /// safely because other concurrent writers may have built on top of the
    /// captured snapshot already.
    pub fn rollback_on_cancellation(&self) -> bool {
        !matches!(self, AdmissionStrategy::Parallel { .. })
    }

    /// Whether displaced queue items count as superseded (resolved as
    /// cancelled) rather than dropped.
    pub(crate) fn is_superseding(&self) -> bool {
        matches!(
            self,
            AdmissionStrategy::Lifo | AdmissionStrategy::ChannelLifo { .. }
        )
    }

    /// Whether intents may execute concurrently with each other.
    pub(crate) fn is_parallel(&self) -> bool {
        matches!(self, AdmissionStrategy::Parallel { .. })
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            AdmissionStrategy::Fifo => "fifo",
            AdmissionStrategy::Lifo => "lifo",
            AdmissionStrategy::ChannelLifo { ordered: true } => "channel_lifo_ordered",
            AdmissionStrategy::ChannelLifo { ordered: false } => "channel_lifo",
            AdmissionStrategy::Parallel { direct: true } => "parallel_direct",
            AdmissionStrategy::Parallel { direct: false } => "parallel",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollback_matrix() {
        assert!(AdmissionStrategy::Fifo.rollback_on_cancellation());
        assert!(AdmissionStrategy::Lifo.rollback_on_cancellation());
        assert!(AdmissionStrategy::ChannelLifo { ordered: true }.rollback_on_cancellation());
        assert!(!AdmissionStrategy::Parallel { direct: false }.rollback_on_cancellation());
    }

    #[test]
    fn test_superseding_matrix() {
        assert!(!AdmissionStrategy::Fifo.is_superseding());
        assert!(AdmissionStrategy::Lifo.is_superseding());
        assert!(AdmissionStrategy::ChannelLifo { ordered: false }.is_superseding());
        assert!(!AdmissionStrategy::Parallel { direct: true }.is_superseding());
    }
}
