//! Error types used by the store runtime and intent executions.
//!
//! This module defines three error enums:
//!
//! - [`SendError`] — ingress failures returned by `send`/`try_send`.
//! - [`IntentError`] — the outcome taxonomy for a single intent (or side-job)
//!   execution, carried by the intent's completion handle.
//! - [`ActionError`] — failures of the side-effect channel.
//!
//! All types provide helper methods (`as_label`, `as_message`) for
//! logging/metrics, plus classification utilities such as
//! [`IntentError::is_cancellation`].

use std::sync::Arc;

use thiserror::Error;

/// # Errors returned when handing an intent to the store.
///
/// These represent delivery failures at the ingress boundary, before the
/// intent ever reaches an admission strategy.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The store is closed; no further intents are accepted.
    #[error("store is closed")]
    Closed,

    /// The dispatch queue is full (bounded queue with a suspending overflow
    /// policy). Use the async `send` to wait for space.
    #[error("dispatch queue full")]
    Full,
}

impl SendError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SendError::Closed => "send_closed",
            SendError::Full => "send_full",
        }
    }
}

/// A usage-contract violation detected by the debug guardian.
///
/// These are programming errors in an intent body, not runtime conditions.
/// They always surface to the intent's caller and never depend on
/// `close_on_exceptions`.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractViolation {
    /// State was read or written more than once in a single invocation under
    /// the unordered-concurrent strategy.
    #[error("state accessed twice in one invocation under a parallel strategy")]
    DoubleStateAccess,

    /// State was touched after a side-job was already posted; side-jobs must
    /// be the last statement of an intent body.
    #[error("side-job must be the last statement of an intent body")]
    SideJobNotLast,

    /// Two side-jobs were posted from the same invocation.
    #[error("only one side-job may be posted per invocation")]
    DoubleSideJob,

    /// The invocation context was used after the intent body returned.
    #[error("intent context used after the invocation completed")]
    UsedAfterClose,

    /// The intent body neither updated state nor posted a side-job.
    #[error("intent body did nothing (no state update, no side-job)")]
    NoOp,
}

/// # Outcome of a single intent or side-job execution.
///
/// Resolved into the intent's [`IntentHandle`](crate::IntentHandle), reported
/// through `IntentError`/`SideJobError` events, and — for [`IntentError::Fail`]
/// — forwarded to the store's error handler.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum IntentError {
    /// Execution failed with a handler error. Whether it also closes the
    /// store depends on the `close_on_exceptions` setting.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: Arc<str>,
    },

    /// The intent was cancelled before completion (superseded by a newer
    /// intent, or the store shut down). Not an error in the taxonomy sense:
    /// never reported to the global error handler.
    #[error("intent cancelled")]
    Canceled,

    /// A debug-guardian contract violation. Always surfaced to the caller,
    /// independent of `close_on_exceptions`.
    #[error("usage contract violated: {violation}")]
    Contract {
        /// Which rule was broken.
        violation: ContractViolation,
    },

    /// The intent filter rejected this intent before admission.
    #[error("intent rejected by filter")]
    Rejected,

    /// The request could not be delivered (queue overflow with a dropping
    /// policy, or re-delivery failed).
    #[error("intent dropped: {reason}")]
    Dropped {
        /// Why delivery failed.
        reason: Arc<str>,
    },

    /// The store closed before the intent could execute.
    #[error("store closed before execution")]
    Closed,
}

impl IntentError {
    /// Shorthand for [`IntentError::Fail`] from any displayable error.
    pub fn fail(error: impl std::fmt::Display) -> Self {
        IntentError::Fail {
            error: error.to_string().into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use statevisor::IntentError;
    ///
    /// assert_eq!(IntentError::Canceled.as_label(), "intent_canceled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            IntentError::Fail { .. } => "intent_failed",
            IntentError::Canceled => "intent_canceled",
            IntentError::Contract { .. } => "intent_contract_violation",
            IntentError::Rejected => "intent_rejected",
            IntentError::Dropped { .. } => "intent_dropped",
            IntentError::Closed => "intent_closed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }

    /// True for [`IntentError::Canceled`]: cancellation is a normal outcome,
    /// triggers rollback-per-strategy, and is never reported to the global
    /// error handler.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, IntentError::Canceled)
    }

    /// True for delivery failures ([`IntentError::Dropped`] and
    /// [`IntentError::Closed`]).
    pub fn is_delivery_failure(&self) -> bool {
        matches!(self, IntentError::Dropped { .. } | IntentError::Closed)
    }

    /// True for [`IntentError::Contract`]: a synchronous usage error that
    /// always propagates to the intent's caller.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, IntentError::Contract { .. })
    }
}

impl From<ContractViolation> for IntentError {
    fn from(violation: ContractViolation) -> Self {
        IntentError::Contract { violation }
    }
}

/// # Errors produced by the side-effect channel.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionError {
    /// The store was configured with `ActionStrategy::Disable`.
    #[error("side-effects are disabled for this store")]
    Disabled,

    /// The store is closed; the side-effect channel has been torn down.
    #[error("side-effect channel closed")]
    Closed,

    /// The single receiver was already taken (`Consume`), or is currently
    /// held by another owner (`Receive`).
    #[error("side-effect receiver already taken")]
    AlreadyTaken,

    /// The requested egress does not match the configured strategy
    /// (e.g. `action_stream()` on a `Receive` store).
    #[error("side-effect egress does not match the configured strategy")]
    WrongStrategy,
}

impl ActionError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ActionError::Disabled => "action_disabled",
            ActionError::Closed => "action_closed",
            ActionError::AlreadyTaken => "action_already_taken",
            ActionError::WrongStrategy => "action_wrong_strategy",
        }
    }
}

impl From<ActionError> for IntentError {
    fn from(err: ActionError) -> Self {
        IntentError::Fail {
            error: err.to_string().into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(SendError::Closed.as_label(), "send_closed");
        assert_eq!(SendError::Full.as_label(), "send_full");
        assert_eq!(IntentError::fail("boom").as_label(), "intent_failed");
        assert_eq!(IntentError::Rejected.as_label(), "intent_rejected");
    }

    #[test]
    fn test_classification() {
        assert!(IntentError::Canceled.is_cancellation());
        assert!(!IntentError::Closed.is_cancellation());
        assert!(IntentError::Closed.is_delivery_failure());
        assert!(
            IntentError::Dropped {
                reason: "full".into()
            }
            .is_delivery_failure()
        );

        let contract: IntentError = ContractViolation::NoOp.into();
        assert!(contract.is_contract_violation());
        assert!(!contract.is_cancellation());
    }

    #[test]
    fn test_action_error_converts_to_fail() {
        let err: IntentError = ActionError::Disabled.into();
        assert_eq!(err.as_label(), "intent_failed");
    }
}
