//! # Guardian: debug-only usage-discipline checker.
//!
//! One [`Guardian`] exists per intent invocation. It enforces the store's
//! usage contract while `debug_checks` is enabled and is a strict no-op
//! otherwise — diagnostics only, never a behavioral change in release
//! configurations.
//!
//! ## Rules
//! - Under the unordered-concurrent strategy, an intent body may touch state
//!   **at most once** per invocation (a second read or write is a silent race
//!   under true parallelism).
//! - A side-job must be the **last** statement of an intent body: once one is
//!   posted, any further state access or a second side-job is a violation.
//! - The invocation context must not be used after the body returned.
//! - A body that neither updated state nor posted a side-job did nothing;
//!   [`Guardian::close`] flags it.
//!
//! Violations surface as
//! [`IntentError::Contract`](crate::IntentError::Contract) to the intent's
//! caller, independent of `close_on_exceptions`.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{ContractViolation, IntentError};

/// Per-invocation invariant checker.
///
/// All checks are idempotent-safe but order-sensitive; all of them return
/// `Ok(())` when disabled.
pub(crate) struct Guardian {
    enabled: bool,
    /// True when the store runs the unordered-concurrent strategy.
    parallel: bool,
    state_touched: AtomicBool,
    job_posted: AtomicBool,
    closed: AtomicBool,
}

impl Guardian {
    pub(crate) fn new(enabled: bool, parallel: bool) -> Self {
        Self {
            enabled,
            parallel,
            state_touched: AtomicBool::new(false),
            job_posted: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Called before the intent body reads state.
    pub(crate) fn check_state_access(&self) -> Result<(), IntentError> {
        self.check_state_update()
    }

    /// Called before the intent body writes state.
    pub(crate) fn check_state_update(&self) -> Result<(), IntentError> {
        if !self.enabled {
            return Ok(());
        }
        self.check_not_closed()?;
        if self.job_posted.load(Ordering::Acquire) {
            return Err(ContractViolation::SideJobNotLast.into());
        }
        if self.state_touched.swap(true, Ordering::AcqRel) && self.parallel {
            return Err(ContractViolation::DoubleStateAccess.into());
        }
        Ok(())
    }

    /// Called when the intent body posts a side-job.
    pub(crate) fn check_side_job(&self) -> Result<(), IntentError> {
        if !self.enabled {
            return Ok(());
        }
        self.check_not_closed()?;
        if self.job_posted.swap(true, Ordering::AcqRel) {
            return Err(ContractViolation::DoubleSideJob.into());
        }
        Ok(())
    }

    /// Called on any other context use (side-effects, cancellation checks).
    pub(crate) fn check_not_closed(&self) -> Result<(), IntentError> {
        if self.enabled && self.closed.load(Ordering::Acquire) {
            return Err(ContractViolation::UsedAfterClose.into());
        }
        Ok(())
    }

    /// Called by the executor once the body returned successfully.
    ///
    /// Flags an invocation that did nothing at all.
    pub(crate) fn close(&self) -> Result<(), IntentError> {
        if !self.enabled {
            return Ok(());
        }
        self.closed.store(true, Ordering::Release);
        if !self.state_touched.load(Ordering::Acquire) && !self.job_posted.load(Ordering::Acquire) {
            return Err(ContractViolation::NoOp.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(res: Result<(), IntentError>) -> ContractViolation {
        match res {
            Err(IntentError::Contract { violation }) => violation,
            other => panic!("expected contract violation, got {other:?}"),
        }
    }

    #[test]
    fn test_disabled_guardian_accepts_everything() {
        let g = Guardian::new(false, true);
        assert!(g.check_state_update().is_ok());
        assert!(g.check_state_update().is_ok());
        assert!(g.check_side_job().is_ok());
        assert!(g.check_side_job().is_ok());
        assert!(g.close().is_ok());
        assert!(g.check_state_access().is_ok());
    }

    #[test]
    fn test_double_state_access_only_flagged_under_parallel() {
        let serial = Guardian::new(true, false);
        assert!(serial.check_state_update().is_ok());
        assert!(serial.check_state_update().is_ok());

        let parallel = Guardian::new(true, true);
        assert!(parallel.check_state_update().is_ok());
        assert_eq!(
            violation(parallel.check_state_update()),
            ContractViolation::DoubleStateAccess
        );
    }

    #[test]
    fn test_side_job_must_be_terminal() {
        let g = Guardian::new(true, false);
        assert!(g.check_state_update().is_ok());
        assert!(g.check_side_job().is_ok());
        assert_eq!(
            violation(g.check_state_access()),
            ContractViolation::SideJobNotLast
        );
        assert_eq!(violation(g.check_side_job()), ContractViolation::DoubleSideJob);
    }

    #[test]
    fn test_use_after_close() {
        let g = Guardian::new(true, false);
        assert!(g.check_state_update().is_ok());
        assert!(g.close().is_ok());
        assert_eq!(
            violation(g.check_state_update()),
            ContractViolation::UsedAfterClose
        );
        assert_eq!(
            violation(g.check_not_closed()),
            ContractViolation::UsedAfterClose
        );
    }

    #[test]
    fn test_noop_invocation_is_flagged() {
        let g = Guardian::new(true, false);
        assert_eq!(violation(g.close()), ContractViolation::NoOp);

        let g = Guardian::new(true, false);
        assert!(g.check_side_job().is_ok());
        assert!(g.close().is_ok());
    }
}
