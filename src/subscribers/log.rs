//! # Simple logging interceptor for debugging and demos.
//!
//! [`LogWriter`] renders events through `tracing` in a compact,
//! human-readable format. This is primarily useful for development,
//! debugging, and examples.
//!
//! ## Output format
//! ```text
//! [started] store=counter
//! [intent-handled] store=counter
//! [state-changed] store=counter
//! [side-job-started] store=counter key=refresh restart=Restarted
//! [intent-error] store=counter reason="execution failed: boom"
//! [closed] store=counter
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

use super::Subscribe;

/// Simple tracing-backed logging interceptor.
///
/// Enabled via the `logging` feature. Emits one `info!` line per event for
/// debugging and demonstration purposes.
///
/// Not intended for production use - implement a custom [`Subscribe`] for
/// structured logging or metrics collection.
#[derive(Default)]
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let store = e.store.as_deref().unwrap_or("?");
        match e.kind {
            EventKind::Started => tracing::info!(store, "[started]"),
            EventKind::Closed => tracing::info!(store, "[closed]"),
            EventKind::IntentQueued => tracing::debug!(store, "[intent-queued]"),
            EventKind::IntentAccepted => tracing::debug!(store, "[intent-accepted]"),
            EventKind::IntentRejected => tracing::info!(store, "[intent-rejected]"),
            EventKind::IntentDropped => {
                tracing::info!(store, reason = ?e.reason, "[intent-dropped]")
            }
            EventKind::IntentHandled => tracing::info!(store, "[intent-handled]"),
            EventKind::IntentCancelled => tracing::info!(store, "[intent-cancelled]"),
            EventKind::IntentError => {
                tracing::info!(store, reason = ?e.reason, "[intent-error]")
            }
            EventKind::StateChanged => tracing::debug!(store, "[state-changed]"),
            EventKind::SideEffectQueued => tracing::debug!(store, "[side-effect-queued]"),
            EventKind::SideEffectEmitted => tracing::debug!(store, "[side-effect-emitted]"),
            EventKind::SideJobQueued => {
                tracing::debug!(store, key = ?e.key, "[side-job-queued]")
            }
            EventKind::SideJobStarted => {
                tracing::info!(store, key = ?e.key, restart = ?e.restart, "[side-job-started]")
            }
            EventKind::SideJobCompleted => {
                tracing::info!(store, key = ?e.key, "[side-job-completed]")
            }
            EventKind::SideJobCancelled => {
                tracing::info!(store, key = ?e.key, "[side-job-cancelled]")
            }
            EventKind::SideJobError => {
                tracing::info!(store, key = ?e.key, reason = ?e.reason, "[side-job-error]")
            }
            EventKind::UnhandledError => {
                tracing::warn!(store, reason = ?e.reason, "[unhandled-error]")
            }
        }
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}
