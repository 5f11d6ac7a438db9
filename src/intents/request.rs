//! In-flight intent request: payload plus completion handle.

use crate::intents::IntentHandle;

/// A queued intent awaiting admission.
///
/// Created at `send`, consumed by exactly one admission-strategy invocation,
/// and gone once the completion handle resolves.
pub(crate) struct IntentRequest<I> {
    /// The intent payload.
    pub intent: I,
    /// Completion handle shared with the caller.
    pub handle: IntentHandle,
    /// Set once the request has been through its single re-delivery attempt.
    pub redelivered: bool,
}

impl<I> IntentRequest<I> {
    /// Creates a request and the caller-facing handle.
    pub(crate) fn new(intent: I) -> (Self, IntentHandle) {
        let handle = IntentHandle::new();
        (
            Self {
                intent,
                handle: handle.clone(),
                redelivered: false,
            },
            handle,
        )
    }
}
