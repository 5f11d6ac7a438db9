//! # Side-effect delivery channel.
//!
//! One-shot effects ("actions") flow from intent bodies to the UI or other
//! consumers through an [`ActionChannel`], whose behavior is selected by
//! [`ActionStrategy`]:
//!
//! - **Receive** — a single mailbox receiver; each action is delivered to
//!   exactly one consumer, and the receiver can be re-taken after the
//!   previous owner drops it (late resubscription).
//! - **Consume** — like `Receive`, but the receiver can be taken exactly
//!   once for the store's lifetime.
//! - **Share** — broadcast to every subscriber, with the last `replay`
//!   actions replayed to late subscribers.
//! - **Disable** — the store has no side-effect channel; emitting is an
//!   error.
//!
//! ## Rules
//! - `Receive`/`Consume` producers suspend when the mailbox is full
//!   (backpressure); `Share` never blocks (slow subscribers lag and skip).
//! - Closing the store closes the channel: receivers observe end-of-stream,
//!   producers get [`ActionError::Closed`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{broadcast, mpsc};

use crate::error::ActionError;

use super::StoreAction;

/// Policy selecting how side-effects reach consumers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ActionStrategy {
    /// Single receiver, re-takeable after the current owner drops it.
    #[default]
    Receive,
    /// Single receiver, takeable exactly once.
    Consume,
    /// Broadcast to all subscribers, replaying the last `replay` actions to
    /// late subscribers.
    Share {
        /// Number of recent actions replayed on subscribe.
        replay: usize,
    },
    /// No side-effect channel.
    Disable,
}

struct MailboxState<A> {
    rx: Option<mpsc::Receiver<A>>,
}

struct SharedState<A> {
    tx: Option<broadcast::Sender<A>>,
    replay: VecDeque<A>,
    replay_cap: usize,
}

/// Store-owned side-effect channel.
pub(crate) enum ActionChannel<A> {
    Disabled,
    Mailbox {
        tx: Mutex<Option<mpsc::Sender<A>>>,
        slot: Arc<Mutex<MailboxState<A>>>,
        retake: bool,
    },
    Shared {
        state: Mutex<SharedState<A>>,
    },
}

impl<A: StoreAction> ActionChannel<A> {
    pub(crate) fn new(strategy: ActionStrategy, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        match strategy {
            ActionStrategy::Disable => ActionChannel::Disabled,
            ActionStrategy::Receive | ActionStrategy::Consume => {
                let (tx, rx) = mpsc::channel(capacity);
                ActionChannel::Mailbox {
                    tx: Mutex::new(Some(tx)),
                    slot: Arc::new(Mutex::new(MailboxState { rx: Some(rx) })),
                    retake: matches!(strategy, ActionStrategy::Receive),
                }
            }
            ActionStrategy::Share { replay } => {
                let (tx, _rx) = broadcast::channel(capacity.max(replay.max(1)));
                ActionChannel::Shared {
                    state: Mutex::new(SharedState {
                        tx: Some(tx),
                        replay: VecDeque::with_capacity(replay),
                        replay_cap: replay,
                    }),
                }
            }
        }
    }

    /// Delivers one action. Suspends on a full mailbox.
    pub(crate) async fn send(&self, action: A) -> Result<(), ActionError> {
        match self {
            ActionChannel::Disabled => Err(ActionError::Disabled),
            ActionChannel::Mailbox { tx, .. } => {
                // Clone the sender out so the guard is not held across await.
                let sender = tx.lock().unwrap().clone();
                match sender {
                    Some(sender) => sender.send(action).await.map_err(|_| ActionError::Closed),
                    None => Err(ActionError::Closed),
                }
            }
            ActionChannel::Shared { state } => {
                let mut state = state.lock().unwrap();
                let Some(tx) = &state.tx else {
                    return Err(ActionError::Closed);
                };
                let _ = tx.send(action.clone());
                if state.replay_cap > 0 {
                    if state.replay.len() == state.replay_cap {
                        state.replay.pop_front();
                    }
                    state.replay.push_back(action);
                }
                Ok(())
            }
        }
    }

    /// Takes the mailbox receiver (`Receive`/`Consume` strategies).
    pub(crate) fn take_receiver(&self) -> Result<ActionReceiver<A>, ActionError> {
        match self {
            ActionChannel::Disabled => Err(ActionError::Disabled),
            ActionChannel::Shared { .. } => Err(ActionError::WrongStrategy),
            ActionChannel::Mailbox { slot, retake, .. } => {
                let mut state = slot.lock().unwrap();
                match state.rx.take() {
                    Some(rx) => {
                        let home = if *retake {
                            Some(Arc::downgrade(slot))
                        } else {
                            None
                        };
                        Ok(ActionReceiver {
                            rx: Some(rx),
                            home,
                        })
                    }
                    None => Err(ActionError::AlreadyTaken),
                }
            }
        }
    }

    /// Subscribes to the broadcast stream (`Share` strategy).
    pub(crate) fn subscribe(&self) -> Result<ActionStream<A>, ActionError> {
        match self {
            ActionChannel::Disabled => Err(ActionError::Disabled),
            ActionChannel::Mailbox { .. } => Err(ActionError::WrongStrategy),
            ActionChannel::Shared { state } => {
                // Snapshot the replay buffer and subscribe under one guard so
                // no action is duplicated or lost between the two.
                let state = state.lock().unwrap();
                let Some(tx) = &state.tx else {
                    return Err(ActionError::Closed);
                };
                Ok(ActionStream {
                    prefix: state.replay.clone(),
                    rx: tx.subscribe(),
                })
            }
        }
    }

    /// Tears the channel down: producers fail, consumers see end-of-stream.
    pub(crate) fn close(&self) {
        match self {
            ActionChannel::Disabled => {}
            ActionChannel::Mailbox { tx, .. } => {
                tx.lock().unwrap().take();
            }
            ActionChannel::Shared { state } => {
                state.lock().unwrap().tx.take();
            }
        }
    }
}

/// Mailbox receiver for `Receive`/`Consume` stores.
///
/// Under `Receive`, dropping the receiver puts it back so a later consumer
/// can take over; under `Consume` it is gone for good.
pub struct ActionReceiver<A> {
    rx: Option<mpsc::Receiver<A>>,
    home: Option<Weak<Mutex<MailboxState<A>>>>,
}

impl<A> ActionReceiver<A> {
    /// Receives the next action, or `None` once the store is closed.
    pub async fn recv(&mut self) -> Option<A> {
        self.rx.as_mut()?.recv().await
    }
}

impl<A> Drop for ActionReceiver<A> {
    fn drop(&mut self) {
        if let (Some(home), Some(rx)) = (self.home.take(), self.rx.take()) {
            if let Some(slot) = home.upgrade() {
                slot.lock().unwrap().rx = Some(rx);
            }
        }
    }
}

/// Broadcast subscription for `Share` stores, replaying recent actions first.
pub struct ActionStream<A> {
    prefix: VecDeque<A>,
    rx: broadcast::Receiver<A>,
}

impl<A: StoreAction> ActionStream<A> {
    /// Receives the next action, or `None` once the store is closed.
    ///
    /// Lagged gaps are skipped silently; the stream continues with the
    /// oldest retained action.
    pub async fn recv(&mut self) -> Option<A> {
        if let Some(action) = self.prefix.pop_front() {
            return Some(action);
        }
        loop {
            match self.rx.recv().await {
                Ok(action) => return Some(action),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_receive_receiver_is_retakeable() {
        let ch: ActionChannel<u32> = ActionChannel::new(ActionStrategy::Receive, 8);
        let mut rx = ch.take_receiver().unwrap();
        assert!(matches!(ch.take_receiver(), Err(ActionError::AlreadyTaken)));

        ch.send(1).await.unwrap();
        assert_eq!(rx.recv().await, Some(1));

        drop(rx);
        let mut rx = ch.take_receiver().unwrap();
        ch.send(2).await.unwrap();
        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn test_consume_receiver_is_single_shot() {
        let ch: ActionChannel<u32> = ActionChannel::new(ActionStrategy::Consume, 8);
        let rx = ch.take_receiver().unwrap();
        drop(rx);
        assert!(matches!(ch.take_receiver(), Err(ActionError::AlreadyTaken)));
    }

    #[tokio::test]
    async fn test_share_replays_recent_actions() {
        let ch: ActionChannel<u32> = ActionChannel::new(ActionStrategy::Share { replay: 2 }, 8);
        ch.send(1).await.unwrap();
        ch.send(2).await.unwrap();
        ch.send(3).await.unwrap();

        let mut late = ch.subscribe().unwrap();
        assert_eq!(late.recv().await, Some(2));
        assert_eq!(late.recv().await, Some(3));

        ch.send(4).await.unwrap();
        assert_eq!(late.recv().await, Some(4));
    }

    #[tokio::test]
    async fn test_share_broadcasts_to_all_subscribers() {
        let ch: ActionChannel<u32> = ActionChannel::new(ActionStrategy::Share { replay: 0 }, 8);
        let mut a = ch.subscribe().unwrap();
        let mut b = ch.subscribe().unwrap();

        ch.send(7).await.unwrap();
        assert_eq!(a.recv().await, Some(7));
        assert_eq!(b.recv().await, Some(7));
    }

    #[tokio::test]
    async fn test_disabled_rejects_sends() {
        let ch: ActionChannel<u32> = ActionChannel::new(ActionStrategy::Disable, 8);
        assert!(matches!(ch.send(1).await, Err(ActionError::Disabled)));
        assert!(matches!(ch.take_receiver(), Err(ActionError::Disabled)));
    }

    #[tokio::test]
    async fn test_close_terminates_consumers_and_producers() {
        let ch: ActionChannel<u32> = ActionChannel::new(ActionStrategy::Receive, 8);
        let mut rx = ch.take_receiver().unwrap();
        ch.send(1).await.unwrap();
        ch.close();

        assert!(matches!(ch.send(2).await, Err(ActionError::Closed)));
        // Buffered action is still delivered, then end-of-stream.
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, None);
    }
}
