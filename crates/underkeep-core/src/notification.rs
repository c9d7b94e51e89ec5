//! Outbound notification channel.
//!
//! The simulation enqueues typed messages addressed to players; a transport
//! layer drains them independently, possibly from another thread. Built on an
//! unbounded crossbeam channel, so enqueueing never blocks the tick and
//! draining needs no lock shared with the producer.

use crate::id::PlayerId;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Kind of an outbound message. Decides how the payload is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// `u32 count` then `count` research codes: the pending queue.
    ResearchTree,
    /// `u32 count` then `count` research codes: the done set.
    ResearchesDone,
    /// Entity name then the full wire encoding of the entity.
    AddEntity,
    /// Entity name only.
    RemoveEntity,
    /// A single string.
    Chat,
    PlayerFighting,
    PlayerNoMoreFighting,
}

/// One queued message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub target: PlayerId,
    pub kind: MessageKind,
    pub payload: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Channel halves
// ---------------------------------------------------------------------------

/// Create a connected sender/receiver pair.
pub fn channel() -> (NotificationSender, NotificationReceiver) {
    let (tx, rx) = unbounded();
    (
        NotificationSender { inner: tx },
        NotificationReceiver { inner: rx },
    )
}

/// Enqueue side, held by the simulation.
#[derive(Debug, Clone)]
pub struct NotificationSender {
    inner: Sender<Notification>,
}

impl NotificationSender {
    /// Queue a message for `target`. A disconnected receiver is logged and
    /// otherwise ignored; the simulation must not stall on a dead transport.
    pub fn enqueue(&self, target: PlayerId, kind: MessageKind, payload: Vec<u8>) {
        let notification = Notification {
            target,
            kind,
            payload,
        };
        if let Err(err) = self.inner.send(notification) {
            tracing::error!(
                player = ?target,
                kind = ?err.0.kind,
                "notification receiver disconnected; message dropped"
            );
        }
    }
}

/// Drain side, held by the transport.
#[derive(Debug, Clone)]
pub struct NotificationReceiver {
    inner: Receiver<Notification>,
}

impl NotificationReceiver {
    /// Take every message currently queued, in enqueue order.
    pub fn drain(&self) -> Vec<Notification> {
        self.inner.try_iter().collect()
    }

    /// Wait up to `timeout` for the next message.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Notification> {
        match self.inner.recv_timeout(timeout) {
            Ok(n) => Some(n),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn drain_preserves_order() {
        let (tx, rx) = channel();
        tx.enqueue(PlayerId(1), MessageKind::Chat, vec![1]);
        tx.enqueue(PlayerId(2), MessageKind::RemoveEntity, vec![2]);
        assert_eq!(rx.len(), 2);

        let drained = rx.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].target, PlayerId(1));
        assert_eq!(drained[1].kind, MessageKind::RemoveEntity);
        assert!(rx.is_empty());
    }

    #[test]
    fn enqueue_after_receiver_dropped_does_not_panic() {
        let (tx, rx) = channel();
        drop(rx);
        tx.enqueue(PlayerId(1), MessageKind::Chat, Vec::new());
    }

    #[test]
    fn concurrent_drain_while_enqueueing() {
        let (tx, rx) = channel();
        let consumer = thread::spawn(move || {
            let mut seen = 0;
            while seen < 500 {
                if rx.recv_timeout(Duration::from_secs(5)).is_some() {
                    seen += 1;
                } else {
                    break;
                }
            }
            seen
        });

        for i in 0..500 {
            tx.enqueue(PlayerId(i % 3), MessageKind::PlayerFighting, Vec::new());
        }

        assert_eq!(consumer.join().unwrap(), 500);
    }
}
