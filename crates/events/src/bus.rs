//! Publish/subscribe seam for match lifecycle notifications.
//!
//! The host system may deliver notifications through a bus, a webhook or a
//! direct call; the engine only needs the lifecycle handler on the other end.
//! Delivery is at least once and nothing is persisted here: a repeated
//! notification costs at most one merged job, and the match store stays the
//! source of truth.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// One subscriber's copy of the stream, consumed by a single thread.
///
/// Consumers poll with a timeout so they can notice their own shutdown
/// signal between messages; `Disconnected` means the bus is gone.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Fan-out bus: every subscription receives every message published after it
/// subscribed.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
