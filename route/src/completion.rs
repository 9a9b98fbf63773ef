//! One-shot notification fired when a transfer completes.
//!
//! A [Notifier] is handed to a [crate::Route] along with a transfer and is fired exactly once,
//! with the virtual time at which the last byte was transferred. Any number of tasks can wait
//! on clones of the paired [Signal].

use crate::Error;
use futures::{channel::oneshot, future::Shared, FutureExt};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::SystemTime,
};

/// Create a linked [Notifier] and [Signal].
pub fn channel() -> (Notifier, Signal) {
    let (sender, receiver) = oneshot::channel();
    (
        Notifier { sender },
        Signal {
            inner: receiver.shared(),
        },
    )
}

/// Sending half of a completion. Firing consumes it, so it can only ever fire once.
#[derive(Debug)]
pub struct Notifier {
    sender: oneshot::Sender<SystemTime>,
}

impl Notifier {
    /// Fire the notification with the time the transfer completed.
    ///
    /// Returns `false` if every [Signal] was already dropped.
    pub fn fire(self, at: SystemTime) -> bool {
        self.sender.send(at).is_ok()
    }

    /// Returns whether every [Signal] paired with this notifier has been dropped.
    pub fn is_canceled(&self) -> bool {
        self.sender.is_canceled()
    }
}

/// Receiving half of a completion.
///
/// Resolves to the virtual time the transfer completed or to [Error::Canceled] if the
/// [Notifier] was dropped without firing.
#[derive(Clone)]
pub struct Signal {
    inner: Shared<oneshot::Receiver<SystemTime>>,
}

impl Signal {
    /// Returns the completion time if the notifier has already fired.
    pub fn peek(&self) -> Option<SystemTime> {
        match self.inner.clone().now_or_never() {
            Some(Ok(at)) => Some(at),
            _ => None,
        }
    }
}

impl Future for Signal {
    type Output = Result<SystemTime, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner
            .poll_unpin(cx)
            .map(|result| result.map_err(|_| Error::Canceled))
    }
}
