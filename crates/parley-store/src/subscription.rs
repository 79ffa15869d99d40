//! Snapshot subscriptions.
//!
//! A [`Subscription`] is the receiving half of a listener.  Dropping it
//! detaches the listener from the store; snapshots already queued are
//! discarded with it.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::error::Result;

/// Sending half handed to store implementations.
pub type SnapshotSender<T> = mpsc::UnboundedSender<Result<T>>;

pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<Result<T>>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Subscription<T> {
    /// Wrap a receiver; `on_drop` runs once when the subscription is dropped.
    pub fn new(
        rx: mpsc::UnboundedReceiver<Result<T>>,
        on_drop: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            rx,
            on_drop: Some(Box::new(on_drop)),
        }
    }

    /// A sender/subscription pair with no detach hook.
    #[cfg(test)]
    pub(crate) fn channel() -> (SnapshotSender<T>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx, on_drop: None })
    }

    /// Wait for the next snapshot.  `None` once the store side is gone.
    pub async fn next_snapshot(&mut self) -> Option<Result<T>> {
        self.rx.recv().await
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.rx.close();
        if let Some(on_drop) = self.on_drop.take() {
            on_drop();
        }
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.on_drop.is_some())
            .finish()
    }
}
