//! The observable state bus (§9 "Reactive state bus").
//!
//! A latest-value publisher: it retains the last published value, hands it
//! to new subscribers immediately on subscribe, and fans subsequent
//! updates out to every live subscriber. Built on `tokio::sync::watch`,
//! which already has exactly this replay-latest-value shape.

use tokio::sync::watch;

/// Per-entity observable state publisher.
///
/// `T` is published by the dispatcher as the server delivers updates; any
/// number of callers may subscribe and are not required to unsubscribe —
/// the bus has no cancellation protocol beyond dropping the subscription.
pub struct StateBus<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T: Clone + Send + Sync + 'static> StateBus<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Publish a new value, fanning it out to every live subscriber.
    pub fn publish(&self, value: T) {
        // A `send` only fails when every receiver (including the one kept
        // alive by `subscribe`) has been dropped, which cannot happen here
        // since `Self` always holds a live sender/receiver pair.
        let _ = self.tx.send(Some(value));
    }

    /// The most recently published value, if any.
    pub fn current(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    /// A raw watch receiver: `.borrow()` for the latest value,
    /// `.changed().await` to wait for the next update.
    pub fn subscribe(&self) -> StateSubscription<T> {
        StateSubscription { rx: self.tx.subscribe() }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for StateBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription to a [`StateBus`]. Dropping it silently unsubscribes.
pub struct StateSubscription<T> {
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> StateSubscription<T> {
    /// The value at the time of (or since) the last observed update,
    /// delivered immediately even if no update has happened since
    /// subscribing.
    pub fn current(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    /// Suspend until a new value is published, then return it.
    pub async fn next(&mut self) -> Option<T> {
        if self.rx.changed().await.is_err() {
            return None;
        }
        self.rx.borrow().clone()
    }
}
