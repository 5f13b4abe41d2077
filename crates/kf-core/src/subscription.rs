//! # Live subscriptions
//!
//! A `Subscription<T>` is the client end of a live query. The collaborator
//! pushes a full snapshot on every change; dropping or cancelling the handle
//! tears the query down on the collaborator's side.

use tokio::sync::mpsc;
use tracing::warn;

use crate::error::StoreError;

/// One delivery on a live query: a full snapshot or an error from the error channel.
pub type SnapshotEvent<T> = std::result::Result<T, StoreError>;

/// Producer half, held by the collaborator.
pub type SnapshotSender<T> = mpsc::UnboundedSender<SnapshotEvent<T>>;

type CancelFn = Box<dyn FnOnce() + Send + Sync>;

/// Cancellable handle to a live query.
pub struct Subscription<T> {
    label: &'static str,
    rx: mpsc::UnboundedReceiver<SnapshotEvent<T>>,
    on_cancel: Option<CancelFn>,
}

impl<T> Subscription<T> {
    /// Creates a connected sender/handle pair. `on_cancel` runs exactly once,
    /// on `cancel()` or drop, whichever comes first.
    pub fn channel(
        label: &'static str,
        on_cancel: impl FnOnce() + Send + Sync + 'static,
    ) -> (SnapshotSender<T>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = Self {
            label,
            rx,
            on_cancel: Some(Box::new(on_cancel)),
        };
        (tx, sub)
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Waits for the next delivery. `None` once the producer is gone.
    pub async fn next(&mut self) -> Option<SnapshotEvent<T>> {
        self.rx.recv().await
    }

    /// Drains everything already delivered and returns the newest snapshot.
    ///
    /// Snapshots are full replacements, so older ones carry no information.
    /// An error only wins when no snapshot was drained alongside it; the
    /// others are logged here.
    pub fn latest(&mut self) -> Option<SnapshotEvent<T>> {
        let mut snapshot = None;
        let mut failure = None;
        while let Ok(event) = self.rx.try_recv() {
            match event {
                Ok(value) => snapshot = Some(value),
                Err(e) => {
                    if let Some(old) = failure.replace(e) {
                        warn!(subscription = self.label, error = %old, "superseded subscription error");
                    }
                }
            }
        }
        match (snapshot, failure) {
            (Some(value), Some(e)) => {
                warn!(subscription = self.label, error = %e, "subscription error after snapshot");
                Some(Ok(value))
            }
            (Some(value), None) => Some(Ok(value)),
            (None, Some(e)) => Some(Err(e)),
            (None, None) => None,
        }
    }

    /// Explicit unsubscribe.
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.on_cancel.take() {
            cancel();
        }
        self.rx.close();
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("label", &self.label)
            .field("cancelled", &self.on_cancel.is_none())
            .finish()
    }
}

/// Holds at most one live handle per logical stream.
///
/// `replace` cancels the previous handle before installing the new one.
pub struct StreamSlot<T> {
    current: Option<Subscription<T>>,
}

impl<T> Default for StreamSlot<T> {
    fn default() -> Self {
        Self { current: None }
    }
}

impl<T> StreamSlot<T> {
    pub fn replace(&mut self, sub: Subscription<T>) {
        if let Some(old) = self.current.take() {
            old.cancel();
        }
        self.current = Some(sub);
    }

    pub fn clear(&mut self) {
        if let Some(old) = self.current.take() {
            old.cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn latest(&mut self) -> Option<SnapshotEvent<T>> {
        self.current.as_mut().and_then(Subscription::latest)
    }

    pub async fn next(&mut self) -> Option<SnapshotEvent<T>> {
        match self.current.as_mut() {
            Some(sub) => sub.next().await,
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn latest_keeps_only_newest_snapshot() {
        let (tx, mut sub) = Subscription::<u32>::channel("test", || {});
        tx.send(Ok(1)).unwrap();
        tx.send(Err(StoreError::Unavailable("blip".into()))).unwrap();
        tx.send(Ok(3)).unwrap();
        assert_eq!(sub.latest(), Some(Ok(3)));
        assert_eq!(sub.latest(), None);
    }

    #[test]
    fn latest_prefers_snapshot_over_trailing_error() {
        let (tx, mut sub) = Subscription::<u32>::channel("test", || {});
        tx.send(Ok(1)).unwrap();
        tx.send(Err(StoreError::Unavailable("gone".into()))).unwrap();
        assert_eq!(sub.latest(), Some(Ok(1)));

        tx.send(Err(StoreError::Unavailable("a".into()))).unwrap();
        tx.send(Err(StoreError::Unavailable("b".into()))).unwrap();
        assert_eq!(sub.latest(), Some(Err(StoreError::Unavailable("b".into()))));
    }

    #[test]
    fn cancel_runs_once_even_when_dropped_after() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let (_tx, sub) = Subscription::<()>::channel("test", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn slot_replace_cancels_previous_handle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut slot = StreamSlot::default();
        for _ in 0..3 {
            let counter = Arc::clone(&calls);
            let (_tx, sub) = Subscription::<()>::channel("test", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            slot.replace(sub);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        slot.clear();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!slot.is_active());
    }

    #[tokio::test]
    async fn next_ends_when_producer_drops() {
        let (tx, mut sub) = Subscription::<u8>::channel("test", || {});
        tx.send(Ok(7)).unwrap();
        drop(tx);
        assert_eq!(sub.next().await, Some(Ok(7)));
        assert_eq!(sub.next().await, None);
    }
}
