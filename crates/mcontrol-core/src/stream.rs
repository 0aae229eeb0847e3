// ── Reactive state streams ──
//
// Subscription types for consuming merged device states from the
// DataStore.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::DeviceState;

type Snapshot = Arc<Vec<Arc<DeviceState>>>;

/// A subscription to every device's merged state.
///
/// Provides point-in-time snapshot access and change notification via
/// [`changed()`](Self::changed), or as a `Stream` via
/// [`into_stream()`](Self::into_stream).
pub struct StateStream {
    current: Snapshot,
    receiver: watch::Receiver<Snapshot>,
}

impl StateStream {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The snapshot as of creation or the last `changed()`.
    pub fn current(&self) -> &Snapshot {
        &self.current
    }

    /// The latest snapshot (may have changed since `current`).
    pub fn latest(&self) -> Snapshot {
        self.receiver.borrow().clone()
    }

    /// One device's state from the current snapshot.
    pub fn state(&self, cloud_id: &str) -> Option<Arc<DeviceState>> {
        self.current
            .iter()
            .find(|s| s.cloud_id == cloud_id)
            .cloned()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` once the store has been dropped.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&snap);
        Some(snap)
    }

    /// Wait until `cloud_id`'s state differs from the one in `current`.
    ///
    /// Returns `None` when the store is dropped or the device is removed.
    pub async fn changed_for(&mut self, cloud_id: &str) -> Option<Arc<DeviceState>> {
        let before = self.state(cloud_id);
        loop {
            self.changed().await?;
            let now = self.state(cloud_id)?;
            if before.as_deref() != Some(&*now) {
                return Some(now);
            }
        }
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> StateWatchStream {
        StateWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
///
/// Yields the current snapshot first, then a new one each time any
/// device's state is mutated.
pub struct StateWatchStream {
    inner: WatchStream<Snapshot>,
}

impl Stream for StateWatchStream {
    type Item = Snapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
