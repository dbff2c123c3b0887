use std::sync::Arc;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::service_set::ServiceSet;
use crate::CancelSource;
use crate::Error;
use crate::Result;
use crate::ServiceInstance;

/// Per-consumer handle on one service's snapshots
///
/// Created by `Discovery::resolve`. Each [`watch`](Watcher::watch) call waits
/// for the next change and returns the snapshot current at wake-up, so any
/// number of changes between two calls collapse into one.
///
/// Closing (explicitly or by dropping the handle) cancels the watcher's own
/// scope and removes it from its service's membership.
pub struct Watcher {
    id: u64,
    set: Arc<ServiceSet>,
    signal: Mutex<mpsc::Receiver<()>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Watcher {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id)
            .field("service", &self.set.name())
            .field("closed", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Watcher {
    pub(crate) fn new(
        id: u64,
        set: Arc<ServiceSet>,
        signal: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            id,
            set,
            signal: Mutex::new(signal),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn service_name(&self) -> &str {
        self.set.name()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Waits for the next change of the service and returns its current
    /// instances.
    ///
    /// Fails with [`Error::Cancelled`] when the watcher is closed or `cancel`
    /// fires first. Cancelling only `cancel` leaves the watcher usable.
    pub async fn watch(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ServiceInstance>> {
        let mut signal = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Error::Cancelled(CancelSource::Watcher)),
            _ = cancel.cancelled() => return Err(Error::Cancelled(CancelSource::Caller)),
            guard = self.signal.lock() => guard,
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled(CancelSource::Watcher)),
            _ = cancel.cancelled() => Err(Error::Cancelled(CancelSource::Caller)),
            received = signal.recv() => match received {
                Some(()) => Ok(self.set.services().unwrap_or_default()),
                // Every sender is gone only once the watcher left its set
                None => Err(Error::Cancelled(CancelSource::Watcher)),
            },
        }
    }

    /// Cancels pending and future `watch` calls and leaves the service's
    /// membership. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
        if self.set.remove_watcher(self.id) {
            debug!(service = %self.set.name(), watcher_id = self.id, "Watcher closed");
        }
    }

    /// Turns the watcher into a stream of snapshots ending when the watcher
    /// is closed or `cancel` fires.
    pub fn into_stream(
        self,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Vec<ServiceInstance>> + Send {
        futures::stream::unfold((self, cancel), |(watcher, cancel)| async move {
            match watcher.watch(&cancel).await {
                Ok(services) => Some((services, (watcher, cancel))),
                Err(e) => {
                    debug!(watcher_id = watcher.id, "watch stream ended: {}", e);
                    None
                }
            }
        })
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.close();
    }
}
