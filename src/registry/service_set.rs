use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::trace;

use crate::ServiceInstance;

/// Instances of one service as observed at a directory index.
///
/// Published wholesale and never mutated afterwards.
#[derive(Debug)]
pub(crate) struct Snapshot {
    index: u64,
    services: Vec<ServiceInstance>,
}

impl Snapshot {
    pub(crate) fn new(
        index: u64,
        services: Vec<ServiceInstance>,
    ) -> Self {
        Self { index, services }
    }

    pub(crate) fn index(&self) -> u64 {
        self.index
    }

    pub(crate) fn services(&self) -> &[ServiceInstance] {
        &self.services
    }
}

/// Per-name aggregate: snapshot cache, watcher membership and the handle of
/// the poll loop feeding them.
///
/// The snapshot cell and the membership map are guarded independently so a
/// snapshot write never waits on membership changes.
pub(crate) struct ServiceSet {
    name: String,
    snapshot: ArcSwapOption<Snapshot>,
    /// watcher id -> single-slot change signal
    watchers: RwLock<HashMap<u64, mpsc::Sender<()>>>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl ServiceSet {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            snapshot: ArcSwapOption::empty(),
            watchers: RwLock::new(HashMap::new()),
            poll_task: Mutex::new(None),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.load_full()
    }

    /// Copy of the current instances, `None` before the first broadcast
    pub(crate) fn services(&self) -> Option<Vec<ServiceInstance>> {
        self.snapshot.load_full().map(|s| s.services().to_vec())
    }

    pub(crate) fn has_data(&self) -> bool {
        self.snapshot.load_full().is_some_and(|s| !s.services().is_empty())
    }

    /// Publishes `snapshot` and signals every registered watcher.
    ///
    /// A watcher whose slot is still full keeps its single pending signal;
    /// the new one is dropped and the watcher reads the latest snapshot anyway.
    pub(crate) fn broadcast(
        &self,
        snapshot: Snapshot,
    ) {
        let index = snapshot.index();
        let instances = snapshot.services().len();
        self.snapshot.store(Some(Arc::new(snapshot)));

        let watchers = self.watchers.read();
        for (watcher_id, signal) in watchers.iter() {
            match signal.try_send(()) {
                Ok(()) => trace!(service = %self.name, watcher_id, "watcher signalled"),
                Err(TrySendError::Full(_)) => trace!(service = %self.name, watcher_id, "signal coalesced"),
                Err(TrySendError::Closed(_)) => {}
            }
        }

        debug!(
            service = %self.name,
            index,
            instances,
            watchers = watchers.len(),
            "Snapshot broadcast"
        );
    }

    /// Adds a watcher's signal. When data already exists the slot is armed so
    /// the watcher's first wait returns immediately.
    pub(crate) fn add_watcher(
        &self,
        watcher_id: u64,
        signal: mpsc::Sender<()>,
    ) {
        self.watchers.write().insert(watcher_id, signal.clone());
        if self.has_data() {
            // A broadcast racing with this insert may have filled the slot already.
            let _ = signal.try_send(());
        }
    }

    /// Returns false when the watcher was already gone.
    pub(crate) fn remove_watcher(
        &self,
        watcher_id: u64,
    ) -> bool {
        self.watchers.write().remove(&watcher_id).is_some()
    }

    pub(crate) fn watcher_count(&self) -> usize {
        self.watchers.read().len()
    }

    pub(crate) fn attach_poll_task(
        &self,
        handle: JoinHandle<()>,
    ) {
        *self.poll_task.lock() = Some(handle);
    }

    pub(crate) fn take_poll_task(&self) -> Option<JoinHandle<()>> {
        self.poll_task.lock().take()
    }
}
