//! Watch-multiplexing registry
//!
//! Lets any number of local watchers follow the instances of a named service
//! while only one long-poll query per name is outstanding against the
//! directory.
//!
//! # Architecture
//!
//! ```text
//! Registry
//!   └─ DashMap<name, ServiceSet>      created lazily by resolve()
//!        ├─ Snapshot (ArcSwapOption)  replaced wholesale, lock-free reads
//!        ├─ watchers (RwLock<HashMap>) id -> mpsc::Sender<()> of capacity 1
//!        └─ PollLoop task             started once, on creation of the set
//!
//! DirectoryClient ──> PollLoop ──> ServiceSet::broadcast ──try_send──> Watcher
//! ```
//!
//! A watcher's slot holds at most one pending signal, so a slow consumer
//! never accumulates a backlog: it wakes once and re-reads the latest
//! snapshot.
//!
//! # Usage
//!
//! ```ignore
//! use d_discovery::{Discovery, DiscoveryConfig, MemoryDirectory, Registry};
//! use tokio_util::sync::CancellationToken;
//!
//! let registry = Registry::new(MemoryDirectory::new(), DiscoveryConfig::default());
//! let watcher = registry.resolve("orders")?;
//! let cancel = CancellationToken::new();
//! loop {
//!     let instances = watcher.watch(&cancel).await?;
//!     println!("orders now has {} instances", instances.len());
//! }
//! ```

mod poll_loop;
mod service;
mod service_set;
mod watcher;
pub use service::*;
pub use watcher::*;


use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use self::poll_loop::PollLoop;
use self::service_set::ServiceSet;
use crate::utils::async_task::spawn_task;
use crate::utils::async_task::spawn_until_cancelled;
use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::AgentServiceRegistration;
use crate::DirectoryClient;
use crate::DiscoveryConfig;
use crate::Error;
use crate::Result;

/// Publishing side of the discovery contract
#[async_trait]
pub trait Registrar: Send + Sync {
    /// Registers `instance` with the directory. Returns when the directory
    /// acknowledges or `cancel` fires, whichever comes first.
    async fn register(
        &self,
        instance: &ServiceInstance,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn deregister(
        &self,
        instance: &ServiceInstance,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Consuming side of the discovery contract
pub trait Discovery: Send + Sync {
    /// Current instances of `name`. Fails when the name was never resolved
    /// or has not received data yet.
    fn get_service(
        &self,
        name: &str,
    ) -> Result<Vec<ServiceInstance>>;

    /// Current instances of every resolved name that has data
    fn list_services(&self) -> HashMap<String, Vec<ServiceInstance>>;

    /// Creates a watcher on `name`, starting the name's poll loop on first use.
    fn resolve(
        &self,
        name: &str,
    ) -> Result<Watcher>;
}

pub struct Registry<C> {
    client: Arc<C>,
    config: DiscoveryConfig,
    sets: DashMap<String, Arc<ServiceSet>>,
    next_watcher_id: AtomicU64,
    shutdown: CancellationToken,
}

impl<C> Registry<C>
where
    C: DirectoryClient,
{
    pub fn new(
        client: C,
        config: DiscoveryConfig,
    ) -> Self {
        Self::with_client(Arc::new(client), config)
    }

    /// Builds a registry over a client shared with other owners.
    pub fn with_client(
        client: Arc<C>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            client,
            config,
            sets: DashMap::new(),
            next_watcher_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        }
    }

    /// Number of open watchers on `name`
    pub fn watcher_count(
        &self,
        name: &str,
    ) -> usize {
        self.sets.get(name).map(|set| set.watcher_count()).unwrap_or(0)
    }

    /// Number of names ever resolved
    pub fn resolved_count(&self) -> usize {
        self.sets.len()
    }

    /// Directory index the cached snapshot of `name` was observed at
    pub fn snapshot_index(
        &self,
        name: &str,
    ) -> Option<u64> {
        self.sets.get(name)?.snapshot().map(|s| s.index())
    }

    /// Stops every poll loop and waits for them to exit.
    ///
    /// Open watchers stay usable for cached reads but receive no further
    /// changes; `resolve` fails afterwards.
    ///
    /// Dropping the registry does not stop its loops: they hold their own
    /// references and keep polling until the runtime ends. Call this before
    /// dropping a registry that should not outlive its owner.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let handles: Vec<_> = self.sets.iter().filter_map(|set| set.take_poll_task()).collect();
        info!(loops = handles.len(), "Registry shutting down");

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                warn!("poll loop did not stop cleanly: {:?}", e);
            }
        }
    }

    fn start_poll_loop(
        &self,
        set: &Arc<ServiceSet>,
    ) {
        let poll = PollLoop::new(
            self.client.clone(),
            set.clone(),
            self.config.watch.clone(),
            self.shutdown.child_token(),
        );
        let handle = spawn_task(&format!("poll-{}", set.name()), move || poll.run());
        set.attach_poll_task(handle);
    }
}

#[async_trait]
impl<C> Registrar for Registry<C>
where
    C: DirectoryClient,
{
    async fn register(
        &self,
        instance: &ServiceInstance,
        cancel: &CancellationToken,
    ) -> Result<()> {
        // Endpoints the directory cannot advertise fail before any remote call
        let registration = AgentServiceRegistration::from_instance(instance, &self.config.directory)?;
        debug!(
            service = %registration.name,
            id = %registration.id,
            addresses = registration.tagged_addresses.len(),
            "Registering instance"
        );

        let client = self.client.clone();
        let instance = instance.clone();
        let policy = self.config.retry.registration;

        spawn_until_cancelled(
            async move {
                task_with_timeout_and_exponential_backoff(
                    || {
                        let client = client.clone();
                        let instance = instance.clone();
                        async move { client.register(&instance).await }
                    },
                    policy,
                )
                .await
            },
            cancel,
        )
        .await
    }

    async fn deregister(
        &self,
        instance: &ServiceInstance,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let client = self.client.clone();
        let instance_id = instance.id().to_string();
        let policy = self.config.retry.registration;

        spawn_until_cancelled(
            async move {
                task_with_timeout_and_exponential_backoff(
                    || {
                        let client = client.clone();
                        let instance_id = instance_id.clone();
                        async move { client.deregister(&instance_id).await }
                    },
                    policy,
                )
                .await
            },
            cancel,
        )
        .await
    }
}

impl<C> Discovery for Registry<C>
where
    C: DirectoryClient,
{
    fn get_service(
        &self,
        name: &str,
    ) -> Result<Vec<ServiceInstance>> {
        let set = self.sets.get(name).ok_or_else(|| Error::NotResolved(name.to_string()))?;
        set.services().ok_or_else(|| Error::NotFound(name.to_string()))
    }

    fn list_services(&self) -> HashMap<String, Vec<ServiceInstance>> {
        self.sets
            .iter()
            .filter_map(|set| set.services().map(|services| (set.key().clone(), services)))
            .collect()
    }

    fn resolve(
        &self,
        name: &str,
    ) -> Result<Watcher> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Shutdown);
        }

        // The entry guard holds the shard lock, so exactly one caller sees Vacant.
        let (set, created) = match self.sets.entry(name.to_string()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => (entry.insert(Arc::new(ServiceSet::new(name))).clone(), true),
        };

        let watcher_id = self.next_watcher_id.fetch_add(1, Ordering::Relaxed);
        let (signal_tx, signal_rx) = mpsc::channel(1);
        set.add_watcher(watcher_id, signal_tx);
        let watcher = Watcher::new(watcher_id, set.clone(), signal_rx);

        debug!(service = name, watcher_id, created, "Watcher resolved");

        // Started after the watcher joined so the first broadcast cannot miss it.
        if created {
            self.start_poll_loop(&set);
        }

        Ok(watcher)
    }
}
