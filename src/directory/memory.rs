//! In-process directory with long-poll semantics.
//!
//! Every mutation bumps a global change counter and stamps the affected
//! service with it; a query blocks until its service's stamp moves past the
//! caller's `wait_index`.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tracing::debug;
use tracing::trace;

use super::DirectoryClient;
use super::QueryOptions;
use super::QueryResult;
use crate::DirectoryError;
use crate::Result;
use crate::ServiceInstance;

/// Wait applied when a query does not specify one
const DEFAULT_WAIT_TIME: Duration = Duration::from_secs(300);

#[derive(Debug)]
struct Registered {
    instance: ServiceInstance,
    passing: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Global change counter; starts at 1 like a real directory index
    index: u64,
    /// instance id -> registration
    instances: BTreeMap<String, Registered>,
    /// service name -> index of its last change
    service_index: HashMap<String, u64>,
}

#[derive(Debug)]
pub struct MemoryDirectory {
    state: RwLock<MemoryState>,
    index_tx: watch::Sender<u64>,
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDirectory {
    pub fn new() -> Self {
        let (index_tx, _) = watch::channel(1);
        Self {
            state: RwLock::new(MemoryState {
                index: 1,
                ..Default::default()
            }),
            index_tx,
        }
    }

    /// Marks an instance's health checks as passing or critical.
    pub fn set_passing(
        &self,
        instance_id: &str,
        passing: bool,
    ) -> Result<()> {
        let mut state = self.state.write();
        let name = match state.instances.get_mut(instance_id) {
            Some(registered) if registered.passing == passing => return Ok(()),
            Some(registered) => {
                registered.passing = passing;
                registered.instance.name().to_string()
            }
            None => return Err(unknown_instance(instance_id)),
        };
        self.bump(&mut state, &name);
        Ok(())
    }

    /// Current index of `service` (1 if it never changed)
    pub fn service_index(
        &self,
        service: &str,
    ) -> u64 {
        self.state.read().service_index.get(service).copied().unwrap_or(1)
    }

    fn bump(
        &self,
        state: &mut MemoryState,
        service: &str,
    ) {
        state.index += 1;
        let index = state.index;
        state.service_index.insert(service.to_string(), index);
        self.index_tx.send_replace(index);
        trace!(service, index, "directory changed");
    }

    fn read_service(
        &self,
        service: &str,
        passing_only: bool,
    ) -> QueryResult {
        let state = self.state.read();
        let entries = state
            .instances
            .values()
            .filter(|r| r.instance.name() == service)
            .filter(|r| !passing_only || r.passing)
            .map(|r| r.instance.clone())
            .collect();
        let index = state.service_index.get(service).copied().unwrap_or(1);
        QueryResult::new(index, entries)
    }
}

#[async_trait]
impl DirectoryClient for MemoryDirectory {
    async fn query(
        &self,
        service: &str,
        options: QueryOptions,
    ) -> Result<QueryResult> {
        // Subscribe before reading so a change between the read and the wait is not lost.
        let mut changes = self.index_tx.subscribe();
        let wait_time = if options.wait_time.is_zero() {
            DEFAULT_WAIT_TIME
        } else {
            options.wait_time
        };
        let deadline = Instant::now() + wait_time;

        loop {
            let current = self.read_service(service, options.passing_only);
            if options.wait_index == 0 || current.index != options.wait_index {
                return Ok(current);
            }

            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        return Ok(current);
                    }
                }
                _ = sleep_until(deadline) => {
                    return Ok(current);
                }
            }
        }
    }

    async fn register(
        &self,
        instance: &ServiceInstance,
    ) -> Result<()> {
        let mut state = self.state.write();
        let previous = state.instances.insert(
            instance.id().to_string(),
            Registered {
                instance: instance.clone(),
                passing: true,
            },
        );
        // An id moving to another service changes the old service too
        if let Some(previous) = previous.filter(|p| p.instance.name() != instance.name()) {
            self.bump(&mut state, previous.instance.name());
        }
        self.bump(&mut state, instance.name());
        debug!(service = instance.name(), id = instance.id(), "instance registered");
        Ok(())
    }

    async fn deregister(
        &self,
        instance_id: &str,
    ) -> Result<()> {
        let mut state = self.state.write();
        let removed = state
            .instances
            .remove(instance_id)
            .ok_or_else(|| unknown_instance(instance_id))?;
        self.bump(&mut state, removed.instance.name());
        debug!(service = removed.instance.name(), id = instance_id, "instance deregistered");
        Ok(())
    }
}

fn unknown_instance(instance_id: &str) -> crate::Error {
    DirectoryError::Rejected(format!("Unknown service ID {instance_id}")).into()
}
