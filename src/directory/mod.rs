//! Directory service collaborator
//!
//! The registry never talks to the network itself. Everything it needs from
//! the directory (the blocking long-poll query plus register/deregister) goes
//! through [`DirectoryClient`]. This module also holds the record shapes of a
//! Consul-style directory with their translation to [`ServiceInstance`], and
//! [`MemoryDirectory`], an in-process implementation with the same long-poll
//! semantics.

mod memory;
mod record;
pub use memory::*;
pub use record::*;


use std::time::Duration;

#[cfg(test)]
use mockall::automock;

use async_trait::async_trait;

use crate::Result;
use crate::ServiceInstance;

/// Parameters of one blocking query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Last index seen by the caller. `0` returns current data immediately;
    /// any other value blocks until the directory's index moves past it.
    pub wait_index: u64,

    /// Upper bound the directory may hold the query open
    pub wait_time: Duration,

    /// Only return instances whose health checks pass
    pub passing_only: bool,
}

/// Instances of one service as observed at `index`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub entries: Vec<ServiceInstance>,
    pub index: u64,
}

impl QueryResult {
    pub fn new(
        index: u64,
        entries: Vec<ServiceInstance>,
    ) -> Self {
        Self { entries, index }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait DirectoryClient: Send + Sync + 'static {
    /// Blocking long-poll query for the instances of `service`.
    ///
    /// Returns immediately when `options.wait_index` is 0 or already differs
    /// from the directory's index; otherwise blocks until the index advances
    /// or `options.wait_time` elapses.
    async fn query(
        &self,
        service: &str,
        options: QueryOptions,
    ) -> Result<QueryResult>;

    async fn register(
        &self,
        instance: &ServiceInstance,
    ) -> Result<()>;

    async fn deregister(
        &self,
        instance_id: &str,
    ) -> Result<()>;
}
