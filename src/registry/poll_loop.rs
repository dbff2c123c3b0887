//! Background long-poll loop, one per resolved service name.
//!
//! ```text
//! start ──> query(index=0, initial deadline) ──> broadcast if non-empty
//!   │
//!   └─> every tick:
//!         query(index=last, long-poll deadline)
//!           ├─ Err  ──> sleep(retry_delay), keep last index
//!           └─ Ok   ──> broadcast if non-empty and index changed
//!                       last index = returned index
//! ```
//!
//! Failures never leave the loop; watchers keep reading the last good
//! snapshot. Empty results never replace a snapshot.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval_at;
use tokio::time::sleep;
use tokio::time::timeout;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::service_set::ServiceSet;
use super::service_set::Snapshot;
use crate::DirectoryClient;
use crate::DirectoryError;
use crate::QueryOptions;
use crate::QueryResult;
use crate::Result;
use crate::WatchConfig;

pub(crate) struct PollLoop<C> {
    client: Arc<C>,
    set: Arc<ServiceSet>,
    config: WatchConfig,
    shutdown: CancellationToken,
}

impl<C> PollLoop<C>
where
    C: DirectoryClient,
{
    pub(crate) fn new(
        client: Arc<C>,
        set: Arc<ServiceSet>,
        config: WatchConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            set,
            config,
            shutdown,
        }
    }

    /// Runs until the registry shuts down.
    pub(crate) async fn run(self) -> Result<()> {
        info!(service = %self.set.name(), "Poll loop started");

        let mut last_index = match self.query(0, self.config.initial_query_timeout()).await {
            Ok(Some(result)) => {
                let index = result.index;
                if !result.entries.is_empty() {
                    self.set.broadcast(Snapshot::new(index, result.entries));
                }
                index
            }
            Ok(None) => return self.stopped(),
            Err(e) => {
                warn!(service = %self.set.name(), "initial query failed: {:?}", e);
                0
            }
        };

        let period = self.config.poll_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.query(last_index, self.config.long_poll_timeout()).await {
                Ok(Some(result)) => {
                    last_index = self.apply(last_index, result);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(
                        service = %self.set.name(),
                        index = last_index,
                        "long-poll query failed, retrying: {:?}",
                        e
                    );
                    if self.pause(self.config.retry_delay()).await {
                        break;
                    }
                }
            }
        }

        self.stopped()
    }

    /// Publishes `result` when it carries a real change and returns the
    /// index to poll from next.
    fn apply(
        &self,
        last_index: u64,
        result: QueryResult,
    ) -> u64 {
        if !result.entries.is_empty() && result.index != last_index {
            debug!(
                service = %self.set.name(),
                from = last_index,
                to = result.index,
                "Service changed"
            );
            self.set.broadcast(Snapshot::new(result.index, result.entries));
        } else {
            trace!(
                service = %self.set.name(),
                index = result.index,
                empty = result.entries.is_empty(),
                "No change to publish"
            );
        }
        result.index
    }

    /// One query bounded by `deadline`. `Ok(None)` means shutdown.
    async fn query(
        &self,
        since_index: u64,
        deadline: Duration,
    ) -> Result<Option<QueryResult>> {
        let options = QueryOptions {
            wait_index: since_index,
            wait_time: self.config.wait_time(),
            passing_only: self.config.passing_only,
        };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Ok(None),
            result = timeout(deadline, self.client.query(self.set.name(), options)) => match result {
                Ok(r) => r.map(Some),
                Err(_) => Err(DirectoryError::Timeout {
                    service: self.set.name().to_string(),
                    duration: deadline,
                }
                .into()),
            },
        }
    }

    /// Sleeps for `delay`; true when interrupted by shutdown.
    async fn pause(
        &self,
        delay: Duration,
    ) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => true,
            _ = sleep(delay) => false,
        }
    }

    fn stopped(&self) -> Result<()> {
        info!(service = %self.set.name(), "Poll loop stopped");
        Ok(())
    }
}
