use std::sync::Arc;
use std::time::Duration;

use d_discovery::DiscoveryConfig;
use d_discovery::MemoryDirectory;
use d_discovery::Registry;
use d_discovery::ServiceInstance;
use d_discovery::Watcher;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Upper bound for anything a test expects to happen
pub const EVENTUALLY: Duration = Duration::from_secs(5);

/// How long a test waits before concluding that nothing happens
pub const QUIET_PERIOD: Duration = Duration::from_millis(200);

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
}

pub fn test_config() -> DiscoveryConfig {
    let mut config = DiscoveryConfig::default();
    config.watch.initial_query_timeout_in_ms = 2000;
    config.watch.poll_interval_in_ms = 10;
    config.watch.long_poll_timeout_in_ms = 3000;
    config.watch.retry_delay_in_ms = 10;
    config.watch.wait_time_in_secs = 1;
    config.validate().expect("test config should be valid")
}

/// Registry over a directory the test also keeps a handle on
pub fn memory_registry() -> (Registry<MemoryDirectory>, Arc<MemoryDirectory>) {
    let directory = Arc::new(MemoryDirectory::new());
    (Registry::with_client(directory.clone(), test_config()), directory)
}

pub fn instance(
    name: &str,
    id: &str,
    port: u16,
) -> ServiceInstance {
    ServiceInstance::builder(name)
        .id(id)
        .version("v1")
        .endpoint(format!("http://127.0.0.1:{port}"))
        .build()
}

pub fn ids(services: &[ServiceInstance]) -> Vec<String> {
    let mut ids: Vec<String> = services.iter().map(|s| s.id().to_string()).collect();
    ids.sort();
    ids
}

/// Next snapshot delivered to `watcher`.
///
/// # Panics
/// When nothing arrives in time or the watch fails.
pub async fn next_snapshot(watcher: &Watcher) -> Vec<ServiceInstance> {
    timeout(EVENTUALLY, watcher.watch(&CancellationToken::new()))
        .await
        .expect("watcher should be woken")
        .expect("watch should succeed")
}

/// Asserts that `watcher` is not woken during [`QUIET_PERIOD`].
pub async fn assert_quiet(watcher: &Watcher) {
    let outcome = timeout(QUIET_PERIOD, watcher.watch(&CancellationToken::new())).await;
    assert!(outcome.is_err(), "watcher woke unexpectedly: {:?}", outcome);
}
