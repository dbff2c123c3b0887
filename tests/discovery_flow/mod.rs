use d_discovery::Discovery;
use d_discovery::DirectoryClient;
use d_discovery::Error;
use d_discovery::Registrar;
use futures::StreamExt;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::common::assert_quiet;
use crate::common::enable_logger;
use crate::common::ids;
use crate::common::instance;
use crate::common::memory_registry;
use crate::common::next_snapshot;
use crate::common::EVENTUALLY;

#[tokio::test]
async fn test_watcher_follows_registrations() {
    enable_logger();
    let (registry, _directory) = memory_registry();
    let cancel = CancellationToken::new();

    let watcher = registry.resolve("orders").unwrap();
    assert_quiet(&watcher).await;

    registry.register(&instance("orders", "o1", 8001), &cancel).await.unwrap();
    assert_eq!(ids(&next_snapshot(&watcher).await), vec!["o1"]);

    registry.register(&instance("orders", "o2", 8002), &cancel).await.unwrap();
    assert_eq!(ids(&next_snapshot(&watcher).await), vec!["o1", "o2"]);

    registry.deregister(&instance("orders", "o1", 8001), &cancel).await.unwrap();
    assert_eq!(ids(&next_snapshot(&watcher).await), vec!["o2"]);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_late_watcher_starts_from_cache() {
    enable_logger();
    let (registry, directory) = memory_registry();

    directory.register(&instance("orders", "o1", 8001)).await.unwrap();
    let first = registry.resolve("orders").unwrap();
    assert_eq!(ids(&next_snapshot(&first).await), vec!["o1"]);

    let second = registry.resolve("orders").unwrap();
    assert_eq!(ids(&next_snapshot(&second).await), vec!["o1"]);
    assert_eq!(registry.watcher_count("orders"), 2);
    assert_eq!(registry.resolved_count(), 1);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_last_instance_failing_keeps_previous_snapshot() {
    enable_logger();
    let (registry, directory) = memory_registry();

    directory.register(&instance("orders", "o1", 8001)).await.unwrap();
    let watcher = registry.resolve("orders").unwrap();
    assert_eq!(ids(&next_snapshot(&watcher).await), vec!["o1"]);

    directory.set_passing("o1", false).unwrap();

    // The empty result is not published
    assert_quiet(&watcher).await;
    assert_eq!(ids(&registry.get_service("orders").unwrap()), vec!["o1"]);

    directory.set_passing("o1", true).unwrap();
    assert_eq!(ids(&next_snapshot(&watcher).await), vec!["o1"]);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_services_are_isolated_by_name() {
    enable_logger();
    let (registry, directory) = memory_registry();

    let orders = registry.resolve("orders").unwrap();
    let users = registry.resolve("users").unwrap();

    directory.register(&instance("users", "u1", 9001)).await.unwrap();
    assert_eq!(ids(&next_snapshot(&users).await), vec!["u1"]);
    assert_quiet(&orders).await;

    let listed = registry.list_services();
    assert_eq!(listed.len(), 1);
    assert!(listed.contains_key("users"));
    assert!(matches!(registry.get_service("orders"), Err(Error::NotFound(_))));
    assert!(matches!(registry.get_service("billing"), Err(Error::NotResolved(_))));

    registry.shutdown().await;
}

#[tokio::test]
async fn test_closed_watcher_does_not_disturb_others() {
    enable_logger();
    let (registry, directory) = memory_registry();

    let closed = registry.resolve("orders").unwrap();
    let open = registry.resolve("orders").unwrap();
    closed.close();
    assert_eq!(registry.watcher_count("orders"), 1);

    directory.register(&instance("orders", "o1", 8001)).await.unwrap();
    assert_eq!(ids(&next_snapshot(&open).await), vec!["o1"]);

    let err = closed.watch(&CancellationToken::new()).await.unwrap_err();
    assert!(err.is_cancelled());

    registry.shutdown().await;
}

#[tokio::test]
async fn test_watch_stream() {
    enable_logger();
    let (registry, directory) = memory_registry();

    let cancel = CancellationToken::new();
    let mut stream = Box::pin(registry.resolve("orders").unwrap().into_stream(cancel.clone()));

    directory.register(&instance("orders", "o1", 8001)).await.unwrap();
    let first = timeout(EVENTUALLY, stream.next()).await.unwrap().unwrap();
    assert_eq!(ids(&first), vec!["o1"]);

    directory.register(&instance("orders", "o2", 8002)).await.unwrap();
    let second = timeout(EVENTUALLY, stream.next()).await.unwrap().unwrap();
    assert_eq!(ids(&second), vec!["o1", "o2"]);

    cancel.cancel();
    assert!(timeout(EVENTUALLY, stream.next()).await.unwrap().is_none());
    // The finished stream released its watcher
    assert_eq!(registry.watcher_count("orders"), 0);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_keeps_cache_and_rejects_resolve() {
    enable_logger();
    let (registry, directory) = memory_registry();

    directory.register(&instance("orders", "o1", 8001)).await.unwrap();
    let watcher = registry.resolve("orders").unwrap();
    assert_eq!(ids(&next_snapshot(&watcher).await), vec!["o1"]);

    timeout(EVENTUALLY, registry.shutdown()).await.unwrap();

    directory.register(&instance("orders", "o2", 8002)).await.unwrap();
    assert_quiet(&watcher).await;
    assert_eq!(ids(&registry.get_service("orders").unwrap()), vec!["o1"]);
    assert!(matches!(registry.resolve("orders"), Err(Error::Shutdown)));
}
