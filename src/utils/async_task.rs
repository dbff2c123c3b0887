use std::future::Future;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::warn;

use crate::BackoffPolicy;
use crate::CancelSource;
use crate::Error;
use crate::Result;

/// Runs `task` until it succeeds or `policy.max_retries` attempts are used.
///
/// Each attempt is bounded by `policy.timeout_ms`; the delay between attempts
/// doubles from `base_delay_ms` up to `max_delay_ms`. The last attempt's error
/// is returned on exhaustion.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    task: F,
    policy: BackoffPolicy,
) -> Result<P>
where
    F: Fn() -> T,
    T: Future<Output = Result<P>>,
{
    let timeout_duration = policy.timeout();
    let max_delay = policy.max_delay();
    let mut delay = policy.base_delay();
    let mut retries = 0;
    let mut last_error = None;

    while retries < policy.max_retries {
        match timeout(timeout_duration, task()).await {
            Ok(Ok(r)) => {
                return Ok(r);
            }
            Ok(Err(error)) => {
                warn!(attempt = retries + 1, "task failed with error: {:?}", &error);
                last_error = Some(error);
            }
            Err(_) => {
                warn!(attempt = retries + 1, "task timed out after {:?}", timeout_duration);
                last_error = Some(Error::RetryTimeout(timeout_duration));
            }
        };

        retries += 1;
        if retries < policy.max_retries {
            sleep(delay).await;
            delay = (delay * 2).min(max_delay);
        } else {
            warn!("Task failed after {} attempts", retries);
        }
    }

    Err(last_error.unwrap_or(Error::RetryTimeout(timeout_duration)))
}

/// Spawns a named background task. Errors are logged; the handle is returned
/// so the owner can join it on shutdown.
pub(crate) fn spawn_task<F, Fut>(
    name: &str,
    task_fn: F,
) -> JoinHandle<()>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    tokio::spawn(async move {
        if let Err(e) = task_fn().await {
            error!("spawned task: {name} stopped or encountered an error: {:?}", e);
        }
    })
}

/// Runs `fut` on its own task and waits for it or for `cancel`, whichever
/// completes first.
///
/// When the caller's token wins, the spawned task is detached: it still runs
/// to completion and its result is discarded.
pub(crate) async fn spawn_until_cancelled<Fut, P>(
    fut: Fut,
    cancel: &CancellationToken,
) -> Result<P>
where
    Fut: Future<Output = Result<P>> + Send + 'static,
    P: Send + 'static,
{
    let handle = tokio::spawn(fut);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled(CancelSource::Caller)),
        joined = handle => joined?,
    }
}
